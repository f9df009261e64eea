// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`NodeConfig`] loaded from
//! them once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for node storage | `./data` |
//! | `HOST` | Server bind address | `127.0.0.1` |
//! | `PORT` | Server bind port | `8000` |
//! | `TLS_CERT_PATH` | PEM certificate chain; enables HTTPS with `TLS_KEY_PATH` | unset |
//! | `TLS_KEY_PATH` | PEM private key | unset |
//! | `SIGNATURE_WINDOW_MS` | Accepted clock skew for `X-Timestamp`, either direction | `300000` |
//! | `REQUIRE_SIGNATURES` | Reject DID-only requests | `false` |
//! | `REPLAY_GUARD` | Reject signatures already seen inside the window | `false` |
//! | `RECOVERY_THRESHOLD` | Guardian approvals needed to complete a recovery | `4` |
//! | `RECOVERY_TTL_SECS` | Lifetime of a pending recovery; `0` disables expiry | `604800` |
//! | `RECOVERY_SWEEP_INTERVAL_SECS` | Interval of the expiry sweeper | `60` |
//! | `IPFS_API_URL` | IPFS RPC root for attestations | unset (in-memory) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::auth::DEFAULT_SIGNATURE_WINDOW_MS;
use crate::guardians::MAX_GUARDIANS;
use crate::recovery::sweeper::DEFAULT_SWEEP_INTERVAL;
use crate::recovery::DEFAULT_RECOVERY_THRESHOLD;
use crate::storage::paths::DEFAULT_DATA_ROOT;

/// Environment variable name for the data directory path.
///
/// Accounts (including their secrets), guardian sets, recovery requests and
/// audit logs are stored here. Keep it on the owning device.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const SIGNATURE_WINDOW_ENV: &str = "SIGNATURE_WINDOW_MS";
pub const REQUIRE_SIGNATURES_ENV: &str = "REQUIRE_SIGNATURES";
pub const REPLAY_GUARD_ENV: &str = "REPLAY_GUARD";
pub const RECOVERY_THRESHOLD_ENV: &str = "RECOVERY_THRESHOLD";
pub const RECOVERY_TTL_ENV: &str = "RECOVERY_TTL_SECS";
pub const RECOVERY_SWEEP_INTERVAL_ENV: &str = "RECOVERY_SWEEP_INTERVAL_SECS";
pub const IPFS_API_URL_ENV: &str = "IPFS_API_URL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Seven days.
pub const DEFAULT_RECOVERY_TTL_SECS: u64 = 604_800;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsPaths>,
    pub signature_window_ms: i64,
    pub require_signatures: bool,
    pub replay_guard: bool,
    pub recovery_threshold: usize,
    /// `None` disables expiry.
    pub recovery_ttl: Option<Duration>,
    pub sweep_interval: Duration,
    pub ipfs_api_url: Option<Url>,
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_ROOT),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            signature_window_ms: DEFAULT_SIGNATURE_WINDOW_MS,
            require_signatures: false,
            replay_guard: false,
            recovery_threshold: DEFAULT_RECOVERY_THRESHOLD,
            recovery_ttl: Some(Duration::from_secs(DEFAULT_RECOVERY_TTL_SECS)),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            ipfs_api_url: None,
            log_format: LogFormat::Pretty,
        }
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value, "expected true or false")),
    }
}

fn parse_num<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid(name, value, e))
}

impl NodeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names. Unset and empty
    /// variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = get(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(host) = get(HOST_ENV) {
            config.host = host;
        }
        if let Some(port) = get(PORT_ENV) {
            config.port = parse_num(PORT_ENV, &port)?;
        }

        config.tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV)),
        };

        if let Some(window) = get(SIGNATURE_WINDOW_ENV) {
            let window: i64 = parse_num(SIGNATURE_WINDOW_ENV, &window)?;
            if window <= 0 {
                return Err(invalid(SIGNATURE_WINDOW_ENV, &window.to_string(), "must be positive"));
            }
            config.signature_window_ms = window;
        }
        if let Some(flag) = get(REQUIRE_SIGNATURES_ENV) {
            config.require_signatures = parse_bool(REQUIRE_SIGNATURES_ENV, &flag)?;
        }
        if let Some(flag) = get(REPLAY_GUARD_ENV) {
            config.replay_guard = parse_bool(REPLAY_GUARD_ENV, &flag)?;
        }

        if let Some(threshold) = get(RECOVERY_THRESHOLD_ENV) {
            let value: usize = parse_num(RECOVERY_THRESHOLD_ENV, &threshold)?;
            if !(1..=MAX_GUARDIANS).contains(&value) {
                return Err(invalid(
                    RECOVERY_THRESHOLD_ENV,
                    &threshold,
                    format!("must be between 1 and {MAX_GUARDIANS}"),
                ));
            }
            config.recovery_threshold = value;
        }
        if let Some(ttl) = get(RECOVERY_TTL_ENV) {
            config.recovery_ttl = match parse_num::<u64>(RECOVERY_TTL_ENV, &ttl)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
        }
        if let Some(interval) = get(RECOVERY_SWEEP_INTERVAL_ENV) {
            let secs: u64 = parse_num(RECOVERY_SWEEP_INTERVAL_ENV, &interval)?;
            if secs == 0 {
                return Err(invalid(RECOVERY_SWEEP_INTERVAL_ENV, &interval, "must be positive"));
            }
            config.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(url) = get(IPFS_API_URL_ENV) {
            config.ipfs_api_url = Some(Url::parse(&url).map_err(|e| invalid(IPFS_API_URL_ENV, &url, e))?);
        }

        if let Some(format) = get(LOG_FORMAT_ENV) {
            config.log_format = match format.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => return Err(invalid(LOG_FORMAT_ENV, &format, "expected json or pretty")),
            };
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|e| invalid(HOST_ENV, &addr, e))
    }

    /// Recovery TTL in the form the coordinator expects.
    pub fn recovery_ttl_chrono(&self) -> Option<chrono::Duration> {
        self.recovery_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8000");
        assert_eq!(config.signature_window_ms, 300_000);
        assert_eq!(config.recovery_threshold, 4);
        assert_eq!(config.recovery_ttl, Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            (DATA_DIR_ENV, "/var/lib/node"),
            (PORT_ENV, "9001"),
            (REQUIRE_SIGNATURES_ENV, "true"),
            (REPLAY_GUARD_ENV, "1"),
            (RECOVERY_THRESHOLD_ENV, "3"),
            (RECOVERY_TTL_ENV, "0"),
            (IPFS_API_URL_ENV, "http://127.0.0.1:5001"),
            (LOG_FORMAT_ENV, "json"),
        ])
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/node"));
        assert_eq!(config.port, 9001);
        assert!(config.require_signatures);
        assert!(config.replay_guard);
        assert_eq!(config.recovery_threshold, 3);
        assert_eq!(config.recovery_ttl, None);
        assert!(config.ipfs_api_url.is_some());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[(PORT_ENV, "http")]).is_err());
        assert!(load(&[(RECOVERY_THRESHOLD_ENV, "8")]).is_err());
        assert!(load(&[(RECOVERY_THRESHOLD_ENV, "0")]).is_err());
        assert!(load(&[(REQUIRE_SIGNATURES_ENV, "maybe")]).is_err());
        assert!(load(&[(SIGNATURE_WINDOW_ENV, "-5")]).is_err());
        assert_eq!(
            load(&[(TLS_CERT_PATH_ENV, "cert.pem")]),
            Err(ConfigError::Incomplete(TLS_CERT_PATH_ENV, TLS_KEY_PATH_ENV))
        );
    }
}

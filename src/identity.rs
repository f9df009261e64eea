// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Model
//!
//! A peer is identified by a self-certifying DID and holds a secret that
//! never leaves its device. Generated identities are Ed25519 `did:key`
//! identifiers whose secret is the hex-encoded 32-byte seed.
//!
//! ## Identity file
//!
//! ```json
//! { "did": "did:key:z6Mk...", "secret": "9f1c..." }
//! ```
//!
//! `export` followed by `import` yields the same `(did, secret)` pair, and
//! therefore identical request signatures.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Session;

/// Prefix of Ed25519 `did:key` identifiers (multibase base58btc).
pub const DID_KEY_PREFIX: &str = "did:key:z";

/// Multicodec varint for an Ed25519 public key.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// Maximum accepted length of a DID string.
pub const MAX_DID_LEN: usize = 256;

const SEED_LEN: usize = 32;

/// Errors produced by the identity model.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity generation failed: {0}")]
    GenerationError(String),

    #[error("invalid identity file: {0}")]
    InvalidFormat(String),

    #[error("invalid DID '{did}': {reason}")]
    InvalidDid { did: String, reason: &'static str },

    #[error("secret does not derive {0}")]
    KeyMismatch(String),

    #[error("cannot access identity file: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Did
// =============================================================================

/// A validated decentralized identifier: `did:<method>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(example = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK")]
pub struct Did(String);

impl Did {
    /// Parse and validate a DID string.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        let invalid = |reason| IdentityError::InvalidDid {
            did: value.clone(),
            reason,
        };

        if value.len() > MAX_DID_LEN {
            return Err(invalid("longer than 256 characters"));
        }

        let rest = value
            .strip_prefix("did:")
            .ok_or_else(|| invalid("missing 'did:' scheme"))?;
        let (method, id) = rest
            .split_once(':')
            .ok_or_else(|| invalid("missing method-specific id"))?;

        if method.is_empty()
            || !method
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(invalid("method must be lowercase alphanumeric"));
        }
        if id.is_empty() {
            return Err(invalid("empty method-specific id"));
        }
        if !id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b':' | b'%' | b'-'))
        {
            return Err(invalid("method-specific id contains invalid characters"));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The DID method (`key`, `web`, ...).
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Decode the Ed25519 public key of a `did:key` identifier, if it is one.
    pub fn ed25519_public_key(&self) -> Option<[u8; 32]> {
        let encoded = self.0.strip_prefix(DID_KEY_PREFIX)?;
        let bytes = bs58::decode(encoded).into_vec().ok()?;
        let key = bytes.strip_prefix(&ED25519_MULTICODEC)?;
        key.try_into().ok()
    }

    /// Derive the `did:key` identifier for an Ed25519 public key.
    pub fn from_ed25519_public_key(public_key: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(ED25519_MULTICODEC.len() + public_key.len());
        bytes.extend_from_slice(&ED25519_MULTICODEC);
        bytes.extend_from_slice(public_key);
        Self(format!(
            "{DID_KEY_PREFIX}{}",
            bs58::encode(bytes).into_string()
        ))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl AsRef<str> for Did {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Secret
// =============================================================================

/// Private key material. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw secret. Callers must not log or transmit the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The 32-byte Ed25519 seed, when the secret is one.
    pub(crate) fn ed25519_seed(&self) -> Option<[u8; SEED_LEN]> {
        let bytes = hex::decode(&self.0).ok()?;
        bytes.try_into().ok()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

// =============================================================================
// Identity
// =============================================================================

/// On-disk identity file format.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityFile {
    pub did: String,
    pub secret: String,
}

/// Lenient shape used while importing, so missing fields become
/// `InvalidFormat` instead of a serde error message.
#[derive(Deserialize)]
struct RawIdentityFile {
    did: Option<String>,
    secret: Option<String>,
}

/// A DID together with its secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    did: Did,
    secret: Secret,
}

impl Identity {
    /// Generate a fresh Ed25519 `did:key` identity.
    pub fn generate() -> Result<Self, IdentityError> {
        let rng = SystemRandom::new();
        let mut seed = [0u8; SEED_LEN];
        rng.fill(&mut seed)
            .map_err(|_| IdentityError::GenerationError("entropy source unavailable".into()))?;
        Self::from_seed(&seed)
    }

    /// Build the identity derived from an Ed25519 seed.
    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Result<Self, IdentityError> {
        let did = did_from_seed(seed)?;
        Ok(Self {
            did,
            secret: Secret::new(hex::encode(seed)),
        })
    }

    /// Pair a DID with a secret after validating both.
    pub fn from_parts(did: &str, secret: &str) -> Result<Self, IdentityError> {
        if did.trim().is_empty() {
            return Err(IdentityError::InvalidFormat("missing field `did`".into()));
        }
        if secret.trim().is_empty() {
            return Err(IdentityError::InvalidFormat("missing field `secret`".into()));
        }

        let did = Did::parse(did).map_err(|e| IdentityError::InvalidFormat(e.to_string()))?;
        let secret = Secret::new(secret);

        // Generated identities are self-certifying; imported legacy secrets are opaque.
        if did.ed25519_public_key().is_some() {
            if let Some(seed) = secret.ed25519_seed() {
                if did_from_seed(&seed)? != did {
                    return Err(IdentityError::KeyMismatch(did.to_string()));
                }
            }
        }

        Ok(Self { did, secret })
    }

    /// Import an identity file.
    pub fn import(bytes: &[u8]) -> Result<Self, IdentityError> {
        let raw: RawIdentityFile = serde_json::from_slice(bytes)
            .map_err(|e| IdentityError::InvalidFormat(format!("not a valid identity file: {e}")))?;

        Self::from_parts(
            raw.did.as_deref().unwrap_or_default(),
            raw.secret.as_deref().unwrap_or_default(),
        )
    }

    /// Export to the identity file format.
    pub fn export(&self) -> IdentityFile {
        IdentityFile {
            did: self.did.to_string(),
            secret: self.secret.expose().to_string(),
        }
    }

    /// Serialize the identity file as pretty JSON.
    pub fn to_json(&self) -> Result<String, IdentityError> {
        serde_json::to_string_pretty(&self.export())
            .map_err(|e| IdentityError::InvalidFormat(e.to_string()))
    }

    /// Read an identity file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let bytes = std::fs::read(path)?;
        Self::import(&bytes)
    }

    /// Write the identity file to disk, readable only by the owner on unix.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IdentityError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// A signing session for this identity.
    pub fn session(&self) -> Session {
        Session::new(self.did.clone(), Some(self.secret.clone()))
    }
}

fn did_from_seed(seed: &[u8; SEED_LEN]) -> Result<Did, IdentityError> {
    let key_pair = Ed25519KeyPair::from_seed_unchecked(seed)
        .map_err(|e| IdentityError::GenerationError(e.to_string()))?;
    Ok(Did::from_ed25519_public_key(key_pair.public_key().as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::signing::sign;
    use tempfile::TempDir;

    #[test]
    fn generated_identity_is_did_key() {
        let identity = Identity::generate().unwrap();
        assert!(identity.did().as_str().starts_with("did:key:z6Mk"));
        assert_eq!(identity.did().method(), "key");
        assert_eq!(identity.secret().expose().len(), 64);
        assert!(identity.did().ed25519_public_key().is_some());
    }

    #[test]
    fn generated_identities_are_distinct() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        assert_ne!(a.did(), b.did());
    }

    #[test]
    fn seed_derivation_is_stable() {
        let seed = [7u8; 32];
        let a = Identity::from_seed(&seed).unwrap();
        let b = Identity::from_seed(&seed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn export_import_round_trip_preserves_signatures() {
        let identity = Identity::generate().unwrap();
        let json = identity.to_json().unwrap();
        let imported = Identity::import(json.as_bytes()).unwrap();

        assert_eq!(imported, identity);
        assert_eq!(
            sign(identity.secret(), "POST", "/api/guardians/add", "1700000000000"),
            sign(imported.secret(), "POST", "/api/guardians/add", "1700000000000"),
        );
    }

    #[test]
    fn save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("identity.json");
        let identity = Identity::generate().unwrap();

        identity.save(&path).unwrap();
        assert_eq!(Identity::load(&path).unwrap(), identity);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = Identity::load(temp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, IdentityError::Io(_)));
    }

    #[test]
    fn import_rejects_malformed_files() {
        for bad in [
            &b"not json"[..],
            br#"{"secret":"abc"}"#,
            br#"{"did":"did:key:zAbc"}"#,
            br#"{"did":"","secret":"abc"}"#,
            br#"{"did":"did:key:zAbc","secret":""}"#,
            br#"{"did":"peer-123","secret":"abc"}"#,
        ] {
            let err = Identity::import(bad).unwrap_err();
            assert!(
                matches!(err, IdentityError::InvalidFormat(_)),
                "expected InvalidFormat for {:?}, got {err:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn import_accepts_legacy_opaque_secret() {
        let identity =
            Identity::from_parts("did:web:alice.example", "correct horse battery").unwrap();
        assert_eq!(identity.did().method(), "web");
    }

    #[test]
    fn import_rejects_seed_for_other_did() {
        let a = Identity::generate().unwrap();
        let b = Identity::generate().unwrap();
        let err = Identity::from_parts(a.did().as_str(), b.secret().expose()).unwrap_err();
        assert!(matches!(err, IdentityError::KeyMismatch(_)));
    }

    #[test]
    fn did_validation() {
        assert!(Did::parse("did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK").is_ok());
        assert!(Did::parse("did:web:example.com:user%20a").is_ok());
        assert!(Did::parse("did:Key:abc").is_err());
        assert!(Did::parse("did:key:").is_err());
        assert!(Did::parse("did:key:has space").is_err());
        assert!(Did::parse("did:key:under_score").is_err());
        assert!(Did::parse("key:abc").is_err());
        assert!(Did::parse(format!("did:key:{}", "a".repeat(300))).is_err());
    }

    #[test]
    fn did_serde_validates() {
        let did: Did = serde_json::from_str(r#""did:key:zAbc""#).unwrap();
        assert_eq!(did.as_str(), "did:key:zAbc");
        assert!(serde_json::from_str::<Did>(r#""nope""#).is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let identity = Identity::generate().unwrap();
        let rendered = format!("{identity:?}");
        assert!(!rendered.contains(identity.secret().expose()));
        assert!(rendered.contains("REDACTED"));
    }
}

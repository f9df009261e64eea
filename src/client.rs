// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for a node.
//!
//! Every call is made under the client's explicit [`Session`]: the `X-DID`
//! header is always sent and, when the session holds the secret, the request
//! is signed over method, path and timestamp. Waiting for a recovery combines
//! the node's long-poll with a client-side backoff described by
//! [`PollPolicy`].

use std::{path::Path, time::Duration};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::{
    auth::{signing::now_millis, Session},
    identity::{Did, Identity, IdentityError, IdentityFile},
    models::{
        ApprovalResponse, AuditEventsResponse, ConnectionRequestResponse, ConnectionsResponse,
        GuardiansResponse, ImportedIdentityResponse, MarkAllReadResponse, NotificationsResponse,
        RecoveryCreatedResponse, RecoveryStatusResponse, RelationshipsResponse, RestoreRequest,
        RestoredIdentityResponse, ShardSetupResponse, SuccessorResponse, TierResponse,
        WhoAmIResponse,
    },
    recovery::{RecoveryAttestation, RecoveryStatus, MAX_STATUS_WAIT},
};

/// Slack on top of the longest long-poll before a request is abandoned.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("node unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("node returned {status} ({kind}): {detail}")]
    Api {
        status: StatusCode,
        kind: String,
        detail: String,
    },

    #[error("identity file rejected: {0}")]
    Identity(#[from] IdentityError),

    #[error("invalid node url: {0}")]
    InvalidUrl(String),

    #[error("unexpected response from node: {0}")]
    InvalidResponse(String),

    #[error("this call needs a session")]
    NoSession,

    #[error("gave up waiting for recovery after {0:?}")]
    Timeout(Duration),

    #[error("recovery ended as {0:?}")]
    RecoveryEnded(RecoveryStatus),
}

impl ClientError {
    /// The machine-readable error kind, for errors reported by the node.
    pub fn api_kind(&self) -> Option<&str> {
        match self {
            ClientError::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// How [`NodeClient::wait_for_recovery`] paces its status checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    /// Overall time budget, measured from the first check.
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            multiplier: 1.5,
            max_interval: Duration::from_secs(30),
            deadline: Duration::from_secs(600),
        }
    }
}

impl PollPolicy {
    /// Grow `current` by the multiplier, never past `max_interval`. A
    /// multiplier that overflows the product lands on the cap.
    fn next_interval(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.multiplier.max(1.0);
        Duration::try_from_secs_f64(scaled)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// Error payload shared by `ApiError` and `AuthError` responses.
#[derive(Deserialize)]
struct ErrorPayload {
    kind: String,
    detail: String,
}

#[derive(Debug, Clone)]
pub struct NodeClient {
    base_url: Url,
    http: Client,
    session: Option<Session>,
}

impl NodeClient {
    /// Client for the node at `base_url`, without a session.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(MAX_STATUS_WAIT + REQUEST_TIMEOUT_SLACK)
            .build()?;

        Ok(Self {
            base_url,
            http,
            session: None,
        })
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ========== Identity ==========

    /// Have the node generate and store a new identity.
    pub async fn generate_identity(&self) -> Result<Identity, ClientError> {
        let file: IdentityFile = self
            .execute(self.request(Method::POST, "api/auth/generate-identity", false)?)
            .await?;
        Ok(Identity::from_parts(&file.did, &file.secret)?)
    }

    /// Hand an identity to the node's keystore.
    pub async fn import_identity(
        &self,
        identity: &Identity,
    ) -> Result<ImportedIdentityResponse, ClientError> {
        let body = identity.to_json()?;
        let builder = self
            .request(Method::POST, "api/auth/import-identity", false)?
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        self.execute(builder).await
    }

    /// Read an identity file from disk and import it.
    ///
    /// A corrupt file fails with [`ClientError::Identity`] before anything is
    /// sent to the node.
    pub async fn import_identity_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Identity, ClientError> {
        let identity = Identity::load(path)?;
        self.import_identity(&identity).await?;
        Ok(identity)
    }

    pub async fn erase_identity(&self) -> Result<(), ClientError> {
        let response = self
            .request(Method::DELETE, "api/auth/identity", true)?
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    pub async fn whoami(&self) -> Result<WhoAmIResponse, ClientError> {
        self.execute(self.request(Method::GET, "api/auth/whoami", true)?)
            .await
    }

    /// The identity that replaced `did` through recovery.
    pub async fn successor(&self, did: &Did) -> Result<SuccessorResponse, ClientError> {
        let path = format!("api/identity/{did}/successor");
        self.execute(self.request(Method::GET, &path, true)?).await
    }

    // ========== Guardians ==========

    pub async fn guardians(&self) -> Result<GuardiansResponse, ClientError> {
        self.execute(self.request(Method::GET, "api/guardians", true)?)
            .await
    }

    pub async fn guardians_of(&self, owner: &Did) -> Result<GuardiansResponse, ClientError> {
        let path = format!("api/guardians/of/{owner}");
        self.execute(self.request(Method::GET, &path, true)?).await
    }

    pub async fn add_guardian(&self, peer: &Did) -> Result<GuardiansResponse, ClientError> {
        self.post_form("api/guardians/add", &[("peer_id", peer.as_str())])
            .await
    }

    pub async fn remove_guardian(&self, peer: &Did) -> Result<GuardiansResponse, ClientError> {
        self.post_form("api/guardians/remove", &[("peer_id", peer.as_str())])
            .await
    }

    // ========== Recovery ==========

    /// Open a recovery of `old` in favour of `new`. Must be called under `new`.
    pub async fn request_recovery(
        &self,
        old: &Did,
        new: &Did,
    ) -> Result<RecoveryCreatedResponse, ClientError> {
        self.post_form(
            "api/recovery/request",
            &[("old_peer_id", old.as_str()), ("new_peer_id", new.as_str())],
        )
        .await
    }

    /// Approve as the session's identity.
    pub async fn approve_recovery(&self, request_id: &str) -> Result<ApprovalResponse, ClientError> {
        let guardian = self.session.as_ref().ok_or(ClientError::NoSession)?.did().clone();
        self.post_form(
            "api/recovery/approve",
            &[
                ("request_id", request_id),
                ("guardian_peer_id", guardian.as_str()),
            ],
        )
        .await
    }

    /// Current status; with `wait`, the node holds the call until the request
    /// changes or the wait runs out.
    pub async fn recovery_status(
        &self,
        request_id: &str,
        wait: Option<Duration>,
    ) -> Result<RecoveryStatusResponse, ClientError> {
        let path = format!("api/recovery/{request_id}");
        let mut builder = self.request(Method::GET, &path, true)?;
        if let Some(wait) = wait {
            builder = builder.query(&[("wait_secs", wait.as_secs())]);
        }
        self.execute(builder).await
    }

    pub async fn cancel_recovery(
        &self,
        request_id: &str,
    ) -> Result<RecoveryStatusResponse, ClientError> {
        let path = format!("api/recovery/{request_id}/cancel");
        self.execute(self.request(Method::POST, &path, true)?).await
    }

    pub async fn recovery_attestation(
        &self,
        request_id: &str,
    ) -> Result<RecoveryAttestation, ClientError> {
        let path = format!("api/recovery/{request_id}/attestation");
        self.execute(self.request(Method::GET, &path, true)?).await
    }

    /// Ask the node to split the session identity into `shares` shards,
    /// `threshold` of which restore it.
    pub async fn setup_shards(
        &self,
        threshold: u32,
        shares: u32,
    ) -> Result<ShardSetupResponse, ClientError> {
        let (threshold, shares) = (threshold.to_string(), shares.to_string());
        self.post_form(
            "api/recovery/setup",
            &[("threshold", threshold.as_str()), ("shares", shares.as_str())],
        )
        .await
    }

    /// Rebuild an identity from shards on this node. No session needed.
    pub async fn restore_from_shards(
        &self,
        shards: Vec<String>,
        expected: Option<&Did>,
    ) -> Result<Identity, ClientError> {
        let body = RestoreRequest {
            shards,
            expected_did: expected.map(Did::to_string),
        };
        let restored: RestoredIdentityResponse = self
            .execute(self.request(Method::POST, "api/recovery/restore", false)?.json(&body))
            .await?;
        Ok(Identity::from_parts(restored.did.as_str(), &restored.secret)?)
    }

    /// Block until the request completes.
    ///
    /// Each check long-polls for the current interval, which then grows by
    /// the policy's multiplier. Expired or cancelled requests end the wait
    /// with [`ClientError::RecoveryEnded`].
    pub async fn wait_for_recovery(
        &self,
        request_id: &str,
        policy: &PollPolicy,
    ) -> Result<RecoveryStatusResponse, ClientError> {
        let deadline = Instant::now() + policy.deadline;
        let mut interval = policy.initial_interval;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout(policy.deadline));
            }

            let wait = interval.min(remaining).min(MAX_STATUS_WAIT);
            let started = Instant::now();
            let status = match tokio::time::timeout_at(
                deadline,
                self.recovery_status(request_id, Some(wait)),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => return Err(ClientError::Timeout(policy.deadline)),
            };

            match status.status {
                RecoveryStatus::Completed => {
                    info!(request_id, approvals = status.approvals_count, "Recovery completed");
                    return Ok(status);
                }
                RecoveryStatus::Expired | RecoveryStatus::Cancelled => {
                    return Err(ClientError::RecoveryEnded(status.status));
                }
                RecoveryStatus::Pending => {
                    debug!(
                        request_id,
                        approvals = status.approvals_count,
                        threshold = status.threshold,
                        "Recovery still pending"
                    );
                }
            }

            // A node without long-poll answers at once; pace the next check.
            let elapsed = started.elapsed();
            if elapsed < wait {
                tokio::time::sleep_until((started + wait).min(deadline)).await;
            }
            interval = policy.next_interval(interval);
        }
    }

    // ========== Social ==========

    pub async fn follow(&self, peer: &Did) -> Result<TierResponse, ClientError> {
        let path = format!("api/follow/{peer}");
        self.execute(self.request(Method::POST, &path, true)?).await
    }

    pub async fn unfollow(&self, peer: &Did) -> Result<TierResponse, ClientError> {
        let path = format!("api/unfollow/{peer}");
        self.execute(self.request(Method::POST, &path, true)?).await
    }

    pub async fn following(&self) -> Result<RelationshipsResponse, ClientError> {
        self.execute(self.request(Method::GET, "api/following", true)?)
            .await
    }

    pub async fn connections(&self) -> Result<ConnectionsResponse, ClientError> {
        self.execute(self.request(Method::GET, "api/connections", true)?)
            .await
    }

    pub async fn request_connection(
        &self,
        peer: &Did,
    ) -> Result<ConnectionRequestResponse, ClientError> {
        self.post_form("api/connections/request", &[("peer_id", peer.as_str())])
            .await
    }

    pub async fn accept_connection(&self, peer: &Did) -> Result<TierResponse, ClientError> {
        self.post_form("api/connections/accept", &[("peer_id", peer.as_str())])
            .await
    }

    pub async fn reject_connection(&self, peer: &Did) -> Result<TierResponse, ClientError> {
        self.post_form("api/connections/reject", &[("peer_id", peer.as_str())])
            .await
    }

    // ========== Notifications ==========

    pub async fn notifications(
        &self,
        limit: Option<usize>,
    ) -> Result<NotificationsResponse, ClientError> {
        let mut builder = self.request(Method::GET, "api/notifications", true)?;
        if let Some(limit) = limit {
            builder = builder.query(&[("limit", limit)]);
        }
        self.execute(builder).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("api/notifications/{id}/read");
        let response = self.request(Method::POST, &path, true)?.send().await?;
        check(response).await.map(|_| ())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<MarkAllReadResponse, ClientError> {
        self.execute(self.request(Method::POST, "api/notifications/read-all", true)?)
            .await
    }

    /// The session identity's audit events for today.
    pub async fn audit_events(&self) -> Result<AuditEventsResponse, ClientError> {
        self.execute(self.request(Method::GET, "api/audit", true)?)
            .await
    }

    // ========== Plumbing ==========

    /// Build a request for `path` (relative to the base url), attaching the
    /// session's authentication headers when `authenticated`.
    fn request(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
    ) -> Result<RequestBuilder, ClientError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))?;

        let headers = if authenticated {
            let session = self.session.as_ref().ok_or(ClientError::NoSession)?;
            Some(session.authenticate(method.as_str(), url.path(), now_millis()))
        } else {
            None
        };

        let mut builder = self.http.request(method, url);
        for (name, value) in headers.iter().flat_map(|h| h.pairs()) {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        self.execute(self.request(Method::POST, path, true)?.form(fields))
            .await
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = check(builder.send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

/// Turn non-success responses into [`ClientError::Api`].
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorPayload>(&body) {
        Ok(payload) => ClientError::Api {
            status,
            kind: payload.kind,
            detail: payload.detail,
        },
        Err(_) => ClientError::Api {
            status,
            kind: "unknown".to_string(),
            detail: body,
        },
    })
}

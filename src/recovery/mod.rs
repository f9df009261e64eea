// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Recovery Protocol
//!
//! A peer that lost its secret generates a new identity and asks the
//! guardians of its old identity to vouch for the new one. Once `threshold`
//! distinct guardians approve, the new DID takes over the old DID's social
//! graph, guardian set and content ownership.
//!
//! ```text
//!              approve (< threshold)
//!                 ┌──────┐
//!                 ▼      │
//! initiate ──► Pending ──┴── approve (= threshold) ──► Completed
//!                 │
//!                 ├── ttl elapsed ──► Expired
//!                 └── cancel ───────► Cancelled
//! ```
//!
//! All terminal states are final. [`RecoveryRequest`] holds the pure state
//! machine; [`RecoveryCoordinator`] adds persistence, locking, events and
//! the completion side effects.
//!
//! Independently of guardians, an owner can split their seed into offline
//! [`shards`] and later restore the very same identity from enough of them.

pub mod coordinator;
pub mod shards;
pub mod sweeper;

pub use coordinator::{RecoveryCoordinator, RecoverySettings, MAX_STATUS_WAIT};
pub use shards::{ShardError, DEFAULT_SHARD_COUNT, DEFAULT_SHARD_THRESHOLD};
pub use sweeper::RecoveryExpirySweeper;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::content_store::ContentStoreError;
use crate::guardians::{GuardianError, MAX_GUARDIANS};
use crate::identity::Did;
use crate::social::SocialError;
use crate::storage::StorageError;

/// Default number of guardian approvals needed to complete a recovery.
pub const DEFAULT_RECOVERY_THRESHOLD: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStatus {
    Pending,
    Completed,
    Expired,
    Cancelled,
}

impl RecoveryStatus {
    pub fn is_terminal(self) -> bool {
        self != RecoveryStatus::Pending
    }
}

impl fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecoveryStatus::Pending => "pending",
            RecoveryStatus::Completed => "completed",
            RecoveryStatus::Expired => "expired",
            RecoveryStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("unknown recovery request {0}")]
    UnknownRequest(String),

    #[error("{0} is not a guardian of the identity being recovered")]
    NotAGuardian(Did),

    #[error("{0} already approved this request")]
    DuplicateApproval(Did),

    #[error("recovery already {0}")]
    AlreadyTerminal(RecoveryStatus),

    #[error("{0} was already recovered")]
    AlreadyRecovered(Did),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("recovery threshold must be between 1 and {MAX_GUARDIANS}, got {0}")]
    InvalidThreshold(usize),

    #[error("no attestation published for recovery {0}")]
    NoAttestation(Uuid),

    #[error(transparent)]
    Guardian(#[from] GuardianError),

    #[error(transparent)]
    Social(#[from] SocialError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    ContentStore(#[from] ContentStoreError),
}

/// Result of recording one approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Recorded { approvals_count: usize },
    Completed { approvals_count: usize },
}

/// A request to bind a lost identity to a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    pub request_id: Uuid,
    pub old_peer_id: Did,
    pub new_peer_id: Did,
    pub approvals: BTreeSet<Did>,
    pub threshold: usize,
    pub status: RecoveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_cid: Option<String>,
}

impl RecoveryRequest {
    /// Open a new pending request.
    pub fn initiate(
        old_peer_id: Did,
        new_peer_id: Did,
        threshold: usize,
        ttl: Option<chrono::Duration>,
        now: DateTime<Utc>,
    ) -> Result<Self, RecoveryError> {
        if old_peer_id == new_peer_id {
            return Err(RecoveryError::InvalidPeerId(
                "old and new peer id must differ".to_string(),
            ));
        }
        if !(1..=MAX_GUARDIANS).contains(&threshold) {
            return Err(RecoveryError::InvalidThreshold(threshold));
        }

        Ok(Self {
            request_id: Uuid::new_v4(),
            old_peer_id,
            new_peer_id,
            approvals: BTreeSet::new(),
            threshold,
            status: RecoveryStatus::Pending,
            created_at: now,
            updated_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
            completed_at: None,
            attestation_cid: None,
        })
    }

    pub fn approvals_count(&self) -> usize {
        self.approvals.len()
    }

    fn ensure_pending(&self) -> Result<(), RecoveryError> {
        match self.status {
            RecoveryStatus::Pending => Ok(()),
            terminal => Err(RecoveryError::AlreadyTerminal(terminal)),
        }
    }

    /// Record an approval from `guardian`.
    ///
    /// Guardian membership is checked by the caller; this only enforces the
    /// state machine and uniqueness.
    pub fn approve(
        &mut self,
        guardian: &Did,
        now: DateTime<Utc>,
    ) -> Result<ApprovalOutcome, RecoveryError> {
        self.ensure_pending()?;
        if self.approvals.contains(guardian) {
            return Err(RecoveryError::DuplicateApproval(guardian.clone()));
        }

        self.approvals.insert(guardian.clone());
        self.updated_at = now;

        let approvals_count = self.approvals_count();
        if approvals_count >= self.threshold {
            self.status = RecoveryStatus::Completed;
            self.completed_at = Some(now);
            Ok(ApprovalOutcome::Completed { approvals_count })
        } else {
            Ok(ApprovalOutcome::Recorded { approvals_count })
        }
    }

    /// Whether a pending request has outlived its TTL.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RecoveryStatus::Pending && self.expires_at.is_some_and(|at| now >= at)
    }

    /// Move to `Expired` if due. Returns whether the status changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.status = RecoveryStatus::Expired;
        self.updated_at = now;
        true
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), RecoveryError> {
        self.ensure_pending()?;
        self.status = RecoveryStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}

/// Broadcast on every state change of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    Approved {
        request_id: Uuid,
        guardian: Did,
        approvals_count: usize,
    },
    Completed {
        request_id: Uuid,
        old_peer_id: Did,
        new_peer_id: Did,
        approvals_count: usize,
    },
    Expired {
        request_id: Uuid,
    },
    Cancelled {
        request_id: Uuid,
    },
}

impl RecoveryEvent {
    pub fn request_id(&self) -> Uuid {
        match self {
            RecoveryEvent::Approved { request_id, .. }
            | RecoveryEvent::Completed { request_id, .. }
            | RecoveryEvent::Expired { request_id }
            | RecoveryEvent::Cancelled { request_id } => *request_id,
        }
    }
}

/// Completion record published to the content store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecoveryAttestation {
    pub request_id: Uuid,
    pub old_did: Did,
    pub new_did: Did,
    pub guardians: Vec<Did>,
    pub threshold: usize,
    pub completed_at: DateTime<Utc>,
}

impl RecoveryAttestation {
    pub fn for_request(request: &RecoveryRequest) -> Option<Self> {
        Some(Self {
            request_id: request.request_id,
            old_did: request.old_peer_id.clone(),
            new_did: request.new_peer_id.clone(),
            guardians: request.approvals.iter().cloned().collect(),
            threshold: request.threshold,
            completed_at: request.completed_at?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    fn pending(threshold: usize) -> RecoveryRequest {
        RecoveryRequest::initiate(did("Old"), did("New"), threshold, None, Utc::now()).unwrap()
    }

    #[test]
    fn initiate_rejects_same_peer() {
        let err =
            RecoveryRequest::initiate(did("Same"), did("Same"), 4, None, Utc::now()).unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidPeerId(_)));
    }

    #[test]
    fn initiate_rejects_bad_threshold() {
        for threshold in [0, MAX_GUARDIANS + 1] {
            let err = RecoveryRequest::initiate(did("Old"), did("New"), threshold, None, Utc::now())
                .unwrap_err();
            assert!(matches!(err, RecoveryError::InvalidThreshold(_)));
        }
    }

    #[test]
    fn completes_exactly_at_threshold() {
        let mut request = pending(4);
        let now = Utc::now();

        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            assert_eq!(
                request.approve(&did(name), now).unwrap(),
                ApprovalOutcome::Recorded {
                    approvals_count: i + 1
                }
            );
            assert_eq!(request.status, RecoveryStatus::Pending);
        }

        assert_eq!(
            request.approve(&did("D"), now).unwrap(),
            ApprovalOutcome::Completed { approvals_count: 4 }
        );
        assert_eq!(request.status, RecoveryStatus::Completed);
        assert!(request.completed_at.is_some());

        let err = request.approve(&did("E"), now).unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::AlreadyTerminal(RecoveryStatus::Completed)
        ));
        assert_eq!(request.approvals_count(), 4);
    }

    #[test]
    fn duplicate_approval_is_not_counted() {
        let mut request = pending(4);
        request.approve(&did("A"), Utc::now()).unwrap();
        let err = request.approve(&did("A"), Utc::now()).unwrap_err();
        assert!(matches!(err, RecoveryError::DuplicateApproval(_)));
        assert_eq!(request.approvals_count(), 1);
    }

    #[test]
    fn expires_after_ttl() {
        let start = Utc::now();
        let mut request = RecoveryRequest::initiate(
            did("Old"),
            did("New"),
            4,
            Some(chrono::Duration::minutes(10)),
            start,
        )
        .unwrap();

        assert!(!request.expire_if_due(start + chrono::Duration::minutes(9)));
        assert!(request.expire_if_due(start + chrono::Duration::minutes(10)));
        assert_eq!(request.status, RecoveryStatus::Expired);
        assert!(!request.expire_if_due(start + chrono::Duration::minutes(11)));

        assert!(matches!(
            request.approve(&did("A"), Utc::now()),
            Err(RecoveryError::AlreadyTerminal(RecoveryStatus::Expired))
        ));
    }

    #[test]
    fn cancel_only_while_pending() {
        let mut request = pending(1);
        request.cancel(Utc::now()).unwrap();
        assert_eq!(request.status, RecoveryStatus::Cancelled);
        assert!(matches!(
            request.cancel(Utc::now()),
            Err(RecoveryError::AlreadyTerminal(RecoveryStatus::Cancelled))
        ));
    }

    #[test]
    fn attestation_requires_completion() {
        let mut request = pending(1);
        assert!(RecoveryAttestation::for_request(&request).is_none());
        request.approve(&did("A"), Utc::now()).unwrap();
        let attestation = RecoveryAttestation::for_request(&request).unwrap();
        assert_eq!(attestation.guardians, vec![did("A")]);
        assert_eq!(attestation.new_did, did("New"));
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RecoveryStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(RecoveryStatus::Cancelled.to_string(), "cancelled");
    }
}

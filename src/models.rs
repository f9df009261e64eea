// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Requests are form-encoded
//! (`application/x-www-form-urlencoded`) unless noted; responses are JSON.
//! Peer ids in request forms stay plain strings so that malformed values
//! reach the domain validation and come back as `validation_error`.
//!
//! ## Model Categories
//!
//! - **Identity**: whoami, import, successor lookup
//! - **Guardians**: guardian set mutations and listings
//! - **Recovery**: initiate, approve, status, shard setup and restore
//! - **Social**: follow, connections, notifications
//! - **Audit**: the caller's audit trail

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CallerTrust;
use crate::identity::Did;
use crate::recovery::{RecoveryRequest, RecoveryStatus};
use crate::social::{ConnectionRequestOutcome, RelationshipTier};
use crate::storage::{
    AccountOrigin, AuditEvent, IdentityBinding, Notification, StoredRelationships,
};

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WhoAmIResponse {
    pub did: Did,
    pub trust: CallerTrust,
    /// Whether this node holds the DID's secret.
    pub local: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportedIdentityResponse {
    pub did: Did,
    pub origin: AccountOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessorResponse {
    pub binding: IdentityBinding,
    /// End of the binding chain, in case the successor was recovered too.
    pub current_did: Did,
}

// =============================================================================
// Guardians
// =============================================================================

/// Form body naming one peer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PeerForm {
    pub peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GuardiansResponse {
    pub owner: Did,
    pub guardians: Vec<Did>,
    pub max_guardians: usize,
}

// =============================================================================
// Recovery
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecoveryRequestForm {
    pub old_peer_id: String,
    pub new_peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecoveryCreatedResponse {
    pub request_id: Uuid,
    pub status: RecoveryStatus,
    pub threshold: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApproveForm {
    pub request_id: String,
    pub guardian_peer_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalResponse {
    pub request_id: Uuid,
    pub approvals_count: usize,
    pub status: RecoveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecoveryStatusResponse {
    pub request_id: Uuid,
    pub old_peer_id: Did,
    pub new_peer_id: Did,
    pub status: RecoveryStatus,
    pub approvals_count: usize,
    pub threshold: usize,
    pub approvals: Vec<Did>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_cid: Option<String>,
}

impl From<RecoveryRequest> for RecoveryStatusResponse {
    fn from(request: RecoveryRequest) -> Self {
        Self {
            request_id: request.request_id,
            approvals_count: request.approvals_count(),
            old_peer_id: request.old_peer_id,
            new_peer_id: request.new_peer_id,
            status: request.status,
            threshold: request.threshold,
            approvals: request.approvals.into_iter().collect(),
            created_at: request.created_at,
            updated_at: request.updated_at,
            expires_at: request.expires_at,
            completed_at: request.completed_at,
            attestation_cid: request.attestation_cid,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct StatusQuery {
    /// Long-poll: wait up to this many seconds (max 60) for a change.
    pub wait_secs: Option<u64>,
}

/// Shard split parameters; defaults are 3 of 5.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ShardSetupForm {
    pub threshold: Option<u32>,
    pub shares: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShardSetupResponse {
    pub did: Did,
    pub threshold: u32,
    pub shares: u32,
    /// Secret material: hand each shard to a different person.
    pub shards: Vec<String>,
    pub instructions: String,
}

/// JSON body of a shard restore.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RestoreRequest {
    pub shards: Vec<String>,
    /// Reject the result unless it rebuilds this DID.
    #[serde(default)]
    pub expected_did: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RestoredIdentityResponse {
    pub did: Did,
    pub secret: String,
    pub origin: AccountOrigin,
    /// Differs from `did` when the identity was since recovered by guardians.
    pub current_did: Did,
}

// =============================================================================
// Social
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TierResponse {
    pub peer_id: Did,
    pub tier: RelationshipTier,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionRequestResponse {
    pub peer_id: Did,
    pub outcome: ConnectionRequestOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionsResponse {
    pub incoming: Vec<Did>,
    pub outgoing: Vec<Did>,
    pub contacts: Vec<Did>,
}

impl From<StoredRelationships> for ConnectionsResponse {
    fn from(record: StoredRelationships) -> Self {
        Self {
            contacts: record.peers_at(RelationshipTier::Contact),
            incoming: record.incoming.into_iter().collect(),
            outgoing: record.outgoing.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelationshipEntry {
    pub peer_id: Did,
    pub tier: RelationshipTier,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelationshipsResponse {
    pub owner: Did,
    pub peers: Vec<RelationshipEntry>,
}

impl From<StoredRelationships> for RelationshipsResponse {
    fn from(record: StoredRelationships) -> Self {
        Self {
            peers: record
                .peers
                .into_iter()
                .map(|(peer_id, rel)| RelationshipEntry {
                    peer_id,
                    tier: rel.tier,
                    since: rel.since,
                })
                .collect(),
            owner: record.owner,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct NotificationsQuery {
    /// Page size, at most 50.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

// =============================================================================
// Audit
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// First day (`YYYY-MM-DD`), defaults to `to`.
    pub from: Option<NaiveDate>,
    /// Last day, inclusive; defaults to today (UTC).
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEventsResponse {
    pub did: Did,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub events: Vec<AuditEvent>,
}

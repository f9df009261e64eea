// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Social Graph Service
//!
//! Relationships between peers are ranked `None < Sync < Contact`:
//!
//! - `Sync` is a one-way follow.
//! - `Contact` is mutual, created by an accepted connection request. Only
//!   contacts may message each other or serve as guardians.
//!
//! Follow never downgrades a contact, and unfollow leaves a contact intact.
//! All mutations are serialized by one async mutex.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::audit_log;
use crate::identity::Did;
use crate::storage::{
    AuditEventType, FileStorage, Notification, NotificationKind, NotificationRepository,
    RelationshipRepository, StorageError, StoredRelationships,
};

/// Relationship tier, ordered by trust.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipTier {
    #[default]
    None,
    Sync,
    Contact,
}

impl RelationshipTier {
    /// Only contacts can be nominated as guardians.
    pub fn is_guardian_eligible(self) -> bool {
        match self {
            RelationshipTier::Contact => true,
            RelationshipTier::Sync | RelationshipTier::None => false,
        }
    }

    /// Monotonic upgrade: never lowers the tier.
    pub fn upgrade(self, to: RelationshipTier) -> RelationshipTier {
        self.max(to)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SocialError {
    #[error("an identity cannot follow or connect to itself")]
    SelfRelationship,

    #[error("no pending connection request from {0}")]
    NoPendingRequest(Did),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRequestOutcome {
    Sent,
    AlreadyPending,
    AlreadyContacts,
}

/// Deliver a notification; failures are logged, never propagated.
pub(crate) fn dispatch_notification(
    storage: &FileStorage,
    recipient: &Did,
    notification: Notification,
) {
    let kind = notification.kind;
    if let Err(e) = NotificationRepository::new(storage).push(recipient, notification) {
        warn!(recipient = %recipient, kind = ?kind, error = %e, "Failed to deliver notification");
    }
}

pub struct SocialGraph {
    storage: Arc<FileStorage>,
    lock: Mutex<()>,
}

impl SocialGraph {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    fn repo(&self) -> RelationshipRepository<'_> {
        RelationshipRepository::new(&self.storage)
    }

    /// Follow `peer`. Returns the resulting tier.
    pub async fn follow(&self, owner: &Did, peer: &Did) -> Result<RelationshipTier, SocialError> {
        if owner == peer {
            return Err(SocialError::SelfRelationship);
        }
        let _guard = self.lock.lock().await;

        let mut record = self.repo().get(owner)?;
        let current = record.tier(peer);
        let next = current.upgrade(RelationshipTier::Sync);
        if next == current {
            return Ok(current);
        }

        record.set_tier(peer, next, Utc::now());
        self.repo().save(&record)?;

        info!(owner = %owner, peer = %peer, "Followed peer");
        audit_log!(&self.storage, AuditEventType::PeerFollowed, owner, "peer", peer);
        dispatch_notification(
            &self.storage,
            peer,
            Notification::new(
                NotificationKind::Follow,
                "New follower",
                format!("{owner} started following you"),
                Some(format!("/profile/{owner}")),
            ),
        );

        Ok(next)
    }

    /// Stop following `peer`. Contacts are left untouched.
    pub async fn unfollow(&self, owner: &Did, peer: &Did) -> Result<RelationshipTier, SocialError> {
        if owner == peer {
            return Err(SocialError::SelfRelationship);
        }
        let _guard = self.lock.lock().await;

        let mut record = self.repo().get(owner)?;
        let current = record.tier(peer);
        if current != RelationshipTier::Sync {
            return Ok(current);
        }

        record.set_tier(peer, RelationshipTier::None, Utc::now());
        self.repo().save(&record)?;

        info!(owner = %owner, peer = %peer, "Unfollowed peer");
        audit_log!(&self.storage, AuditEventType::PeerUnfollowed, owner, "peer", peer);

        Ok(RelationshipTier::None)
    }

    /// Ask `peer` to become a contact.
    pub async fn request_connection(
        &self,
        owner: &Did,
        peer: &Did,
    ) -> Result<ConnectionRequestOutcome, SocialError> {
        if owner == peer {
            return Err(SocialError::SelfRelationship);
        }
        let _guard = self.lock.lock().await;

        let mut mine = self.repo().get(owner)?;
        if mine.tier(peer) == RelationshipTier::Contact {
            return Ok(ConnectionRequestOutcome::AlreadyContacts);
        }
        if mine.outgoing.contains(peer) {
            return Ok(ConnectionRequestOutcome::AlreadyPending);
        }

        let mut theirs = self.repo().get(peer)?;
        mine.outgoing.insert(peer.clone());
        theirs.incoming.insert(owner.clone());
        self.repo().save(&mine)?;
        self.repo().save(&theirs)?;

        info!(owner = %owner, peer = %peer, "Connection requested");
        audit_log!(&self.storage, AuditEventType::ConnectionRequested, owner, "peer", peer);
        dispatch_notification(
            &self.storage,
            peer,
            Notification::new(
                NotificationKind::ConnectionRequest,
                "Connection request",
                format!("{owner} wants to connect"),
                Some("/connections".to_string()),
            ),
        );

        Ok(ConnectionRequestOutcome::Sent)
    }

    /// Accept a pending request from `peer`; both sides become contacts.
    pub async fn accept_connection(&self, owner: &Did, peer: &Did) -> Result<(), SocialError> {
        if owner == peer {
            return Err(SocialError::SelfRelationship);
        }
        let _guard = self.lock.lock().await;

        let mut mine = self.repo().get(owner)?;
        if !mine.incoming.contains(peer) {
            return Err(SocialError::NoPendingRequest(peer.clone()));
        }
        let mut theirs = self.repo().get(peer)?;

        clear_pending(&mut mine, &mut theirs);
        let now = Utc::now();
        mine.set_tier(peer, RelationshipTier::Contact, now);
        theirs.set_tier(owner, RelationshipTier::Contact, now);
        self.repo().save(&mine)?;
        self.repo().save(&theirs)?;

        info!(owner = %owner, peer = %peer, "Connection accepted");
        audit_log!(&self.storage, AuditEventType::ConnectionAccepted, owner, "peer", peer);
        dispatch_notification(
            &self.storage,
            peer,
            Notification::new(
                NotificationKind::ConnectionAccepted,
                "Connection accepted",
                format!("{owner} accepted your connection request"),
                Some(format!("/profile/{owner}")),
            ),
        );

        Ok(())
    }

    /// Decline a pending request from `peer`.
    pub async fn reject_connection(&self, owner: &Did, peer: &Did) -> Result<(), SocialError> {
        if owner == peer {
            return Err(SocialError::SelfRelationship);
        }
        let _guard = self.lock.lock().await;

        let mut mine = self.repo().get(owner)?;
        if !mine.incoming.contains(peer) {
            return Err(SocialError::NoPendingRequest(peer.clone()));
        }
        let mut theirs = self.repo().get(peer)?;

        clear_pending(&mut mine, &mut theirs);
        self.repo().save(&mine)?;
        self.repo().save(&theirs)?;

        info!(owner = %owner, peer = %peer, "Connection rejected");
        audit_log!(&self.storage, AuditEventType::ConnectionRejected, owner, "peer", peer);

        Ok(())
    }

    /// The owner's full relationship record.
    pub fn relationships(&self, owner: &Did) -> Result<StoredRelationships, SocialError> {
        Ok(self.repo().get(owner)?)
    }

    pub fn tier(&self, owner: &Did, peer: &Did) -> Result<RelationshipTier, SocialError> {
        Ok(self.repo().tier(owner, peer)?)
    }

    pub fn contacts(&self, owner: &Did) -> Result<Vec<Did>, SocialError> {
        Ok(self.repo().get(owner)?.peers_at(RelationshipTier::Contact))
    }

    /// Hand `from`'s graph to `to` and repoint every peer that referenced `from`.
    pub(crate) async fn transfer(&self, from: &Did, to: &Did) -> Result<(), SocialError> {
        let _guard = self.lock.lock().await;
        let repo = self.repo();

        let old = repo.get(from)?;
        let mut merged = repo.get(to)?;
        let now = Utc::now();
        for (peer, rel) in &old.peers {
            if peer == to {
                continue;
            }
            let tier = merged.tier(peer).upgrade(rel.tier);
            merged.set_tier(peer, tier, now);
        }
        merged
            .incoming
            .extend(old.incoming.iter().filter(|p| *p != to).cloned());
        merged
            .outgoing
            .extend(old.outgoing.iter().filter(|p| *p != to).cloned());
        merged.rename_peer(from, to);
        merged.peers.remove(to);
        merged.incoming.remove(to);
        merged.outgoing.remove(to);
        repo.save(&merged)?;
        repo.delete(from)?;

        for owner in repo.list_owners()? {
            if owner == *to {
                continue;
            }
            let mut record = repo.get(&owner)?;
            if record.mentions(from) {
                record.rename_peer(from, to);
                repo.save(&record)?;
            }
        }

        NotificationRepository::new(&self.storage).transfer(from, to)?;

        info!(from = %from, to = %to, "Social graph transferred");
        Ok(())
    }
}

fn clear_pending(mine: &mut StoredRelationships, theirs: &mut StoredRelationships) {
    mine.incoming.remove(&theirs.owner);
    mine.outgoing.remove(&theirs.owner);
    theirs.incoming.remove(&mine.owner);
    theirs.outgoing.remove(&mine.owner);
}

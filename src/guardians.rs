// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Guardian Registry
//!
//! Each identity nominates up to [`MAX_GUARDIANS`] contacts who may later
//! approve a recovery of that identity. The set has set semantics: adding a
//! present guardian is a no-op, removing an absent one is a no-op.
//!
//! Mutations are serialized by an async mutex so concurrent adds can never
//! push a set past capacity.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use crate::audit_log;
use crate::identity::Did;
use crate::social::dispatch_notification;
use crate::storage::{
    AuditEventType, FileStorage, GuardianRepository, Notification, NotificationKind,
    RelationshipRepository, StorageError,
};

/// Maximum number of guardians per identity.
pub const MAX_GUARDIANS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum GuardianError {
    #[error("maximum {MAX_GUARDIANS} guardians allowed")]
    CapacityExceeded,

    #[error("{0} is not a contact; only contacts can be guardians")]
    NotAContact(Did),

    #[error("an identity cannot be its own guardian")]
    SelfNomination,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct GuardianRegistry {
    storage: Arc<FileStorage>,
    lock: Mutex<()>,
}

impl GuardianRegistry {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    /// Nominate `peer` as a guardian of `owner`. Returns the resulting set.
    pub async fn add(&self, owner: &Did, peer: &Did) -> Result<Vec<Did>, GuardianError> {
        if owner == peer {
            return Err(GuardianError::SelfNomination);
        }
        let _guard = self.lock.lock().await;
        let repo = GuardianRepository::new(&self.storage);

        let mut set = repo.get(owner)?;
        if set.guardians.contains(peer) {
            return Ok(set.guardians.into_iter().collect());
        }
        if set.guardians.len() >= MAX_GUARDIANS {
            return Err(GuardianError::CapacityExceeded);
        }
        let tier = RelationshipRepository::new(&self.storage).tier(owner, peer)?;
        if !tier.is_guardian_eligible() {
            return Err(GuardianError::NotAContact(peer.clone()));
        }

        set.guardians.insert(peer.clone());
        set.updated_at = Utc::now();
        repo.save(&set)?;

        info!(owner = %owner, guardian = %peer, count = set.guardians.len(), "Guardian added");
        audit_log!(&self.storage, AuditEventType::GuardianAdded, owner, "guardian", peer);
        dispatch_notification(
            &self.storage,
            peer,
            Notification::new(
                NotificationKind::GuardianAdded,
                "You are now a guardian",
                format!("{owner} added you as a recovery guardian"),
                None,
            ),
        );

        Ok(set.guardians.into_iter().collect())
    }

    /// Remove `peer` from `owner`'s guardians. Returns the resulting set.
    pub async fn remove(&self, owner: &Did, peer: &Did) -> Result<Vec<Did>, GuardianError> {
        let _guard = self.lock.lock().await;
        let repo = GuardianRepository::new(&self.storage);

        let mut set = repo.get(owner)?;
        if set.guardians.remove(peer) {
            set.updated_at = Utc::now();
            repo.save(&set)?;
            info!(owner = %owner, guardian = %peer, count = set.guardians.len(), "Guardian removed");
            audit_log!(&self.storage, AuditEventType::GuardianRemoved, owner, "guardian", peer);
        }

        Ok(set.guardians.into_iter().collect())
    }

    pub fn list(&self, owner: &Did) -> Result<Vec<Did>, GuardianError> {
        let set = GuardianRepository::new(&self.storage).get(owner)?;
        Ok(set.guardians.into_iter().collect())
    }

    pub fn is_guardian(&self, owner: &Did, peer: &Did) -> Result<bool, GuardianError> {
        let set = GuardianRepository::new(&self.storage).get(owner)?;
        Ok(set.guardians.contains(peer))
    }

    /// Move `from`'s guardian set to `to`, and replace `from` by `to` in
    /// every set where `from` served as a guardian.
    ///
    /// Re-running after a partial failure finishes the move: `from`'s set is
    /// only deleted once every other write has landed.
    pub(crate) async fn transfer(&self, from: &Did, to: &Did) -> Result<(), GuardianError> {
        let _guard = self.lock.lock().await;
        let repo = GuardianRepository::new(&self.storage);
        let now = Utc::now();

        let old = repo.get(from)?;
        let mut new = repo.get(to)?;
        new.guardians.extend(old.guardians.into_iter().filter(|g| g != to));
        new.guardians.remove(from);
        // A merged set can exceed capacity; trim from the end of DID order.
        while new.guardians.len() > MAX_GUARDIANS {
            if let Some(extra) = new.guardians.iter().next_back().cloned() {
                new.guardians.remove(&extra);
            }
        }
        new.updated_at = now;
        repo.save(&new)?;

        for owner in repo.list_owners()? {
            if owner == *to || owner == *from {
                continue;
            }
            let mut set = repo.get(&owner)?;
            if set.guardians.remove(from) {
                set.guardians.insert(to.clone());
                set.updated_at = now;
                repo.save(&set)?;
            }
        }
        repo.delete(from)?;

        info!(from = %from, to = %to, "Guardian set transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::SocialGraph;
    use tempfile::TempDir;

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    struct Fixture {
        _temp: TempDir,
        graph: SocialGraph,
        registry: GuardianRegistry,
    }

    fn setup() -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::open(temp.path()).unwrap());
        Fixture {
            _temp: temp,
            graph: SocialGraph::new(storage.clone()),
            registry: GuardianRegistry::new(storage),
        }
    }

    async fn connect(graph: &SocialGraph, a: &Did, b: &Did) {
        graph.request_connection(a, b).await.unwrap();
        graph.accept_connection(b, a).await.unwrap();
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let f = setup();
        let (owner, g) = (did("Owner"), did("G1"));
        connect(&f.graph, &owner, &g).await;

        assert_eq!(f.registry.add(&owner, &g).await.unwrap(), vec![g.clone()]);
        assert_eq!(f.registry.add(&owner, &g).await.unwrap(), vec![g.clone()]);
        assert!(f.registry.is_guardian(&owner, &g).unwrap());
    }

    #[tokio::test]
    async fn eighth_guardian_is_rejected() {
        let f = setup();
        let owner = did("Owner");
        let peers: Vec<Did> = (1..=8).map(|i| did(&format!("G{i}"))).collect();
        for peer in &peers {
            connect(&f.graph, &owner, peer).await;
        }

        for peer in &peers[..7] {
            f.registry.add(&owner, peer).await.unwrap();
        }
        let err = f.registry.add(&owner, &peers[7]).await.unwrap_err();
        assert!(matches!(err, GuardianError::CapacityExceeded));
        assert_eq!(f.registry.list(&owner).unwrap().len(), MAX_GUARDIANS);

        // Re-adding an existing guardian at capacity is still a no-op success.
        assert_eq!(
            f.registry.add(&owner, &peers[0]).await.unwrap().len(),
            MAX_GUARDIANS
        );
    }

    #[tokio::test]
    async fn non_contact_is_rejected() {
        let f = setup();
        let (owner, follower) = (did("Owner"), did("Follower"));
        f.graph.follow(&owner, &follower).await.unwrap();

        let err = f.registry.add(&owner, &follower).await.unwrap_err();
        assert!(matches!(err, GuardianError::NotAContact(_)));

        let err = f.registry.add(&owner, &did("Stranger")).await.unwrap_err();
        assert!(matches!(err, GuardianError::NotAContact(_)));
        assert!(f.registry.list(&owner).unwrap().is_empty());
    }

    #[tokio::test]
    async fn self_nomination_is_rejected() {
        let f = setup();
        let owner = did("Owner");
        assert!(matches!(
            f.registry.add(&owner, &owner).await,
            Err(GuardianError::SelfNomination)
        ));
    }

    #[tokio::test]
    async fn remove_is_noop_when_absent() {
        let f = setup();
        let (owner, g) = (did("Owner"), did("G1"));
        connect(&f.graph, &owner, &g).await;
        f.registry.add(&owner, &g).await.unwrap();

        assert_eq!(f.registry.remove(&owner, &did("Other")).await.unwrap().len(), 1);
        assert!(f.registry.remove(&owner, &g).await.unwrap().is_empty());
        assert!(f.registry.remove(&owner, &g).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_never_exceed_capacity() {
        let f = setup();
        let owner = did("Owner");
        let peers: Vec<Did> = (1..=12).map(|i| did(&format!("G{i}"))).collect();
        for peer in &peers {
            connect(&f.graph, &owner, peer).await;
        }

        let registry = Arc::new(f.registry);
        let handles: Vec<_> = peers
            .iter()
            .cloned()
            .map(|peer| {
                let registry = registry.clone();
                let owner = owner.clone();
                tokio::spawn(async move { registry.add(&owner, &peer).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(GuardianError::CapacityExceeded) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(accepted, MAX_GUARDIANS);
        assert_eq!(registry.list(&owner).unwrap().len(), MAX_GUARDIANS);
    }

    #[tokio::test]
    async fn transfer_moves_set_and_memberships() {
        let f = setup();
        let (old, new, g, other) = (did("Old"), did("New"), did("G1"), did("Other"));
        connect(&f.graph, &old, &g).await;
        connect(&f.graph, &other, &old).await;
        f.registry.add(&old, &g).await.unwrap();
        f.registry.add(&other, &old).await.unwrap();

        f.registry.transfer(&old, &new).await.unwrap();

        assert_eq!(f.registry.list(&new).unwrap(), vec![g.clone()]);
        assert!(f.registry.list(&old).unwrap().is_empty());
        assert_eq!(f.registry.list(&other).unwrap(), vec![new.clone()]);

        // Running it again changes nothing.
        f.registry.transfer(&old, &new).await.unwrap();
        assert_eq!(f.registry.list(&new).unwrap(), vec![g]);
        assert_eq!(f.registry.list(&other).unwrap(), vec![new]);
    }
}

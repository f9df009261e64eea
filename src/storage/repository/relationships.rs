// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relationship records. One file per owner under `relationships/`, holding
//! the owner's tier towards each peer plus pending connection requests.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::paths::did_from_file_stem;
use super::super::{FileStorage, StorageResult};
use crate::identity::Did;
use crate::social::RelationshipTier;

/// The owner's relationship to one peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerRelationship {
    pub tier: RelationshipTier,
    pub since: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the owner's social graph stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRelationships {
    pub owner: Did,
    #[serde(default)]
    pub peers: BTreeMap<Did, PeerRelationship>,
    /// Connection requests received and not yet answered.
    #[serde(default)]
    pub incoming: BTreeSet<Did>,
    /// Connection requests sent and not yet answered.
    #[serde(default)]
    pub outgoing: BTreeSet<Did>,
}

impl StoredRelationships {
    pub fn empty(owner: Did) -> Self {
        Self {
            owner,
            peers: BTreeMap::new(),
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
        }
    }

    pub fn tier(&self, peer: &Did) -> RelationshipTier {
        self.peers
            .get(peer)
            .map(|rel| rel.tier)
            .unwrap_or_default()
    }

    /// Set the tier towards `peer`. `None` removes the entry.
    pub fn set_tier(&mut self, peer: &Did, tier: RelationshipTier, now: DateTime<Utc>) {
        if tier == RelationshipTier::None {
            self.peers.remove(peer);
            return;
        }
        self.peers
            .entry(peer.clone())
            .and_modify(|rel| {
                rel.tier = tier;
                rel.updated_at = now;
            })
            .or_insert(PeerRelationship {
                tier,
                since: now,
                updated_at: now,
            });
    }

    /// Peers at exactly `tier`.
    pub fn peers_at(&self, tier: RelationshipTier) -> Vec<Did> {
        self.peers
            .iter()
            .filter(|(_, rel)| rel.tier == tier)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Whether this record mentions `peer` anywhere.
    pub fn mentions(&self, peer: &Did) -> bool {
        self.peers.contains_key(peer) || self.incoming.contains(peer) || self.outgoing.contains(peer)
    }

    /// Replace every mention of `from` by `to`, keeping the higher tier.
    pub fn rename_peer(&mut self, from: &Did, to: &Did) {
        if let Some(rel) = self.peers.remove(from) {
            match self.peers.get_mut(to) {
                Some(existing) => {
                    existing.tier = existing.tier.max(rel.tier);
                    existing.since = existing.since.min(rel.since);
                    existing.updated_at = existing.updated_at.max(rel.updated_at);
                }
                None => {
                    self.peers.insert(to.clone(), rel);
                }
            }
        }
        if self.incoming.remove(from) {
            self.incoming.insert(to.clone());
        }
        if self.outgoing.remove(from) {
            self.outgoing.insert(to.clone());
        }
    }
}

pub struct RelationshipRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> RelationshipRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// The owner's record, empty if none was saved.
    pub fn get(&self, owner: &Did) -> StorageResult<StoredRelationships> {
        Ok(self
            .storage
            .read_json_opt(self.storage.paths().relationships(owner.as_str()))?
            .unwrap_or_else(|| StoredRelationships::empty(owner.clone())))
    }

    pub fn save(&self, record: &StoredRelationships) -> StorageResult<()> {
        self.storage.write_json(
            self.storage.paths().relationships(record.owner.as_str()),
            record,
        )
    }

    pub fn delete(&self, owner: &Did) -> StorageResult<()> {
        let path = self.storage.paths().relationships(owner.as_str());
        if self.storage.exists(&path) {
            self.storage.delete(path)?;
        }
        Ok(())
    }

    /// The owner's tier towards `peer`.
    pub fn tier(&self, owner: &Did, peer: &Did) -> StorageResult<RelationshipTier> {
        Ok(self.get(owner)?.tier(peer))
    }

    /// Every owner with a saved record.
    pub fn list_owners(&self) -> StorageResult<Vec<Did>> {
        let stems = self
            .storage
            .list_files(self.storage.paths().relationships_dir(), "json")?;
        Ok(stems
            .iter()
            .filter_map(|stem| Did::parse(did_from_file_stem(stem)).ok())
            .collect())
    }
}

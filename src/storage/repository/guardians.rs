// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Guardian set persistence. One file per owner under `guardians/`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::paths::did_from_file_stem;
use super::super::{FileStorage, StorageResult};
use crate::identity::Did;

/// The guardians an owner has nominated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredGuardianSet {
    pub owner: Did,
    pub guardians: BTreeSet<Did>,
    pub updated_at: DateTime<Utc>,
}

impl StoredGuardianSet {
    pub fn empty(owner: Did) -> Self {
        Self {
            owner,
            guardians: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }
}

pub struct GuardianRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> GuardianRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// The owner's guardian set, empty if none was ever saved.
    pub fn get(&self, owner: &Did) -> StorageResult<StoredGuardianSet> {
        Ok(self
            .storage
            .read_json_opt(self.storage.paths().guardian_set(owner.as_str()))?
            .unwrap_or_else(|| StoredGuardianSet::empty(owner.clone())))
    }

    pub fn save(&self, set: &StoredGuardianSet) -> StorageResult<()> {
        self.storage
            .write_json(self.storage.paths().guardian_set(set.owner.as_str()), set)
    }

    /// Remove the owner's guardian set entirely. Missing sets are ignored.
    pub fn delete(&self, owner: &Did) -> StorageResult<()> {
        let path = self.storage.paths().guardian_set(owner.as_str());
        if self.storage.exists(&path) {
            self.storage.delete(path)?;
        }
        Ok(())
    }

    /// Every owner with a saved guardian set.
    pub fn list_owners(&self) -> StorageResult<Vec<Did>> {
        let stems = self
            .storage
            .list_files(self.storage.paths().guardians_dir(), "json")?;
        Ok(stems
            .iter()
            .filter_map(|stem| Did::parse(did_from_file_stem(stem)).ok())
            .collect())
    }
}

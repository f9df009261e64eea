// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity bindings written when a recovery completes.
//!
//! A binding records that `old_did` is now represented by `new_did`. The
//! request verifier refuses superseded DIDs and points callers at the
//! successor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::super::{FileStorage, StorageError, StorageResult};
use crate::identity::Did;

/// Bounds successor chains when resolving the current identity.
const MAX_SUCCESSION_DEPTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct IdentityBinding {
    pub old_did: Did,
    pub new_did: Did,
    pub request_id: Uuid,
    pub bound_at: DateTime<Utc>,
    /// Content id of the published completion record, once stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_cid: Option<String>,
}

pub struct BindingRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> BindingRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// The binding superseding `old_did`, if any.
    pub fn find(&self, old_did: &Did) -> StorageResult<Option<IdentityBinding>> {
        self.storage
            .read_json_opt(self.storage.paths().binding(old_did.as_str()))
    }

    pub fn create(&self, binding: &IdentityBinding) -> StorageResult<()> {
        let path = self.storage.paths().binding(binding.old_did.as_str());
        if self.storage.exists(&path) {
            return Err(StorageError::AlreadyExists(format!(
                "Binding for {}",
                binding.old_did
            )));
        }
        self.storage.write_json(path, binding)
    }

    pub fn update(&self, binding: &IdentityBinding) -> StorageResult<()> {
        let path = self.storage.paths().binding(binding.old_did.as_str());
        if !self.storage.exists(&path) {
            return Err(StorageError::NotFound(format!(
                "Binding for {}",
                binding.old_did
            )));
        }
        self.storage.write_json(path, binding)
    }

    /// Follow bindings from `did` to the identity currently acting for it.
    pub fn resolve_current(&self, did: &Did) -> StorageResult<Did> {
        let mut current = did.clone();
        for _ in 0..MAX_SUCCESSION_DEPTH {
            match self.find(&current)? {
                Some(binding) => current = binding.new_did,
                None => return Ok(current),
            }
        }
        Err(StorageError::Corrupted(format!(
            "Succession chain from {did} is too long"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    fn binding(old: &str, new: &str) -> IdentityBinding {
        IdentityBinding {
            old_did: did(old),
            new_did: did(new),
            request_id: Uuid::new_v4(),
            bound_at: Utc::now(),
            attestation_cid: None,
        }
    }

    #[test]
    fn create_once_and_resolve_chain() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let repo = BindingRepository::new(&storage);

        repo.create(&binding("A", "B")).unwrap();
        repo.create(&binding("B", "C")).unwrap();
        assert!(matches!(
            repo.create(&binding("A", "D")),
            Err(StorageError::AlreadyExists(_))
        ));

        assert_eq!(repo.resolve_current(&did("A")).unwrap(), did("C"));
        assert_eq!(repo.resolve_current(&did("C")).unwrap(), did("C"));
        assert!(repo.find(&did("C")).unwrap().is_none());
    }

    #[test]
    fn update_sets_attestation() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let repo = BindingRepository::new(&storage);

        let mut b = binding("A", "B");
        assert!(matches!(repo.update(&b), Err(StorageError::NotFound(_))));
        repo.create(&b).unwrap();
        b.attestation_cid = Some("bafy-test".into());
        repo.update(&b).unwrap();

        assert_eq!(
            repo.find(&did("A")).unwrap().unwrap().attestation_cid.as_deref(),
            Some("bafy-test")
        );
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local identity keystore.
//!
//! Each identity held by this node is stored under `accounts/{did}.json`.
//! Secrets are only ever read back by the request verifier and by explicit
//! export; they are never part of an API response except at generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::paths::did_from_file_stem;
use super::super::{FileStorage, StorageError, StorageResult};
use crate::identity::{Did, Identity, Secret};

/// How an identity came to be held by this node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountOrigin {
    Generated,
    Imported,
    /// Rebuilt from secret shards.
    Restored,
}

/// An identity held in the keystore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAccount {
    pub did: Did,
    pub secret: Secret,
    pub origin: AccountOrigin,
    pub created_at: DateTime<Utc>,
}

impl StoredAccount {
    pub fn new(identity: &Identity, origin: AccountOrigin) -> Self {
        Self {
            did: identity.did().clone(),
            secret: identity.secret().clone(),
            origin,
            created_at: Utc::now(),
        }
    }
}

/// Repository for the local keystore.
pub struct AccountRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> AccountRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, did: &Did) -> bool {
        self.storage.exists(self.storage.paths().account(did.as_str()))
    }

    /// Get an account by DID.
    pub fn get(&self, did: &Did) -> StorageResult<StoredAccount> {
        self.find(did)?
            .ok_or_else(|| StorageError::NotFound(format!("Account {did}")))
    }

    /// Get an account by DID, or `None` if this node does not hold it.
    pub fn find(&self, did: &Did) -> StorageResult<Option<StoredAccount>> {
        self.storage
            .read_json_opt(self.storage.paths().account(did.as_str()))
    }

    /// Store a new account.
    pub fn create(&self, account: &StoredAccount) -> StorageResult<()> {
        if self.exists(&account.did) {
            return Err(StorageError::AlreadyExists(format!("Account {}", account.did)));
        }
        self.storage
            .write_json(self.storage.paths().account(account.did.as_str()), account)
    }

    /// Erase an account from the keystore.
    pub fn delete(&self, did: &Did) -> StorageResult<()> {
        if !self.exists(did) {
            return Err(StorageError::NotFound(format!("Account {did}")));
        }
        self.storage.delete(self.storage.paths().account(did.as_str()))
    }

    /// DIDs of all held accounts.
    pub fn list_dids(&self) -> StorageResult<Vec<Did>> {
        let stems = self
            .storage
            .list_files(self.storage.paths().accounts_dir(), "json")?;

        Ok(stems
            .iter()
            .filter_map(|stem| Did::parse(did_from_file_stem(stem)).ok())
            .collect())
    }
}

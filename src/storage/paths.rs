// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the node's on-disk layout.

use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory of the node.
pub const DEFAULT_DATA_ROOT: &str = "./data";

/// Turn a DID into a file stem.
///
/// DIDs accepted by [`crate::identity::Did`] never contain `_`, so replacing
/// `:` with `_` is injective. Every stem starts with `did_`, which keeps the
/// result inside its directory.
pub fn did_file_stem(did: &str) -> String {
    did.replace(':', "_")
}

/// Inverse of [`did_file_stem`].
pub fn did_from_file_stem(stem: &str) -> String {
    stem.replace('_', ":")
}

/// Storage path utilities.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all node data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Identity Keystore ==========

    /// Directory containing locally held identities.
    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join("accounts")
    }

    /// Path to a locally held identity.
    pub fn account(&self, did: &str) -> PathBuf {
        self.accounts_dir()
            .join(format!("{}.json", did_file_stem(did)))
    }

    // ========== Guardian Sets ==========

    /// Directory containing guardian sets, one file per owner.
    pub fn guardians_dir(&self) -> PathBuf {
        self.root.join("guardians")
    }

    /// Path to the guardian set of `owner`.
    pub fn guardian_set(&self, owner: &str) -> PathBuf {
        self.guardians_dir()
            .join(format!("{}.json", did_file_stem(owner)))
    }

    // ========== Recovery Requests ==========

    /// Directory containing recovery requests.
    pub fn recovery_dir(&self) -> PathBuf {
        self.root.join("recovery")
    }

    /// Path to a recovery request. `request_id` must be a parsed UUID.
    pub fn recovery_request(&self, request_id: &str) -> PathBuf {
        self.recovery_dir().join(format!("{request_id}.json"))
    }

    // ========== Identity Bindings ==========

    /// Directory containing identity bindings produced by completed recoveries.
    pub fn bindings_dir(&self) -> PathBuf {
        self.root.join("bindings")
    }

    /// Path to the binding for a superseded DID.
    pub fn binding(&self, old_did: &str) -> PathBuf {
        self.bindings_dir()
            .join(format!("{}.json", did_file_stem(old_did)))
    }

    // ========== Social Graph ==========

    /// Directory containing relationship records, one file per owner.
    pub fn relationships_dir(&self) -> PathBuf {
        self.root.join("relationships")
    }

    /// Path to the relationship record of `owner`.
    pub fn relationships(&self, owner: &str) -> PathBuf {
        self.relationships_dir()
            .join(format!("{}.json", did_file_stem(owner)))
    }

    // ========== Notifications ==========

    /// Directory containing notification inboxes.
    pub fn notifications_dir(&self) -> PathBuf {
        self.root.join("notifications")
    }

    /// Path to the notification inbox of `owner`.
    pub fn notifications(&self, owner: &str) -> PathBuf {
        self.notifications_dir()
            .join(format!("{}.json", did_file_stem(owner)))
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

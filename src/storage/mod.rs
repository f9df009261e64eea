// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent node state as JSON files under the data directory
//! (`DATA_DIR`, default `./data`).
//!
//! ## Storage Layout
//!
//! ```text
//! data/
//!   accounts/{did}.json          # Local identities (DID + secret)
//!   guardians/{did}.json         # Guardian set per owner
//!   recovery/{request_id}.json   # Recovery requests
//!   bindings/{old_did}.json      # Completed recoveries (old -> new)
//!   relationships/{did}.json     # Tiers and pending connection requests
//!   notifications/{did}.json     # Notification inbox
//!   audit/
//!     {date}/events.jsonl        # Daily audit logs
//! ```
//!
//! `:` in DIDs is written as `_` in file names.

pub mod audit;
pub mod files;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use files::{FileStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
pub use repository::{
    AccountOrigin, AccountRepository, BindingRepository, GuardianRepository, IdentityBinding,
    Notification, NotificationKind, NotificationRepository, RecoveryRepository,
    RelationshipRepository, StoredAccount, StoredGuardianSet, StoredRelationships,
    NOTIFICATION_PAGE_SIZE,
};

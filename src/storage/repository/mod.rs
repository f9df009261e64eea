// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to file storage.
//!
//! Each repository borrows the [`FileStorage`](super::FileStorage) and owns
//! the layout of one entity type. Repositories do not lock; the services
//! that mutate them serialize their own read-modify-write cycles.

pub mod accounts;
pub mod bindings;
pub mod guardians;
pub mod notifications;
pub mod recovery;
pub mod relationships;

pub use accounts::{AccountOrigin, AccountRepository, StoredAccount};
pub use bindings::{BindingRepository, IdentityBinding};
pub use guardians::{GuardianRepository, StoredGuardianSet};
pub use notifications::{
    Notification, NotificationKind, NotificationRepository, NOTIFICATION_PAGE_SIZE,
};
pub use recovery::RecoveryRepository;
pub use relationships::{PeerRelationship, RelationshipRepository, StoredRelationships};

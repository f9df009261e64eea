// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Notification inboxes. One file per recipient under `notifications/`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::super::{FileStorage, StorageError, StorageResult};
use crate::identity::Did;

/// Maximum notifications returned by a listing.
pub const NOTIFICATION_PAGE_SIZE: usize = 50;

/// Oldest entries beyond this are dropped when a new one arrives.
const MAX_STORED_NOTIFICATIONS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    ConnectionRequest,
    ConnectionAccepted,
    GuardianAdded,
    RecoveryRequested,
    RecoveryCompleted,
}

/// A notification delivered to a local identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        link: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            message: message.into(),
            link,
            created_at: Utc::now(),
            read: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredInbox {
    /// Oldest first.
    items: Vec<Notification>,
}

pub struct NotificationRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    fn load(&self, owner: &Did) -> StorageResult<StoredInbox> {
        Ok(self
            .storage
            .read_json_opt(self.storage.paths().notifications(owner.as_str()))?
            .unwrap_or_default())
    }

    fn store(&self, owner: &Did, inbox: &StoredInbox) -> StorageResult<()> {
        self.storage
            .write_json(self.storage.paths().notifications(owner.as_str()), inbox)
    }

    /// Deliver a notification to `owner`.
    pub fn push(&self, owner: &Did, notification: Notification) -> StorageResult<()> {
        let mut inbox = self.load(owner)?;
        inbox.items.push(notification);
        if inbox.items.len() > MAX_STORED_NOTIFICATIONS {
            let excess = inbox.items.len() - MAX_STORED_NOTIFICATIONS;
            inbox.items.drain(..excess);
        }
        self.store(owner, &inbox)
    }

    /// Newest first, at most `limit`.
    pub fn list(&self, owner: &Did, limit: usize) -> StorageResult<Vec<Notification>> {
        let inbox = self.load(owner)?;
        Ok(inbox.items.into_iter().rev().take(limit).collect())
    }

    pub fn unread_count(&self, owner: &Did) -> StorageResult<usize> {
        Ok(self.load(owner)?.items.iter().filter(|n| !n.read).count())
    }

    /// Mark one notification as read.
    pub fn mark_read(&self, owner: &Did, id: &str) -> StorageResult<()> {
        let mut inbox = self.load(owner)?;
        let notification = inbox
            .items
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("Notification {id}")))?;
        notification.read = true;
        self.store(owner, &inbox)
    }

    /// Mark everything as read. Returns how many changed.
    pub fn mark_all_read(&self, owner: &Did) -> StorageResult<usize> {
        let mut inbox = self.load(owner)?;
        let mut changed = 0;
        for notification in inbox.items.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.store(owner, &inbox)?;
        }
        Ok(changed)
    }

    /// Move an inbox to a new owner, appending to anything already there.
    pub fn transfer(&self, from: &Did, to: &Did) -> StorageResult<()> {
        let old = self.load(from)?;
        if old.items.is_empty() {
            return Ok(());
        }
        let mut merged = self.load(to)?;
        merged.items.extend(old.items);
        merged.items.sort_by_key(|n| n.created_at);
        self.store(to, &merged)?;
        self.storage
            .delete(self.storage.paths().notifications(from.as_str()))
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Identity lifecycle, authentication failures, guardian changes, recovery
//! transitions and social graph changes are appended to a daily JSONL file.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{FileStorage, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Identity events
    IdentityGenerated,
    IdentityImported,
    IdentityErased,

    // Auth events
    AuthFailure,

    // Guardian events
    GuardianAdded,
    GuardianRemoved,

    // Recovery events
    RecoveryShardsIssued,
    IdentityRestored,
    RecoveryInitiated,
    RecoveryApproved,
    RecoveryCompleted,
    RecoveryCancelled,
    RecoveryExpired,

    // Social graph events
    PeerFollowed,
    PeerUnfollowed,
    ConnectionRequested,
    ConnectionAccepted,
    ConnectionRejected,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// DID that triggered the event (if known).
    pub did: Option<String>,
    /// Resource affected (request id, peer DID, ...).
    pub resource_id: Option<String>,
    /// Resource type (recovery_request, peer, ...).
    pub resource_type: Option<String>,
    /// Additional details as JSON.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            did: None,
            resource_id: None,
            resource_type: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> AuditRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    /// Log an audit event.
    ///
    /// Events are appended to a daily log file in JSONL format.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        self.storage.append_raw(&path, &line)
    }

    /// Read audit events for a specific date.
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = self.storage.read_raw(&path)?;

        let content = String::from_utf8(content)
            .map_err(|e| StorageError::Corrupted(format!("Invalid UTF-8 in audit log: {e}")))?;

        let mut events = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            events.push(serde_json::from_str(line)?);
        }

        Ok(events)
    }

    /// Read events for an inclusive date range. Days without a log are skipped.
    pub fn read_events_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StorageResult<Vec<AuditEvent>> {
        let mut all_events = Vec::new();
        for day in start.iter_days().take_while(|day| *day <= end) {
            match self.read_events(&day.format("%Y-%m-%d").to_string()) {
                Ok(events) => all_events.extend(events),
                Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(all_events)
    }

    /// Events triggered by one DID within an inclusive date range.
    pub fn search_by_did(
        &self,
        did: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StorageResult<Vec<AuditEvent>> {
        let events = self.read_events_range(start, end)?;
        Ok(events
            .into_iter()
            .filter(|e| e.did.as_deref() == Some(did))
            .collect())
    }
}

/// Helper macro for logging audit events.
///
/// Audit failures are logged and never fail the surrounding operation.
#[macro_export]
macro_rules! audit_log {
    (@write $storage:expr, $event:expr) => {{
        let repo = $crate::storage::AuditRepository::new($storage);
        if let Err(e) = repo.log(&$event) {
            tracing::warn!(error = %e, event_type = ?$event.event_type, "Failed to write audit event");
        }
    }};
    ($storage:expr, $event_type:expr, $did:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type).with_did($did.to_string());
        $crate::audit_log!(@write $storage, event)
    }};
    ($storage:expr, $event_type:expr, $did:expr, $resource_type:expr, $resource_id:expr) => {{
        let event = $crate::storage::AuditEvent::new($event_type)
            .with_did($did.to_string())
            .with_resource($resource_type, $resource_id.to_string());
        $crate::audit_log!(@write $storage, event)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FileStorage) {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        (temp, storage)
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::RecoveryInitiated)
            .with_did("did:key:zNew")
            .with_resource("recovery_request", "req-1");

        assert_eq!(event.event_type, AuditEventType::RecoveryInitiated);
        assert_eq!(event.did.as_deref(), Some("did:key:zNew"));
        assert_eq!(event.resource_type.as_deref(), Some("recovery_request"));
        assert!(event.success);
    }

    #[test]
    fn details_are_kept() {
        let event = AuditEvent::new(AuditEventType::RecoveryShardsIssued)
            .with_details(serde_json::json!({ "threshold": 3, "shares": 5 }));
        assert_eq!(event.details.unwrap()["shares"], 5);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::AuthFailure)
            .with_did("did:key:zMallory")
            .failed("invalid signature");

        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("invalid signature"));
    }

    #[test]
    fn log_and_read_events() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.log(&AuditEvent::new(AuditEventType::GuardianAdded).with_did("did:key:zA"))
            .unwrap();
        repo.log(&AuditEvent::new(AuditEventType::GuardianRemoved).with_did("did:key:zB"))
            .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = repo.read_events(&today).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::GuardianAdded);
        assert_eq!(events[1].event_type, AuditEventType::GuardianRemoved);

        let day = Utc::now().date_naive();
        let only_b = repo.search_by_did("did:key:zB", day, day).unwrap();
        assert_eq!(only_b.len(), 1);
    }

    #[test]
    fn range_skips_missing_days() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);
        repo.log(&AuditEvent::new(AuditEventType::PeerFollowed)).unwrap();

        let today = Utc::now().date_naive();
        let events = repo
            .read_events_range(today - chrono::Days::new(3), today)
            .unwrap();
        assert_eq!(events.len(), 1);

        let before = today - chrono::Days::new(1);
        assert!(repo.read_events_range(today, before).unwrap().is_empty());
    }

    #[test]
    fn audit_macro_writes_event() {
        let (_temp, storage) = setup();
        audit_log!(
            &storage,
            AuditEventType::ConnectionAccepted,
            "did:key:zA",
            "peer",
            "did:key:zB"
        );

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = AuditRepository::new(&storage).read_events(&today).unwrap();
        assert_eq!(events[0].resource_id.as_deref(), Some("did:key:zB"));
    }
}

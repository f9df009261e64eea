// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery coordinator: persistence, serialization and side effects.
//!
//! Every read-modify-write of a recovery request runs under one async mutex,
//! so concurrent approvals are applied one at a time and the transition to
//! `Completed` (with its event, binding and data transfer) happens once.
//!
//! Lock order is coordinator, then guardian registry, then social graph.
//! Neither of the other services ever takes the coordinator lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    ApprovalOutcome, RecoveryAttestation, RecoveryError, RecoveryEvent, RecoveryRequest,
    RecoveryStatus, DEFAULT_RECOVERY_THRESHOLD,
};
use crate::audit_log;
use crate::content_store::ContentStore;
use crate::guardians::GuardianRegistry;
use crate::identity::Did;
use crate::social::{dispatch_notification, SocialGraph};
use crate::storage::{
    AuditEvent, AuditEventType, BindingRepository, FileStorage, IdentityBinding, Notification,
    NotificationKind, RecoveryRepository, StorageError,
};

/// Upper bound for a long-poll on request status.
pub const MAX_STATUS_WAIT: Duration = Duration::from_secs(60);

/// Default lifetime of a pending request.
const DEFAULT_TTL: chrono::Duration = chrono::Duration::days(7);

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverySettings {
    pub threshold: usize,
    /// `None` disables expiry.
    pub ttl: Option<chrono::Duration>,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_RECOVERY_THRESHOLD,
            ttl: Some(DEFAULT_TTL),
        }
    }
}

pub struct RecoveryCoordinator {
    storage: Arc<FileStorage>,
    guardians: Arc<GuardianRegistry>,
    social: Arc<SocialGraph>,
    content: Arc<dyn ContentStore>,
    settings: RecoverySettings,
    lock: Mutex<()>,
    events: broadcast::Sender<RecoveryEvent>,
}

fn parse_peer(value: &str) -> Result<Did, RecoveryError> {
    Did::parse(value.trim()).map_err(|e| RecoveryError::InvalidPeerId(e.to_string()))
}

fn parse_request_id(value: &str) -> Result<Uuid, RecoveryError> {
    Uuid::parse_str(value.trim()).map_err(|_| RecoveryError::UnknownRequest(value.to_string()))
}

impl RecoveryCoordinator {
    pub fn new(
        storage: Arc<FileStorage>,
        guardians: Arc<GuardianRegistry>,
        social: Arc<SocialGraph>,
        content: Arc<dyn ContentStore>,
        settings: RecoverySettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            guardians,
            social,
            content,
            settings,
            lock: Mutex::new(()),
            events,
        }
    }

    pub fn settings(&self) -> RecoverySettings {
        self.settings
    }

    /// Receive every recovery event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RecoveryEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }

    fn repo(&self) -> RecoveryRepository<'_> {
        RecoveryRepository::new(&self.storage)
    }

    fn load(&self, request_id: &Uuid) -> Result<RecoveryRequest, RecoveryError> {
        self.repo().get(request_id).map_err(|e| match e {
            StorageError::NotFound(_) => RecoveryError::UnknownRequest(request_id.to_string()),
            other => RecoveryError::Storage(other),
        })
    }

    /// Expire a loaded request if its TTL passed. Caller holds the lock.
    fn expire_locked(&self, request: &mut RecoveryRequest) -> Result<bool, RecoveryError> {
        if !request.expire_if_due(Utc::now()) {
            return Ok(false);
        }
        self.repo().update(request)?;
        info!(request_id = %request.request_id, old = %request.old_peer_id, "Recovery request expired");
        audit_log!(
            &self.storage,
            AuditEventType::RecoveryExpired,
            request.new_peer_id,
            "recovery_request",
            request.request_id
        );
        self.emit(RecoveryEvent::Expired {
            request_id: request.request_id,
        });
        Ok(true)
    }

    /// Open a recovery of `old` in favour of `new`. Only `new` may ask.
    pub async fn initiate(
        &self,
        caller: &Did,
        old: &str,
        new: &str,
    ) -> Result<RecoveryRequest, RecoveryError> {
        let old = parse_peer(old)?;
        let new = parse_peer(new)?;
        if *caller != new {
            return Err(RecoveryError::Unauthorized(
                "only the new identity can request its recovery",
            ));
        }

        let request = RecoveryRequest::initiate(
            old,
            new,
            self.settings.threshold,
            self.settings.ttl,
            Utc::now(),
        )?;

        let _guard = self.lock.lock().await;

        if BindingRepository::new(&self.storage)
            .find(&request.old_peer_id)?
            .is_some()
        {
            return Err(RecoveryError::AlreadyRecovered(request.old_peer_id));
        }

        let guardians = self.guardians.list(&request.old_peer_id)?;
        if guardians.len() < request.threshold {
            warn!(
                old = %request.old_peer_id,
                guardians = guardians.len(),
                threshold = request.threshold,
                "Recovery requested for an identity with fewer guardians than the threshold"
            );
        }

        self.repo().create(&request)?;

        info!(
            request_id = %request.request_id,
            old = %request.old_peer_id,
            new = %request.new_peer_id,
            "Recovery request created"
        );
        audit_log!(
            &self.storage,
            AuditEventType::RecoveryInitiated,
            request.new_peer_id,
            "recovery_request",
            request.request_id
        );

        for guardian in &guardians {
            dispatch_notification(
                &self.storage,
                guardian,
                Notification::new(
                    NotificationKind::RecoveryRequested,
                    "Recovery approval needed",
                    format!(
                        "{} asks to recover {}",
                        request.new_peer_id, request.old_peer_id
                    ),
                    Some(format!("/recovery/{}", request.request_id)),
                ),
            );
        }

        Ok(request)
    }

    /// Record `guardian`'s approval. The caller must be that guardian.
    ///
    /// The approval that reaches the threshold is only persisted after every
    /// completion effect has been applied. If one of them fails, the request
    /// stays pending and the same approval can be sent again to finish it.
    pub async fn approve(
        &self,
        caller: &Did,
        request_id: &str,
        guardian: &str,
    ) -> Result<RecoveryRequest, RecoveryError> {
        let guardian = parse_peer(guardian)?;
        if *caller != guardian {
            return Err(RecoveryError::Unauthorized(
                "guardians can only approve on their own behalf",
            ));
        }
        let request_id = parse_request_id(request_id)?;

        let completed = {
            let _guard = self.lock.lock().await;

            let mut request = self.load(&request_id)?;
            self.expire_locked(&mut request)?;
            if request.status.is_terminal() {
                return Err(RecoveryError::AlreadyTerminal(request.status));
            }
            if guardian == request.new_peer_id {
                return Err(RecoveryError::Unauthorized(
                    "the identity being recovered to cannot approve its own recovery",
                ));
            }
            if !self.may_approve(&request, &guardian)? {
                return Err(RecoveryError::NotAGuardian(guardian));
            }

            let outcome = request.approve(&guardian, Utc::now())?;
            let superseded = match outcome {
                ApprovalOutcome::Recorded { .. } => Vec::new(),
                ApprovalOutcome::Completed { .. } => self.apply_completion(&request).await?,
            };
            self.repo().update(&request)?;

            info!(
                request_id = %request_id,
                guardian = %guardian,
                approvals = request.approvals_count(),
                threshold = request.threshold,
                "Recovery approval recorded"
            );
            audit_log!(
                &self.storage,
                AuditEventType::RecoveryApproved,
                guardian,
                "recovery_request",
                request_id
            );
            self.emit(RecoveryEvent::Approved {
                request_id,
                guardian: guardian.clone(),
                approvals_count: request.approvals_count(),
            });

            match outcome {
                ApprovalOutcome::Recorded { .. } => return Ok(request),
                ApprovalOutcome::Completed { approvals_count } => {
                    self.announce_completion(&request, approvals_count, &superseded);
                    request
                }
            }
        };

        Ok(self.publish_attestation(completed).await)
    }

    /// Guardians of the old identity may approve. While a completion of this
    /// very request is only partly applied, its guardians may already have
    /// moved to the new identity.
    fn may_approve(&self, request: &RecoveryRequest, guardian: &Did) -> Result<bool, RecoveryError> {
        if self.guardians.is_guardian(&request.old_peer_id, guardian)? {
            return Ok(true);
        }
        let resuming = BindingRepository::new(&self.storage)
            .find(&request.old_peer_id)?
            .is_some_and(|binding| binding.request_id == request.request_id);
        Ok(resuming && self.guardians.is_guardian(&request.new_peer_id, guardian)?)
    }

    /// Bind the identities and hand the old identity's data to the new one.
    ///
    /// Every step tolerates being run again. Returns the other pending
    /// requests for the same old identity, which are cancelled here.
    async fn apply_completion(&self, request: &RecoveryRequest) -> Result<Vec<Uuid>, RecoveryError> {
        let (old, new) = (&request.old_peer_id, &request.new_peer_id);
        let now = Utc::now();

        let bindings = BindingRepository::new(&self.storage);
        match bindings.find(old)? {
            Some(binding) if binding.request_id == request.request_id => {}
            Some(_) => return Err(RecoveryError::AlreadyRecovered(old.clone())),
            None => bindings.create(&IdentityBinding {
                old_did: old.clone(),
                new_did: new.clone(),
                request_id: request.request_id,
                bound_at: request.completed_at.unwrap_or(now),
                attestation_cid: None,
            })?,
        }
        self.social.transfer(old, new).await?;
        self.guardians.transfer(old, new).await?;

        // The old identity's approvals elsewhere now belong to the new one,
        // so the same guardian cannot be counted twice.
        let mut superseded = Vec::new();
        for mut other in self.repo().list_pending()? {
            if other.request_id == request.request_id {
                continue;
            }
            if other.old_peer_id == *old {
                other.cancel(now)?;
                superseded.push(other.request_id);
            } else if other.approvals.remove(old) {
                other.approvals.insert(new.clone());
                other.updated_at = now;
            } else {
                continue;
            }
            self.repo().update(&other)?;
        }

        Ok(superseded)
    }

    /// Log, audit, notify and emit events for a persisted completion.
    fn announce_completion(
        &self,
        request: &RecoveryRequest,
        approvals_count: usize,
        superseded: &[Uuid],
    ) {
        let (old, new) = (&request.old_peer_id, &request.new_peer_id);

        info!(
            request_id = %request.request_id,
            old = %old,
            new = %new,
            approvals = approvals_count,
            "Recovery completed"
        );
        let event = AuditEvent::new(AuditEventType::RecoveryCompleted)
            .with_did(new.to_string())
            .with_resource("recovery_request", request.request_id.to_string())
            .with_details(serde_json::json!({
                "old_did": old,
                "approvals": request.approvals,
                "threshold": request.threshold,
            }));
        audit_log!(@write &self.storage, event);
        dispatch_notification(
            &self.storage,
            new,
            Notification::new(
                NotificationKind::RecoveryCompleted,
                "Recovery complete",
                format!("Your guardians approved the recovery of {old}"),
                Some(format!("/recovery/{}", request.request_id)),
            ),
        );
        self.emit(RecoveryEvent::Completed {
            request_id: request.request_id,
            old_peer_id: old.clone(),
            new_peer_id: new.clone(),
            approvals_count,
        });

        for &request_id in superseded {
            info!(request_id = %request_id, old = %old, "Recovery request superseded by a completed one");
            audit_log!(
                &self.storage,
                AuditEventType::RecoveryCancelled,
                new,
                "recovery_request",
                request_id
            );
            self.emit(RecoveryEvent::Cancelled { request_id });
        }
    }

    /// Publish the completion record. Failures are logged; the recovery
    /// itself stays completed.
    async fn publish_attestation(&self, mut request: RecoveryRequest) -> RecoveryRequest {
        let Some(attestation) = RecoveryAttestation::for_request(&request) else {
            return request;
        };
        let bytes = match serde_json::to_vec(&attestation) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(request_id = %request.request_id, error = %e, "Failed to encode attestation");
                return request;
            }
        };

        let cid = match self.content.put(bytes).await {
            Ok(cid) => cid,
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    backend = self.content.backend(),
                    error = %e,
                    "Failed to publish recovery attestation"
                );
                return request;
            }
        };

        let _guard = self.lock.lock().await;
        request.attestation_cid = Some(cid.clone());
        if let Err(e) = self.repo().update(&request) {
            warn!(request_id = %request.request_id, error = %e, "Failed to store attestation id");
        }
        let bindings = BindingRepository::new(&self.storage);
        match bindings.find(&request.old_peer_id) {
            Ok(Some(mut binding)) => {
                binding.attestation_cid = Some(cid.clone());
                if let Err(e) = bindings.update(&binding) {
                    warn!(request_id = %request.request_id, error = %e, "Failed to store attestation id on binding");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(request_id = %request.request_id, error = %e, "Failed to read binding"),
        }

        info!(request_id = %request.request_id, cid = %cid, "Recovery attestation published");
        request
    }

    /// Current state of a request. Expired-by-clock requests are expired here.
    pub async fn status(&self, request_id: &str) -> Result<RecoveryRequest, RecoveryError> {
        let request_id = parse_request_id(request_id)?;
        let _guard = self.lock.lock().await;
        let mut request = self.load(&request_id)?;
        self.expire_locked(&mut request)?;
        Ok(request)
    }

    /// Wait until the request changes or `wait` elapses (capped at
    /// [`MAX_STATUS_WAIT`]), then return its state.
    pub async fn wait_for_change(
        &self,
        request_id: &str,
        wait: Duration,
    ) -> Result<RecoveryRequest, RecoveryError> {
        let mut events = self.subscribe();
        let initial = self.status(request_id).await?;
        if wait.is_zero() || initial.status.is_terminal() {
            return Ok(initial);
        }

        let mut deadline = tokio::time::Instant::now() + wait.min(MAX_STATUS_WAIT);
        // Wake at expiry so the re-read below observes it.
        if let Some(expires_at) = initial.expires_at {
            let until_expiry = (expires_at - Utc::now()).to_std().unwrap_or_default();
            deadline = deadline.min(tokio::time::Instant::now() + until_expiry);
        }

        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) if event.request_id() == initial.request_id => break,
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Recovery status waiter lagged behind events");
                    break;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
            }
        }

        self.status(request_id).await
    }

    /// Cancel a pending request. Only the old or new identity may cancel.
    pub async fn cancel(
        &self,
        caller: &Did,
        request_id: &str,
    ) -> Result<RecoveryRequest, RecoveryError> {
        let request_id = parse_request_id(request_id)?;
        let _guard = self.lock.lock().await;

        let mut request = self.load(&request_id)?;
        if *caller != request.old_peer_id && *caller != request.new_peer_id {
            return Err(RecoveryError::Unauthorized(
                "only the identities involved can cancel a recovery",
            ));
        }
        self.expire_locked(&mut request)?;
        request.cancel(Utc::now())?;
        self.repo().update(&request)?;

        info!(request_id = %request_id, caller = %caller, "Recovery request cancelled");
        audit_log!(
            &self.storage,
            AuditEventType::RecoveryCancelled,
            caller,
            "recovery_request",
            request_id
        );
        self.emit(RecoveryEvent::Cancelled { request_id });

        Ok(request)
    }

    /// Expire every pending request whose TTL has passed.
    pub async fn expire_due(&self) -> Result<Vec<Uuid>, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut expired = Vec::new();
        for mut request in self.repo().list_pending()? {
            if self.expire_locked(&mut request)? {
                expired.push(request.request_id);
            }
        }
        Ok(expired)
    }

    /// Fetch the published completion record of a request.
    pub async fn attestation(
        &self,
        request_id: &str,
    ) -> Result<RecoveryAttestation, RecoveryError> {
        let request = self.status(request_id).await?;
        let Some(cid) = request.attestation_cid else {
            return Err(RecoveryError::NoAttestation(request.request_id));
        };

        let bytes = self.content.get(&cid).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RecoveryError::Storage(StorageError::Corrupted(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::MemoryContentStore;
    use crate::storage::NotificationRepository;
    use tempfile::TempDir;

    fn did(s: &str) -> Did {
        Did::parse(format!("did:key:z{s}")).unwrap()
    }

    struct Fixture {
        _temp: TempDir,
        storage: Arc<FileStorage>,
        guardians: Arc<GuardianRegistry>,
        social: Arc<SocialGraph>,
        coordinator: Arc<RecoveryCoordinator>,
    }

    fn setup_with(settings: RecoverySettings) -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::open(temp.path()).unwrap());
        let guardians = Arc::new(GuardianRegistry::new(storage.clone()));
        let social = Arc::new(SocialGraph::new(storage.clone()));
        let coordinator = Arc::new(RecoveryCoordinator::new(
            storage.clone(),
            guardians.clone(),
            social.clone(),
            Arc::new(MemoryContentStore::new()),
            settings,
        ));
        Fixture {
            _temp: temp,
            storage,
            guardians,
            social,
            coordinator,
        }
    }

    fn setup() -> Fixture {
        setup_with(RecoverySettings::default())
    }

    /// Make each name a contact and guardian of `owner`.
    async fn with_guardians(f: &Fixture, owner: &Did, names: &[&str]) -> Vec<Did> {
        let mut out = Vec::new();
        for name in names {
            let g = did(name);
            f.social.request_connection(owner, &g).await.unwrap();
            f.social.accept_connection(&g, owner).await.unwrap();
            f.guardians.add(owner, &g).await.unwrap();
            out.push(g);
        }
        out
    }

    #[tokio::test]
    async fn five_guardian_scenario() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A", "B", "C", "D", "E"]).await;

        let request = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap();
        let id = request.request_id.to_string();

        for (i, guardian) in g[..3].iter().enumerate() {
            let r = f.coordinator.approve(guardian, &id, guardian.as_str()).await.unwrap();
            assert_eq!(r.status, RecoveryStatus::Pending);
            assert_eq!(r.approvals_count(), i + 1);
        }

        let r = f.coordinator.approve(&g[3], &id, g[3].as_str()).await.unwrap();
        assert_eq!(r.status, RecoveryStatus::Completed);
        assert_eq!(r.approvals_count(), 4);
        assert!(r.attestation_cid.is_some());

        let err = f.coordinator.approve(&g[4], &id, g[4].as_str()).await.unwrap_err();
        assert!(matches!(
            err,
            RecoveryError::AlreadyTerminal(RecoveryStatus::Completed)
        ));
        assert_eq!(f.coordinator.status(&id).await.unwrap().approvals_count(), 4);

        // The new identity now holds the old identity's guardians and contacts.
        assert_eq!(f.guardians.list(&new).unwrap(), g);
        assert!(f.guardians.list(&old).unwrap().is_empty());
        assert_eq!(f.social.contacts(&new).unwrap().len(), 5);

        let binding = BindingRepository::new(&f.storage).find(&old).unwrap().unwrap();
        assert_eq!(binding.new_did, new);
        assert_eq!(binding.attestation_cid, r.attestation_cid);

        let attestation = f.coordinator.attestation(&id).await.unwrap();
        assert_eq!(attestation.old_did, old);
        assert_eq!(attestation.guardians.len(), 4);
    }

    #[tokio::test]
    async fn guardians_are_notified_on_initiate() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A"]).await;

        f.coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap();

        let inbox = NotificationRepository::new(&f.storage).list(&g[0], 50).unwrap();
        assert_eq!(inbox[0].kind, NotificationKind::RecoveryRequested);
    }

    #[tokio::test]
    async fn initiate_validates_inputs() {
        let f = setup();
        let new = did("New");

        assert!(matches!(
            f.coordinator.initiate(&new, "not-a-did", new.as_str()).await,
            Err(RecoveryError::InvalidPeerId(_))
        ));
        assert!(matches!(
            f.coordinator.initiate(&new, new.as_str(), new.as_str()).await,
            Err(RecoveryError::InvalidPeerId(_))
        ));
        assert!(matches!(
            f.coordinator
                .initiate(&did("Mallory"), "did:key:zOld", new.as_str())
                .await,
            Err(RecoveryError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn approve_checks() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A"]).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        let stranger = did("Stranger");
        assert!(matches!(
            f.coordinator.approve(&stranger, &id, stranger.as_str()).await,
            Err(RecoveryError::NotAGuardian(_))
        ));
        assert!(matches!(
            f.coordinator.approve(&stranger, &id, g[0].as_str()).await,
            Err(RecoveryError::Unauthorized(_))
        ));
        assert!(matches!(
            f.coordinator
                .approve(&g[0], &Uuid::new_v4().to_string(), g[0].as_str())
                .await,
            Err(RecoveryError::UnknownRequest(_))
        ));
        assert!(matches!(
            f.coordinator.approve(&g[0], "garbage", g[0].as_str()).await,
            Err(RecoveryError::UnknownRequest(_))
        ));

        f.coordinator.approve(&g[0], &id, g[0].as_str()).await.unwrap();
        assert!(matches!(
            f.coordinator.approve(&g[0], &id, g[0].as_str()).await,
            Err(RecoveryError::DuplicateApproval(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_complete_once() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let names = ["A", "B", "C", "D", "E", "F", "G"];
        let g = with_guardians(&f, &old, &names).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        let mut events = f.coordinator.subscribe();

        let handles: Vec<_> = g
            .iter()
            .cloned()
            .map(|guardian| {
                let coordinator = f.coordinator.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    coordinator
                        .approve(&guardian, &id, guardian.as_str())
                        .await
                })
            })
            .collect();

        let mut recorded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => recorded += 1,
                Err(RecoveryError::AlreadyTerminal(RecoveryStatus::Completed)) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(recorded, 4);
        assert_eq!(rejected, 3);

        let status = f.coordinator.status(&id).await.unwrap();
        assert_eq!(status.status, RecoveryStatus::Completed);
        assert_eq!(status.approvals_count(), 4);

        let mut approvals = 0;
        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                RecoveryEvent::Approved { .. } => approvals += 1,
                RecoveryEvent::Completed { .. } => completions += 1,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(approvals, 4);
        assert_eq!(completions, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_below_threshold_are_all_recorded() {
        let f = setup_with(RecoverySettings {
            threshold: 7,
            ttl: None,
        });
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A", "B", "C", "D", "E", "F"]).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        let handles: Vec<_> = g
            .iter()
            .cloned()
            .map(|guardian| {
                let coordinator = f.coordinator.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    coordinator
                        .approve(&guardian, &id, guardian.as_str())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let status = f.coordinator.status(&id).await.unwrap();
        assert_eq!(status.approvals_count(), 6);
        assert_eq!(status.status, RecoveryStatus::Pending);
    }

    #[tokio::test]
    async fn expired_request_rejects_approvals() {
        let f = setup_with(RecoverySettings {
            threshold: 4,
            ttl: Some(chrono::Duration::zero()),
        });
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A"]).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        assert!(matches!(
            f.coordinator.approve(&g[0], &id, g[0].as_str()).await,
            Err(RecoveryError::AlreadyTerminal(RecoveryStatus::Expired))
        ));
        assert_eq!(
            f.coordinator.status(&id).await.unwrap().status,
            RecoveryStatus::Expired
        );
        assert!(f.coordinator.expire_due().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_expires_due_requests() {
        let f = setup_with(RecoverySettings {
            threshold: 4,
            ttl: Some(chrono::Duration::zero()),
        });
        let (old, new) = (did("Old"), did("New"));
        let request = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap();

        assert_eq!(
            f.coordinator.expire_due().await.unwrap(),
            vec![request.request_id]
        );
    }

    #[tokio::test]
    async fn cancel_by_participants_only() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        assert!(matches!(
            f.coordinator.cancel(&did("Mallory"), &id).await,
            Err(RecoveryError::Unauthorized(_))
        ));
        let cancelled = f.coordinator.cancel(&old, &id).await.unwrap();
        assert_eq!(cancelled.status, RecoveryStatus::Cancelled);
        assert!(matches!(
            f.coordinator.cancel(&new, &id).await,
            Err(RecoveryError::AlreadyTerminal(RecoveryStatus::Cancelled))
        ));
        assert!(matches!(
            f.coordinator.attestation(&id).await,
            Err(RecoveryError::NoAttestation(_))
        ));
    }

    #[tokio::test]
    async fn recovered_identity_cannot_be_recovered_again() {
        let f = setup_with(RecoverySettings {
            threshold: 1,
            ttl: None,
        });
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A"]).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();
        f.coordinator.approve(&g[0], &id, g[0].as_str()).await.unwrap();

        let other = did("Other");
        assert!(matches!(
            f.coordinator.initiate(&other, old.as_str(), other.as_str()).await,
            Err(RecoveryError::AlreadyRecovered(_))
        ));
    }

    #[tokio::test]
    async fn new_identity_cannot_approve_itself() {
        let f = setup();
        let old = did("Old");
        let g = with_guardians(&f, &old, &["A", "B", "C", "D", "Mal"]).await;
        let mal = &g[4];

        let id = f
            .coordinator
            .initiate(mal, old.as_str(), mal.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        assert!(matches!(
            f.coordinator.approve(mal, &id, mal.as_str()).await,
            Err(RecoveryError::Unauthorized(_))
        ));
        assert_eq!(f.coordinator.status(&id).await.unwrap().approvals_count(), 0);
    }

    #[tokio::test]
    async fn recovered_guardian_is_not_counted_twice() {
        let f = setup_with(RecoverySettings {
            threshold: 2,
            ttl: None,
        });
        let (old, new) = (did("Old"), did("New"));
        let (a, a2) = (did("A"), did("A2"));
        with_guardians(&f, &old, &["A", "B", "C"]).await;
        with_guardians(&f, &a, &["B", "C"]).await;

        let first = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();
        f.coordinator.approve(&a, &first, a.as_str()).await.unwrap();

        // A loses their key and recovers to A2.
        let own = f
            .coordinator
            .initiate(&a2, a.as_str(), a2.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();
        for name in ["B", "C"] {
            let g = did(name);
            f.coordinator.approve(&g, &own, g.as_str()).await.unwrap();
        }
        assert!(f.guardians.is_guardian(&old, &a2).unwrap());

        let carried = f.coordinator.status(&first).await.unwrap();
        assert_eq!(carried.approvals.iter().collect::<Vec<_>>(), vec![&a2]);

        assert!(matches!(
            f.coordinator.approve(&a2, &first, a2.as_str()).await,
            Err(RecoveryError::DuplicateApproval(_))
        ));
        let status = f.coordinator.status(&first).await.unwrap();
        assert_eq!(status.status, RecoveryStatus::Pending);
        assert_eq!(status.approvals_count(), 1);
    }

    #[tokio::test]
    async fn failed_completion_stays_pending_and_can_be_retried() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A", "B", "C", "D"]).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();
        for guardian in &g[..3] {
            f.coordinator.approve(guardian, &id, guardian.as_str()).await.unwrap();
        }

        // An unreadable guardian set makes the guardian transfer fail midway.
        let broken = f.storage.paths().guardian_set("did:key:zBroken");
        std::fs::write(&broken, b"not json").unwrap();
        let mut events = f.coordinator.subscribe();

        assert!(matches!(
            f.coordinator.approve(&g[3], &id, g[3].as_str()).await,
            Err(RecoveryError::Guardian(_))
        ));
        let stuck = f.coordinator.status(&id).await.unwrap();
        assert_eq!(stuck.status, RecoveryStatus::Pending);
        assert_eq!(stuck.approvals_count(), 3);
        assert!(events.try_recv().is_err());

        std::fs::remove_file(&broken).unwrap();
        let done = f.coordinator.approve(&g[3], &id, g[3].as_str()).await.unwrap();
        assert_eq!(done.status, RecoveryStatus::Completed);
        assert_eq!(done.approvals_count(), 4);

        assert_eq!(f.guardians.list(&new).unwrap(), g);
        assert!(f.guardians.list(&old).unwrap().is_empty());
        assert_eq!(f.social.contacts(&new).unwrap().len(), 4);
        assert_eq!(
            BindingRepository::new(&f.storage)
                .find(&old)
                .unwrap()
                .unwrap()
                .request_id
                .to_string(),
            id
        );

        let mut completions = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RecoveryEvent::Completed { .. }) {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn completion_cancels_competing_requests() {
        let f = setup_with(RecoverySettings {
            threshold: 1,
            ttl: None,
        });
        let (old, new, rival) = (did("Old"), did("New"), did("Rival"));
        let g = with_guardians(&f, &old, &["A"]).await;

        let winner = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();
        let loser = f
            .coordinator
            .initiate(&rival, old.as_str(), rival.as_str())
            .await
            .unwrap()
            .request_id;

        let mut events = f.coordinator.subscribe();
        f.coordinator.approve(&g[0], &winner, g[0].as_str()).await.unwrap();

        let loser_id = loser.to_string();
        assert_eq!(
            f.coordinator.status(&loser_id).await.unwrap().status,
            RecoveryStatus::Cancelled
        );
        assert!(matches!(
            f.coordinator.approve(&g[0], &loser_id, g[0].as_str()).await,
            Err(RecoveryError::AlreadyTerminal(RecoveryStatus::Cancelled))
        ));

        let mut cancelled = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let RecoveryEvent::Cancelled { request_id } = event {
                cancelled.push(request_id);
            }
        }
        assert_eq!(cancelled, vec![loser]);
    }

    #[tokio::test]
    async fn long_poll_returns_on_change() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let g = with_guardians(&f, &old, &["A"]).await;
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        let waiter = {
            let coordinator = f.coordinator.clone();
            let id = id.clone();
            tokio::spawn(async move {
                coordinator
                    .wait_for_change(&id, Duration::from_secs(30))
                    .await
            })
        };

        // Let the waiter subscribe before approving.
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.coordinator.approve(&g[0], &id, g[0].as_str()).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should return after the approval")
            .unwrap()
            .unwrap();
        assert_eq!(seen.approvals_count(), 1);
    }

    #[tokio::test]
    async fn long_poll_times_out_unchanged() {
        let f = setup();
        let (old, new) = (did("Old"), did("New"));
        let id = f
            .coordinator
            .initiate(&new, old.as_str(), new.as_str())
            .await
            .unwrap()
            .request_id
            .to_string();

        let seen = f
            .coordinator
            .wait_for_change(&id, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(seen.status, RecoveryStatus::Pending);
        assert_eq!(seen.approvals_count(), 0);
    }
}

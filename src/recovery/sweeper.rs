// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Recovery Expiry Sweeper
//!
//! Background task that moves pending recovery requests past their TTL to
//! `Expired`. Requests are also expired lazily whenever they are read, so
//! the sweeper only matters for requests nobody looks at; it makes sure
//! their `Expired` events and audit entries are still produced.
//!
//! Stops when its `CancellationToken` is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::RecoveryCoordinator;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct RecoveryExpirySweeper {
    coordinator: Arc<RecoveryCoordinator>,
    interval: Duration,
}

impl RecoveryExpirySweeper {
    pub fn new(coordinator: Arc<RecoveryCoordinator>) -> Self {
        Self {
            coordinator,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Recovery expiry sweeper starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Recovery expiry sweeper shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Recovery expiry sweeper shutting down");
                    return;
                }
            }
        }
    }

    async fn sweep(&self) {
        match self.coordinator.expire_due().await {
            Ok(expired) if expired.is_empty() => {}
            Ok(expired) => info!(count = expired.len(), "Expired stale recovery requests"),
            Err(e) => warn!(error = %e, "Recovery expiry sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::MemoryContentStore;
    use crate::guardians::GuardianRegistry;
    use crate::identity::Did;
    use crate::recovery::{RecoveryEvent, RecoverySettings};
    use crate::social::SocialGraph;
    use crate::storage::FileStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn sweeper_expires_and_stops() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FileStorage::open(temp.path()).unwrap());
        let coordinator = Arc::new(RecoveryCoordinator::new(
            storage.clone(),
            Arc::new(GuardianRegistry::new(storage.clone())),
            Arc::new(SocialGraph::new(storage)),
            Arc::new(MemoryContentStore::new()),
            RecoverySettings {
                threshold: 4,
                ttl: Some(chrono::Duration::zero()),
            },
        ));

        let new = Did::parse("did:key:zNew").unwrap();
        let request = coordinator
            .initiate(&new, "did:key:zOld", new.as_str())
            .await
            .unwrap();
        let mut events = coordinator.subscribe();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            RecoveryExpirySweeper::new(coordinator.clone())
                .with_interval(Duration::from_millis(10))
                .run(shutdown.clone()),
        );

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RecoveryEvent::Expired {
                request_id: request.request_id
            }
        );

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}

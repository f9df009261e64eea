// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::info;

use crate::auth::{ReplayGuard, DEFAULT_REPLAY_CAPACITY};
use crate::config::NodeConfig;
use crate::content_store::{ContentStore, ContentStoreError, IpfsRpcStore, MemoryContentStore};
use crate::guardians::GuardianRegistry;
use crate::recovery::{RecoveryCoordinator, RecoverySettings};
use crate::social::SocialGraph;
use crate::storage::{FileStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("content store: {0}")]
    ContentStore(#[from] ContentStoreError),
}

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub storage: Arc<FileStorage>,
    pub guardians: Arc<GuardianRegistry>,
    pub social: Arc<SocialGraph>,
    pub recovery: Arc<RecoveryCoordinator>,
    pub content: Arc<dyn ContentStore>,
    /// Present when `REPLAY_GUARD=true`.
    pub replay: Option<Arc<ReplayGuard>>,
}

impl AppState {
    /// Wire the services over an already opened storage.
    pub fn new(config: NodeConfig, storage: FileStorage, content: Arc<dyn ContentStore>) -> Self {
        let storage = Arc::new(storage);
        let guardians = Arc::new(GuardianRegistry::new(storage.clone()));
        let social = Arc::new(SocialGraph::new(storage.clone()));
        let recovery = Arc::new(RecoveryCoordinator::new(
            storage.clone(),
            guardians.clone(),
            social.clone(),
            content.clone(),
            RecoverySettings {
                threshold: config.recovery_threshold,
                ttl: config.recovery_ttl_chrono(),
            },
        ));
        let replay = config.replay_guard.then(|| {
            Arc::new(ReplayGuard::new(
                DEFAULT_REPLAY_CAPACITY,
                config.signature_window_ms,
            ))
        });

        Self {
            config: Arc::new(config),
            storage,
            guardians,
            social,
            recovery,
            content,
            replay,
        }
    }

    /// Open storage and the content store described by `config`.
    pub fn from_config(config: NodeConfig) -> Result<Self, StateError> {
        let storage = FileStorage::open(&config.data_dir)?;
        let content: Arc<dyn ContentStore> = match &config.ipfs_api_url {
            Some(url) => {
                info!(url = %url, "Publishing attestations to IPFS");
                Arc::new(IpfsRpcStore::new(url.clone())?)
            }
            None => {
                info!("IPFS_API_URL not set, keeping attestations in memory");
                Arc::new(MemoryContentStore::new())
            }
        };
        Ok(Self::new(config, storage, content))
    }
}

/// State over a fresh temporary data directory.
#[cfg(test)]
pub(crate) fn test_state() -> (AppState, tempfile::TempDir) {
    let temp = tempfile::TempDir::new().unwrap();
    let config = NodeConfig {
        data_dir: temp.path().to_path_buf(),
        ..NodeConfig::default()
    };
    let state = AppState::from_config(config).unwrap();
    (state, temp)
}

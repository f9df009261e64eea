// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Content-addressed blob storage.
//!
//! The node only needs `put` and `get`. Pinning, retrieval strategy and
//! replication belong to the backing network. Two implementations:
//!
//! - [`IpfsRpcStore`] talks to a local IPFS (Kubo) RPC API.
//! - [`MemoryContentStore`] keeps blobs in process, addressed by SHA-256.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Request timeout for the IPFS RPC API.
const IPFS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ContentStoreError {
    #[error("content {0} not found")]
    NotFound(String),

    #[error("content store unreachable: {0}")]
    Unavailable(String),

    #[error("content store returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ContentStoreError {
    fn from(e: reqwest::Error) -> Self {
        ContentStoreError::Unavailable(e.to_string())
    }
}

/// Storage interface for content-addressed blobs.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` and return their content id.
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ContentStoreError>;

    /// Fetch the bytes stored under `content_id`.
    async fn get(&self, content_id: &str) -> Result<Vec<u8>, ContentStoreError>;

    /// Short name for logs and health output.
    fn backend(&self) -> &'static str;
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local store. Content ids are `sha256-<hex>`.
#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_id(bytes: &[u8]) -> String {
        format!("sha256-{}", hex::encode(Sha256::digest(bytes)))
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ContentStoreError> {
        let id = Self::content_id(&bytes);
        self.blobs.write().await.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, content_id: &str) -> Result<Vec<u8>, ContentStoreError> {
        self.blobs
            .read()
            .await
            .get(content_id)
            .cloned()
            .ok_or_else(|| ContentStoreError::NotFound(content_id.to_string()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// IPFS RPC
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

/// Client for the IPFS RPC API (`/api/v0/add`, `/api/v0/cat`).
pub struct IpfsRpcStore {
    base_url: Url,
    client: reqwest::Client,
}

impl IpfsRpcStore {
    /// `base_url` is the RPC root, e.g. `http://127.0.0.1:5001`.
    pub fn new(base_url: Url) -> Result<Self, ContentStoreError> {
        let client = reqwest::Client::builder()
            .timeout(IPFS_TIMEOUT)
            .build()?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ContentStoreError> {
        self.base_url
            .join(path)
            .map_err(|e| ContentStoreError::Unavailable(format!("invalid IPFS URL: {e}")))
    }
}

#[async_trait]
impl ContentStore for IpfsRpcStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, ContentStoreError> {
        let mut url = self.endpoint("api/v0/add")?;
        url.query_pairs_mut().append_pair("cid-version", "1");

        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name("blob"));

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| ContentStoreError::InvalidResponse(e.to_string()))?;

        debug!(cid = %added.hash, "Stored blob in IPFS");
        Ok(added.hash)
    }

    async fn get(&self, content_id: &str) -> Result<Vec<u8>, ContentStoreError> {
        let mut url = self.endpoint("api/v0/cat")?;
        url.query_pairs_mut().append_pair("arg", content_id);

        let response = self.client.post(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return if status.is_server_error() && body.contains("not found") {
                Err(ContentStoreError::NotFound(content_id.to_string()))
            } else {
                Err(ContentStoreError::Unavailable(format!("HTTP {status}: {body}")))
            };
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn backend(&self) -> &'static str {
        "ipfs"
    }
}

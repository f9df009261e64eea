// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery request persistence. One file per request under `recovery/`.

use uuid::Uuid;

use super::super::{FileStorage, StorageError, StorageResult};
use crate::recovery::{RecoveryRequest, RecoveryStatus};

pub struct RecoveryRepository<'a> {
    storage: &'a FileStorage,
}

impl<'a> RecoveryRepository<'a> {
    pub fn new(storage: &'a FileStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, request_id: &Uuid) -> bool {
        self.storage
            .exists(self.storage.paths().recovery_request(&request_id.to_string()))
    }

    pub fn get(&self, request_id: &Uuid) -> StorageResult<RecoveryRequest> {
        self.storage
            .read_json_opt(self.storage.paths().recovery_request(&request_id.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("Recovery request {request_id}")))
    }

    pub fn create(&self, request: &RecoveryRequest) -> StorageResult<()> {
        if self.exists(&request.request_id) {
            return Err(StorageError::AlreadyExists(format!(
                "Recovery request {}",
                request.request_id
            )));
        }
        self.write(request)
    }

    pub fn update(&self, request: &RecoveryRequest) -> StorageResult<()> {
        if !self.exists(&request.request_id) {
            return Err(StorageError::NotFound(format!(
                "Recovery request {}",
                request.request_id
            )));
        }
        self.write(request)
    }

    fn write(&self, request: &RecoveryRequest) -> StorageResult<()> {
        self.storage.write_json(
            self.storage
                .paths()
                .recovery_request(&request.request_id.to_string()),
            request,
        )
    }

    /// All stored requests. Unreadable files are skipped with a warning.
    pub fn list_all(&self) -> StorageResult<Vec<RecoveryRequest>> {
        let ids = self
            .storage
            .list_files(self.storage.paths().recovery_dir(), "json")?;

        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(request_id) = Uuid::parse_str(&id) else {
                continue;
            };
            match self.get(&request_id) {
                Ok(request) => requests.push(request),
                Err(e) => tracing::warn!(request_id = %id, error = %e, "Skipping unreadable recovery request"),
            }
        }
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    /// Requests still awaiting approvals.
    pub fn list_pending(&self) -> StorageResult<Vec<RecoveryRequest>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| r.status == RecoveryStatus::Pending)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Did;
    use chrono::Utc;
    use tempfile::TempDir;

    fn request() -> RecoveryRequest {
        RecoveryRequest::initiate(
            Did::parse("did:key:zOld").unwrap(),
            Did::parse("did:key:zNew").unwrap(),
            4,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_get_update_list() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let repo = RecoveryRepository::new(&storage);

        let mut req = request();
        repo.create(&req).unwrap();
        assert!(matches!(repo.create(&req), Err(StorageError::AlreadyExists(_))));
        assert_eq!(repo.get(&req.request_id).unwrap(), req);

        req.cancel(Utc::now()).unwrap();
        repo.update(&req).unwrap();

        assert_eq!(repo.list_all().unwrap().len(), 1);
        assert!(repo.list_pending().unwrap().is_empty());
    }

    #[test]
    fn unknown_request_is_not_found() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let repo = RecoveryRepository::new(&storage);

        assert!(matches!(
            repo.get(&Uuid::new_v4()),
            Err(StorageError::NotFound(_))
        ));
    }
}

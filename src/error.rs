// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP error responses.
//!
//! Every domain error converts into an [`ApiError`], which renders as
//! `{ "kind": "...", "detail": "..." }` with the matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::content_store::ContentStoreError;
use crate::guardians::GuardianError;
use crate::identity::IdentityError;
use crate::recovery::{RecoveryError, ShardError};
use crate::social::SocialError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    CapacityError,
    AuthenticationError,
    AuthorizationError,
    ConflictError,
    NotFoundError,
    UnavailableError,
    InternalError,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::ValidationError | ErrorKind::CapacityError => StatusCode::BAD_REQUEST,
            ErrorKind::AuthenticationError => StatusCode::UNAUTHORIZED,
            ErrorKind::AuthorizationError => StatusCode::FORBIDDEN,
            ErrorKind::ConflictError => StatusCode::CONFLICT,
            ErrorKind::NotFoundError => StatusCode::NOT_FOUND,
            ErrorKind::UnavailableError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: kind.status(),
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationError, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConflictError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFoundError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, kind = ?self.kind, detail = %self.message, "Request failed");
        }
        let body = Json(ErrorBody {
            kind: self.kind,
            detail: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => ApiError::not_found(e.to_string()),
            StorageError::AlreadyExists(_) => ApiError::conflict(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidFormat(_)
            | IdentityError::InvalidDid { .. }
            | IdentityError::KeyMismatch(_) => ApiError::validation(e.to_string()),
            IdentityError::GenerationError(_) | IdentityError::Io(_) => {
                ApiError::internal(e.to_string())
            }
        }
    }
}

impl From<GuardianError> for ApiError {
    fn from(e: GuardianError) -> Self {
        match e {
            GuardianError::CapacityExceeded => ApiError::new(ErrorKind::CapacityError, e.to_string()),
            GuardianError::NotAContact(_) => ApiError::forbidden(e.to_string()),
            GuardianError::SelfNomination => ApiError::validation(e.to_string()),
            GuardianError::Storage(e) => e.into(),
        }
    }
}

impl From<SocialError> for ApiError {
    fn from(e: SocialError) -> Self {
        match e {
            SocialError::SelfRelationship => ApiError::validation(e.to_string()),
            SocialError::NoPendingRequest(_) => ApiError::not_found(e.to_string()),
            SocialError::Storage(e) => e.into(),
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::InvalidPeerId(_) | RecoveryError::InvalidThreshold(_) => {
                ApiError::validation(e.to_string())
            }
            RecoveryError::UnknownRequest(_) | RecoveryError::NoAttestation(_) => {
                ApiError::not_found(e.to_string())
            }
            RecoveryError::NotAGuardian(_) | RecoveryError::Unauthorized(_) => {
                ApiError::forbidden(e.to_string())
            }
            RecoveryError::DuplicateApproval(_)
            | RecoveryError::AlreadyTerminal(_)
            | RecoveryError::AlreadyRecovered(_) => ApiError::conflict(e.to_string()),
            RecoveryError::Guardian(e) => e.into(),
            RecoveryError::Social(e) => e.into(),
            RecoveryError::Storage(e) => e.into(),
            RecoveryError::ContentStore(e) => e.into(),
        }
    }
}

impl From<ShardError> for ApiError {
    fn from(e: ShardError) -> Self {
        match e {
            ShardError::Identity(e) => e.into(),
            ShardError::InvalidParameters { .. }
            | ShardError::UnsupportedSecret
            | ShardError::MalformedShard { .. }
            | ShardError::MixedThresholds
            | ShardError::InsufficientShards { .. }
            | ShardError::Combine(_) => ApiError::validation(e.to_string()),
        }
    }
}

impl From<ContentStoreError> for ApiError {
    fn from(e: ContentStoreError) -> Self {
        match e {
            ContentStoreError::NotFound(_) => ApiError::not_found(e.to_string()),
            ContentStoreError::Unavailable(_) | ContentStoreError::InvalidResponse(_) => {
                ApiError::new(ErrorKind::UnavailableError, e.to_string())
            }
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Variants are listed in the order the verifier checks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No X-DID header present
    MissingDid,
    /// X-DID is not a well-formed DID
    InvalidDid(String),
    /// The DID was replaced by a completed recovery
    IdentitySuperseded { successor: String },
    /// Only one of X-Signature / X-Timestamp present
    IncompleteSignature,
    /// Unsigned request while signatures are mandatory
    SignatureRequired,
    /// X-Timestamp is not an integer number of milliseconds
    InvalidTimestamp,
    /// X-Timestamp is outside the freshness window
    StaleTimestamp,
    /// The DID has no secret in the local keystore
    UnknownIdentity,
    /// HMAC mismatch
    InvalidSignature,
    /// Signature already seen inside the window
    ReplayDetected,
    /// Operation requires a signed request
    SignedRequestRequired,
    /// Keystore could not be read
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    kind: &'static str,
    detail: String,
    error_code: &'static str,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingDid => "missing_did",
            AuthError::InvalidDid(_) => "invalid_did",
            AuthError::IdentitySuperseded { .. } => "identity_superseded",
            AuthError::IncompleteSignature => "incomplete_signature",
            AuthError::SignatureRequired => "signature_required",
            AuthError::InvalidTimestamp => "invalid_timestamp",
            AuthError::StaleTimestamp => "stale_timestamp",
            AuthError::UnknownIdentity => "unknown_identity",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::ReplayDetected => "replay_detected",
            AuthError::SignedRequestRequired => "signed_request_required",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidDid(_) => StatusCode::BAD_REQUEST,
            AuthError::SignedRequestRequired => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn kind(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "validation_error",
            StatusCode::FORBIDDEN => "authorization_error",
            StatusCode::INTERNAL_SERVER_ERROR => "internal_error",
            _ => "authentication_error",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingDid => write!(f, "X-DID header is required"),
            AuthError::InvalidDid(reason) => write!(f, "X-DID is not a valid DID: {reason}"),
            AuthError::IdentitySuperseded { successor } => {
                write!(f, "Identity was recovered and superseded by {successor}")
            }
            AuthError::IncompleteSignature => {
                write!(f, "X-Signature and X-Timestamp must be sent together")
            }
            AuthError::SignatureRequired => write!(f, "This node requires signed requests"),
            AuthError::InvalidTimestamp => write!(f, "X-Timestamp must be unix milliseconds"),
            AuthError::StaleTimestamp => write!(f, "X-Timestamp is outside the accepted window"),
            AuthError::UnknownIdentity => write!(f, "DID is not held by this node"),
            AuthError::InvalidSignature => write!(f, "Request signature is invalid"),
            AuthError::ReplayDetected => write!(f, "Request signature was already used"),
            AuthError::SignedRequestRequired => {
                write!(f, "This operation requires a signed request")
            }
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            kind: self.kind(),
            detail: self.to_string(),
            error_code: self.error_code(),
        });
        (status, body).into_response()
    }
}

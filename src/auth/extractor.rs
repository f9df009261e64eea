// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! ```rust,ignore
//! async fn whoami(caller: Caller) -> Json<WhoAmI> { ... }
//! async fn erase(SignedCaller(caller): SignedCaller) -> StatusCode { ... }
//! ```
//!
//! `Caller` accepts DID-only requests (unless the node requires signatures);
//! `SignedCaller` always requires a verified signature.

use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::{request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

use super::signing::{self, DID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use super::AuthError;
use crate::identity::Did;
use crate::state::AppState;
use crate::storage::{
    AccountRepository, AuditEvent, AuditEventType, BindingRepository, StorageError,
};

/// How much the node trusts a caller's claimed DID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CallerTrust {
    /// Signature verified against the keystore.
    Signed,
    /// `X-DID` only; the claim is unverified.
    DidOnly,
}

/// The identity a request is made under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub did: Did,
    pub trust: CallerTrust,
}

impl Caller {
    pub fn is_signed(&self) -> bool {
        self.trust == CallerTrust::Signed
    }
}

/// A caller whose signature was verified.
#[derive(Debug, Clone)]
pub struct SignedCaller(pub Caller);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Request path without query, as seen by the client (before nesting).
fn request_path(parts: &Parts) -> String {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(&parts.uri);
    uri.path().to_string()
}

/// Verify the authentication headers of a request.
pub fn verify_request(
    state: &AppState,
    method: &str,
    path: &str,
    headers: &HeaderMap,
    now_ms: i64,
) -> Result<Caller, AuthError> {
    let raw_did = header(headers, DID_HEADER).ok_or(AuthError::MissingDid)?;
    let did = Did::parse(raw_did).map_err(|e| AuthError::InvalidDid(e.to_string()))?;

    if let Some(binding) = BindingRepository::new(&state.storage)
        .find(&did)
        .map_err(|e| AuthError::InternalError(e.to_string()))?
    {
        return Err(AuthError::IdentitySuperseded {
            successor: binding.new_did.to_string(),
        });
    }

    let (signature, timestamp) = match (
        header(headers, SIGNATURE_HEADER),
        header(headers, TIMESTAMP_HEADER),
    ) {
        (Some(signature), Some(timestamp)) => (signature, timestamp),
        (None, None) if state.config.require_signatures => {
            return Err(AuthError::SignatureRequired)
        }
        (None, None) => {
            return Ok(Caller {
                did,
                trust: CallerTrust::DidOnly,
            })
        }
        _ => return Err(AuthError::IncompleteSignature),
    };

    let timestamp_ms: i64 = timestamp.parse().map_err(|_| AuthError::InvalidTimestamp)?;
    if !signing::is_fresh(timestamp_ms, now_ms, state.config.signature_window_ms) {
        return Err(AuthError::StaleTimestamp);
    }

    let account = match AccountRepository::new(&state.storage).get(&did) {
        Ok(account) => account,
        Err(StorageError::NotFound(_)) => return Err(AuthError::UnknownIdentity),
        Err(e) => return Err(AuthError::InternalError(e.to_string())),
    };

    if !signing::verify(&account.secret, method, path, timestamp, signature) {
        return Err(AuthError::InvalidSignature);
    }

    if let Some(replay) = &state.replay {
        if !replay.check_and_record(signature, timestamp_ms, now_ms) {
            return Err(AuthError::ReplayDetected);
        }
    }

    Ok(Caller {
        did,
        trust: CallerTrust::Signed,
    })
}

fn authenticate(parts: &Parts, state: &AppState) -> Result<Caller, AuthError> {
    let path = request_path(parts);
    let result = verify_request(
        state,
        parts.method.as_str(),
        &path,
        &parts.headers,
        signing::now_millis(),
    );

    if let Err(e) = &result {
        warn!(
            method = %parts.method,
            path = %path,
            error_code = e.error_code(),
            "Request authentication failed"
        );
        let mut event = AuditEvent::new(AuditEventType::AuthFailure)
            .with_resource("path", path)
            .failed(e.to_string());
        if let Some(did) = header(&parts.headers, DID_HEADER) {
            event = event.with_did(did);
        }
        crate::audit_log!(@write &state.storage, event);
    }

    result
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>().cloned() {
            return Ok(caller);
        }
        let caller = authenticate(parts, state)?;
        parts.extensions.insert(caller.clone());
        Ok(caller)
    }
}

impl FromRequestParts<AppState> for SignedCaller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if !caller.is_signed() {
            return Err(AuthError::SignedRequestRequired);
        }
        Ok(SignedCaller(caller))
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoints: keystore management and identity lookups.
//!
//! The node runs on the owner's device, so generated identity files
//! (including the secret) are returned to the local client only.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::parse_peer;
use crate::{
    audit_log,
    auth::{Caller, SignedCaller},
    error::{ApiError, ErrorBody},
    identity::{Identity, IdentityFile},
    models::{ImportedIdentityResponse, SuccessorResponse, WhoAmIResponse},
    state::AppState,
    storage::{
        AccountOrigin, AccountRepository, AuditEventType, BindingRepository, StorageError,
        StoredAccount,
    },
};

#[utoipa::path(
    post,
    path = "/api/auth/generate-identity",
    tag = "Identity",
    responses(
        (status = 201, description = "New identity stored in the local keystore", body = IdentityFile),
        (status = 500, body = ErrorBody)
    )
)]
pub async fn generate_identity(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<IdentityFile>), ApiError> {
    let identity = Identity::generate()?;
    AccountRepository::new(&state.storage)
        .create(&StoredAccount::new(&identity, AccountOrigin::Generated))?;

    info!(did = %identity.did(), "Identity generated");
    audit_log!(&state.storage, AuditEventType::IdentityGenerated, identity.did());

    Ok((StatusCode::CREATED, Json(identity.export())))
}

/// Import an identity file (`{ "did", "secret" }` as JSON).
#[utoipa::path(
    post,
    path = "/api/auth/import-identity",
    request_body(content = IdentityFile, content_type = "application/json"),
    tag = "Identity",
    responses(
        (status = 200, description = "Identity already held with the same secret", body = ImportedIdentityResponse),
        (status = 201, description = "Identity imported", body = ImportedIdentityResponse),
        (status = 400, description = "Malformed identity file", body = ErrorBody),
        (status = 409, description = "DID held with a different secret", body = ErrorBody)
    )
)]
pub async fn import_identity(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ImportedIdentityResponse>), ApiError> {
    let identity = Identity::import(&body)?;
    let accounts = AccountRepository::new(&state.storage);

    if let Some(existing) = accounts.find(identity.did())? {
        if existing.secret == *identity.secret() {
            return Ok((
                StatusCode::OK,
                Json(ImportedIdentityResponse {
                    did: existing.did,
                    origin: existing.origin,
                }),
            ));
        }
        return Err(ApiError::conflict(format!(
            "{} is already held with a different secret",
            identity.did()
        )));
    }

    accounts.create(&StoredAccount::new(&identity, AccountOrigin::Imported))?;
    info!(did = %identity.did(), "Identity imported");
    audit_log!(&state.storage, AuditEventType::IdentityImported, identity.did());

    Ok((
        StatusCode::CREATED,
        Json(ImportedIdentityResponse {
            did: identity.did().clone(),
            origin: AccountOrigin::Imported,
        }),
    ))
}

/// Erase the caller's secret from this node (logout). Nothing is revoked.
#[utoipa::path(
    delete,
    path = "/api/auth/identity",
    tag = "Identity",
    responses(
        (status = 204, description = "Secret erased"),
        (status = 403, description = "Unsigned request", body = ErrorBody)
    )
)]
pub async fn erase_identity(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
) -> Result<StatusCode, ApiError> {
    AccountRepository::new(&state.storage).delete(&caller.did)?;
    info!(did = %caller.did, "Identity erased from keystore");
    audit_log!(&state.storage, AuditEventType::IdentityErased, caller.did);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/auth/whoami",
    tag = "Identity",
    responses(
        (status = 200, body = WhoAmIResponse),
        (status = 401, body = ErrorBody)
    )
)]
pub async fn whoami(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<WhoAmIResponse>, ApiError> {
    let local = AccountRepository::new(&state.storage).exists(&caller.did);
    Ok(Json(WhoAmIResponse {
        did: caller.did,
        trust: caller.trust,
        local,
    }))
}

/// Where a recovered identity now lives.
#[utoipa::path(
    get,
    path = "/api/identity/{did}/successor",
    params(("did" = String, Path, description = "DID that may have been recovered")),
    tag = "Identity",
    responses(
        (status = 200, body = SuccessorResponse),
        (status = 404, description = "DID was never recovered", body = ErrorBody)
    )
)]
pub async fn successor(
    State(state): State<AppState>,
    Path(did): Path<String>,
) -> Result<Json<SuccessorResponse>, ApiError> {
    let did = parse_peer(&did)?;
    let bindings = BindingRepository::new(&state.storage);
    let binding = bindings
        .find(&did)?
        .ok_or_else(|| ApiError::from(StorageError::NotFound(format!("{did} was not recovered"))))?;
    let current_did = bindings.resolve_current(&did)?;

    Ok(Json(SuccessorResponse {
        binding,
        current_did,
    }))
}

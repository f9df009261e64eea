// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recovery endpoints.
//!
//! The new identity opens a request, guardians of the old identity approve
//! it, and anyone involved can follow its status, optionally long-polling
//! with `?wait_secs=N`.
//!
//! Separately, `setup` hands an owner shards of their own seed and `restore`
//! rebuilds the identity from enough of them.

use std::time::Duration;

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Form, Json,
};
use tracing::info;

use super::{form, parse_peer};
use crate::{
    audit_log,
    auth::{Caller, SignedCaller},
    error::{ApiError, ErrorBody},
    models::{
        ApprovalResponse, ApproveForm, RecoveryCreatedResponse, RecoveryRequestForm,
        RecoveryStatusResponse, RestoreRequest, RestoredIdentityResponse, ShardSetupForm,
        ShardSetupResponse, StatusQuery,
    },
    recovery::{
        shards, RecoveryAttestation, DEFAULT_SHARD_COUNT, DEFAULT_SHARD_THRESHOLD,
        MAX_STATUS_WAIT,
    },
    state::AppState,
    storage::{
        AccountOrigin, AccountRepository, AuditEvent, AuditEventType, BindingRepository,
        StoredAccount,
    },
};

/// Open a recovery of `old_peer_id`. The caller must sign as `new_peer_id`.
#[utoipa::path(
    post,
    path = "/api/recovery/request",
    request_body(content = RecoveryRequestForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Recovery",
    responses(
        (status = 201, body = RecoveryCreatedResponse),
        (status = 400, description = "Malformed or identical peer ids", body = ErrorBody),
        (status = 403, description = "Caller is not the new identity", body = ErrorBody),
        (status = 409, description = "Old identity was already recovered", body = ErrorBody)
    )
)]
pub async fn request_recovery(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    body: Result<Form<RecoveryRequestForm>, FormRejection>,
) -> Result<(StatusCode, Json<RecoveryCreatedResponse>), ApiError> {
    let body = form(body)?;
    let request = state
        .recovery
        .initiate(&caller.did, &body.old_peer_id, &body.new_peer_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RecoveryCreatedResponse {
            request_id: request.request_id,
            status: request.status,
            threshold: request.threshold,
            expires_at: request.expires_at,
        }),
    ))
}

/// Record the caller's approval as guardian of the old identity.
#[utoipa::path(
    post,
    path = "/api/recovery/approve",
    request_body(content = ApproveForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Recovery",
    responses(
        (status = 200, body = ApprovalResponse),
        (status = 403, description = "Not a guardian, or approving for someone else", body = ErrorBody),
        (status = 404, description = "Unknown request", body = ErrorBody),
        (status = 409, description = "Duplicate approval or request already terminal", body = ErrorBody)
    )
)]
pub async fn approve_recovery(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    body: Result<Form<ApproveForm>, FormRejection>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let body = form(body)?;
    let request = state
        .recovery
        .approve(&caller.did, &body.request_id, &body.guardian_peer_id)
        .await?;

    Ok(Json(ApprovalResponse {
        request_id: request.request_id,
        approvals_count: request.approvals_count(),
        status: request.status,
    }))
}

#[utoipa::path(
    get,
    path = "/api/recovery/{request_id}",
    params(
        ("request_id" = String, Path, description = "Recovery request id"),
        StatusQuery
    ),
    tag = "Recovery",
    responses(
        (status = 200, body = RecoveryStatusResponse),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn recovery_status(
    State(state): State<AppState>,
    _caller: Caller,
    Path(request_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<RecoveryStatusResponse>, ApiError> {
    let wait = Duration::from_secs(query.wait_secs.unwrap_or(0)).min(MAX_STATUS_WAIT);
    let request = state.recovery.wait_for_change(&request_id, wait).await?;
    Ok(Json(request.into()))
}

/// Cancel a pending request. Only the old or new identity may cancel.
#[utoipa::path(
    post,
    path = "/api/recovery/{request_id}/cancel",
    params(("request_id" = String, Path, description = "Recovery request id")),
    tag = "Recovery",
    responses(
        (status = 200, body = RecoveryStatusResponse),
        (status = 403, body = ErrorBody),
        (status = 404, body = ErrorBody),
        (status = 409, body = ErrorBody)
    )
)]
pub async fn cancel_recovery(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    Path(request_id): Path<String>,
) -> Result<Json<RecoveryStatusResponse>, ApiError> {
    let request = state.recovery.cancel(&caller.did, &request_id).await?;
    Ok(Json(request.into()))
}

/// The completion record published to the content store.
#[utoipa::path(
    get,
    path = "/api/recovery/{request_id}/attestation",
    params(("request_id" = String, Path, description = "Recovery request id")),
    tag = "Recovery",
    responses(
        (status = 200, body = RecoveryAttestation),
        (status = 404, description = "Unknown request or nothing published", body = ErrorBody)
    )
)]
pub async fn recovery_attestation(
    State(state): State<AppState>,
    _caller: Caller,
    Path(request_id): Path<String>,
) -> Result<Json<RecoveryAttestation>, ApiError> {
    Ok(Json(state.recovery.attestation(&request_id).await?))
}

/// Split the caller's seed into shards for offline recovery.
///
/// The shards are returned once and never stored by the node.
#[utoipa::path(
    post,
    path = "/api/recovery/setup",
    request_body(content = ShardSetupForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Recovery",
    responses(
        (status = 200, body = ShardSetupResponse),
        (status = 400, description = "Bad threshold or share count, or a non-Ed25519 identity", body = ErrorBody),
        (status = 403, description = "Unsigned request", body = ErrorBody)
    )
)]
pub async fn setup_shards(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    body: Result<Form<ShardSetupForm>, FormRejection>,
) -> Result<Json<ShardSetupResponse>, ApiError> {
    let body = form(body)?;
    let threshold = body.threshold.unwrap_or(DEFAULT_SHARD_THRESHOLD.into());
    let shares = body.shares.unwrap_or(DEFAULT_SHARD_COUNT.into());

    let account = AccountRepository::new(&state.storage).get(&caller.did)?;
    let shards = shards::split(&account.secret, threshold, shares)?;

    info!(did = %caller.did, threshold, shares, "Recovery shards issued");
    let event = AuditEvent::new(AuditEventType::RecoveryShardsIssued)
        .with_did(caller.did.to_string())
        .with_details(serde_json::json!({ "threshold": threshold, "shares": shares }));
    audit_log!(@write &state.storage, event);

    Ok(Json(ShardSetupResponse {
        did: caller.did,
        threshold,
        shares,
        shards,
        instructions: format!(
            "Give each of the {shares} shards to a different trusted person. Any {threshold} of them restore this identity."
        ),
    }))
}

/// Rebuild an identity from shards and put it back in the keystore.
#[utoipa::path(
    post,
    path = "/api/recovery/restore",
    request_body(content = RestoreRequest, content_type = "application/json"),
    tag = "Recovery",
    responses(
        (status = 200, description = "Identity was already held", body = RestoredIdentityResponse),
        (status = 201, description = "Identity restored into the keystore", body = RestoredIdentityResponse),
        (status = 400, description = "Malformed, insufficient or mismatched shards", body = ErrorBody)
    )
)]
pub async fn restore_identity(
    State(state): State<AppState>,
    body: Result<Json<RestoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RestoredIdentityResponse>), ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    let expected = body.expected_did.as_deref().map(parse_peer).transpose()?;
    let identity = shards::combine(&body.shards, expected.as_ref())?;

    let accounts = AccountRepository::new(&state.storage);
    let (status, origin) = match accounts.find(identity.did())? {
        Some(existing) => (StatusCode::OK, existing.origin),
        None => {
            accounts.create(&StoredAccount::new(&identity, AccountOrigin::Restored))?;
            (StatusCode::CREATED, AccountOrigin::Restored)
        }
    };
    let current_did = BindingRepository::new(&state.storage).resolve_current(identity.did())?;

    info!(did = %identity.did(), newly_stored = status == StatusCode::CREATED, "Identity restored from shards");
    audit_log!(&state.storage, AuditEventType::IdentityRestored, identity.did());

    Ok((
        status,
        Json(RestoredIdentityResponse {
            did: identity.did().clone(),
            secret: identity.secret().expose().to_string(),
            origin,
            current_did,
        }),
    ))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::FormRejection, Path, State},
    Form, Json,
};

use super::{form, parse_peer};
use crate::{
    auth::{Caller, SignedCaller},
    error::{ApiError, ErrorBody},
    guardians::MAX_GUARDIANS,
    identity::Did,
    models::{GuardiansResponse, PeerForm},
    state::AppState,
};

fn response(owner: Did, guardians: Vec<Did>) -> Json<GuardiansResponse> {
    Json(GuardiansResponse {
        owner,
        guardians,
        max_guardians: MAX_GUARDIANS,
    })
}

#[utoipa::path(
    get,
    path = "/api/guardians",
    tag = "Guardians",
    responses(
        (status = 200, body = GuardiansResponse),
        (status = 401, body = ErrorBody)
    )
)]
pub async fn list_guardians(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<GuardiansResponse>, ApiError> {
    let guardians = state.guardians.list(&caller.did)?;
    Ok(response(caller.did, guardians))
}

/// Nominate a contact as guardian of the caller.
#[utoipa::path(
    post,
    path = "/api/guardians/add",
    request_body(content = PeerForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Guardians",
    responses(
        (status = 200, description = "Resulting guardian set", body = GuardiansResponse),
        (status = 400, description = "Invalid peer or capacity reached", body = ErrorBody),
        (status = 403, description = "Peer is not a contact", body = ErrorBody)
    )
)]
pub async fn add_guardian(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    body: Result<Form<PeerForm>, FormRejection>,
) -> Result<Json<GuardiansResponse>, ApiError> {
    let peer = parse_peer(&form(body)?.peer_id)?;
    let guardians = state.guardians.add(&caller.did, &peer).await?;
    Ok(response(caller.did, guardians))
}

#[utoipa::path(
    post,
    path = "/api/guardians/remove",
    request_body(content = PeerForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Guardians",
    responses(
        (status = 200, description = "Resulting guardian set", body = GuardiansResponse),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn remove_guardian(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    body: Result<Form<PeerForm>, FormRejection>,
) -> Result<Json<GuardiansResponse>, ApiError> {
    let peer = parse_peer(&form(body)?.peer_id)?;
    let guardians = state.guardians.remove(&caller.did, &peer).await?;
    Ok(response(caller.did, guardians))
}

/// Guardians of any identity, so a guardian can check its standing.
#[utoipa::path(
    get,
    path = "/api/guardians/of/{did}",
    params(("did" = String, Path, description = "Owner of the guardian set")),
    tag = "Guardians",
    responses(
        (status = 200, body = GuardiansResponse),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn guardians_of(
    State(state): State<AppState>,
    _caller: Caller,
    Path(did): Path<String>,
) -> Result<Json<GuardiansResponse>, ApiError> {
    let owner = parse_peer(&did)?;
    let guardians = state.guardians.list(&owner)?;
    Ok(response(owner, guardians))
}

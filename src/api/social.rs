// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{rejection::FormRejection, Path, State},
    Form, Json,
};

use super::{form, parse_peer};
use crate::{
    auth::Caller,
    error::{ApiError, ErrorBody},
    models::{
        ConnectionRequestResponse, ConnectionsResponse, PeerForm, RelationshipsResponse,
        TierResponse,
    },
    state::AppState,
};

#[utoipa::path(
    post,
    path = "/api/follow/{peer_id}",
    params(("peer_id" = String, Path, description = "DID to follow")),
    tag = "Social",
    responses(
        (status = 200, description = "Resulting tier", body = TierResponse),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn follow(
    State(state): State<AppState>,
    caller: Caller,
    Path(peer_id): Path<String>,
) -> Result<Json<TierResponse>, ApiError> {
    let peer = parse_peer(&peer_id)?;
    let tier = state.social.follow(&caller.did, &peer).await?;
    Ok(Json(TierResponse { peer_id: peer, tier }))
}

#[utoipa::path(
    post,
    path = "/api/unfollow/{peer_id}",
    params(("peer_id" = String, Path, description = "DID to unfollow")),
    tag = "Social",
    responses(
        (status = 200, description = "Resulting tier", body = TierResponse),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn unfollow(
    State(state): State<AppState>,
    caller: Caller,
    Path(peer_id): Path<String>,
) -> Result<Json<TierResponse>, ApiError> {
    let peer = parse_peer(&peer_id)?;
    let tier = state.social.unfollow(&caller.did, &peer).await?;
    Ok(Json(TierResponse { peer_id: peer, tier }))
}

/// Every peer the caller has a relationship with.
#[utoipa::path(
    get,
    path = "/api/following",
    tag = "Social",
    responses((status = 200, body = RelationshipsResponse))
)]
pub async fn following(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<RelationshipsResponse>, ApiError> {
    Ok(Json(state.social.relationships(&caller.did)?.into()))
}

#[utoipa::path(
    get,
    path = "/api/connections",
    tag = "Social",
    responses((status = 200, body = ConnectionsResponse))
)]
pub async fn connections(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    Ok(Json(state.social.relationships(&caller.did)?.into()))
}

#[utoipa::path(
    post,
    path = "/api/connections/request",
    request_body(content = PeerForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Social",
    responses(
        (status = 200, body = ConnectionRequestResponse),
        (status = 400, body = ErrorBody)
    )
)]
pub async fn request_connection(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Form<PeerForm>, FormRejection>,
) -> Result<Json<ConnectionRequestResponse>, ApiError> {
    let peer = parse_peer(&form(body)?.peer_id)?;
    let outcome = state.social.request_connection(&caller.did, &peer).await?;
    Ok(Json(ConnectionRequestResponse {
        peer_id: peer,
        outcome,
    }))
}

#[utoipa::path(
    post,
    path = "/api/connections/accept",
    request_body(content = PeerForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Social",
    responses(
        (status = 200, description = "Both sides are now contacts", body = TierResponse),
        (status = 404, description = "No pending request from this peer", body = ErrorBody)
    )
)]
pub async fn accept_connection(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Form<PeerForm>, FormRejection>,
) -> Result<Json<TierResponse>, ApiError> {
    let peer = parse_peer(&form(body)?.peer_id)?;
    state.social.accept_connection(&caller.did, &peer).await?;
    let tier = state.social.tier(&caller.did, &peer)?;
    Ok(Json(TierResponse { peer_id: peer, tier }))
}

#[utoipa::path(
    post,
    path = "/api/connections/reject",
    request_body(content = PeerForm, content_type = "application/x-www-form-urlencoded"),
    tag = "Social",
    responses(
        (status = 200, body = TierResponse),
        (status = 404, description = "No pending request from this peer", body = ErrorBody)
    )
)]
pub async fn reject_connection(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Form<PeerForm>, FormRejection>,
) -> Result<Json<TierResponse>, ApiError> {
    let peer = parse_peer(&form(body)?.peer_id)?;
    state.social.reject_connection(&caller.did, &peer).await?;
    let tier = state.social.tier(&caller.did, &peer)?;
    Ok(Json(TierResponse { peer_id: peer, tier }))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Notification inbox of the calling identity. Signed requests only.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::SignedCaller,
    error::{ApiError, ErrorBody},
    models::{MarkAllReadResponse, NotificationsQuery, NotificationsResponse},
    state::AppState,
    storage::{NotificationRepository, NOTIFICATION_PAGE_SIZE},
};

/// Newest first, at most 50.
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(NotificationsQuery),
    tag = "Notifications",
    responses(
        (status = 200, body = NotificationsResponse),
        (status = 403, body = ErrorBody)
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationsResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(NOTIFICATION_PAGE_SIZE)
        .min(NOTIFICATION_PAGE_SIZE);
    let repo = NotificationRepository::new(&state.storage);

    Ok(Json(NotificationsResponse {
        notifications: repo.list(&caller.did, limit)?,
        unread: repo.unread_count(&caller.did)?,
    }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification id")),
    tag = "Notifications",
    responses(
        (status = 204),
        (status = 404, body = ErrorBody)
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    NotificationRepository::new(&state.storage).mark_read(&caller.did, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    tag = "Notifications",
    responses((status = 200, body = MarkAllReadResponse))
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let updated = NotificationRepository::new(&state.storage).mark_all_read(&caller.did)?;
    Ok(Json(MarkAllReadResponse { updated }))
}

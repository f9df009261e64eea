// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The caller's own audit trail.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;

use crate::{
    auth::SignedCaller,
    error::{ApiError, ErrorBody},
    models::{AuditEventsResponse, AuditQuery},
    state::AppState,
    storage::AuditRepository,
};

/// Longest range, in days, one request may read.
const MAX_AUDIT_RANGE_DAYS: i64 = 31;

/// Audit events triggered by the caller, oldest first. Defaults to today.
#[utoipa::path(
    get,
    path = "/api/audit",
    params(AuditQuery),
    tag = "Audit",
    responses(
        (status = 200, body = AuditEventsResponse),
        (status = 400, description = "Inverted or too long date range", body = ErrorBody),
        (status = 403, description = "Unsigned request", body = ErrorBody)
    )
)]
pub async fn list_audit_events(
    State(state): State<AppState>,
    SignedCaller(caller): SignedCaller,
    Query(query): Query<AuditQuery>,
) -> Result<Json<AuditEventsResponse>, ApiError> {
    let to = query.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = query.from.unwrap_or(to);
    if from > to {
        return Err(ApiError::validation("`from` must not be after `to`"));
    }
    if (to - from).num_days() >= MAX_AUDIT_RANGE_DAYS {
        return Err(ApiError::validation(format!(
            "at most {MAX_AUDIT_RANGE_DAYS} days can be read at once"
        )));
    }

    let events =
        AuditRepository::new(&state.storage).search_by_did(caller.did.as_str(), from, to)?;
    Ok(Json(AuditEventsResponse {
        did: caller.did,
        from,
        to,
        events,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{register, send};
    use crate::api::router;
    use crate::state::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn lists_only_the_callers_events() {
        let (state, _temp) = test_state();
        let alice = register(&state);
        let bob = register(&state);
        let app = router(state);

        let uri = format!("/api/follow/{}", bob.did());
        send(&app, Some(&alice), "POST", &uri, None).await;
        let uri = format!("/api/follow/{}", alice.did());
        send(&app, Some(&bob), "POST", &uri, None).await;

        let (status, body) = send(&app, Some(&alice), "GET", "/api/audit", None).await;
        assert_eq!(status, StatusCode::OK);
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], "peer_followed");
        assert_eq!(events[0]["did"], alice.did().as_str());
    }

    #[tokio::test]
    async fn rejects_bad_ranges() {
        let (state, _temp) = test_state();
        let alice = register(&state);
        let app = router(state);

        let (status, body) = send(
            &app,
            Some(&alice),
            "GET",
            "/api/audit?from=2026-02-01&to=2026-01-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation_error");

        let (status, _) = send(
            &app,
            Some(&alice),
            "GET",
            "/api/audit?from=2026-01-01&to=2026-03-01",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Some(&alice),
            "GET",
            "/api/audit?from=2026-01-01&to=2026-01-07",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["events"].as_array().unwrap().is_empty());
    }
}

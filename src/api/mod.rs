// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::rejection::FormRejection,
    http::HeaderName,
    routing::{delete, get, post},
    Form, Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::CallerTrust,
    error::{ApiError, ErrorBody, ErrorKind},
    identity::{Did, IdentityFile},
    models::{
        ApprovalResponse, ApproveForm, AuditEventsResponse, ConnectionRequestResponse,
        ConnectionsResponse, GuardiansResponse, ImportedIdentityResponse, MarkAllReadResponse,
        NotificationsResponse, PeerForm, RecoveryCreatedResponse, RecoveryRequestForm,
        RecoveryStatusResponse, RelationshipEntry, RelationshipsResponse, RestoreRequest,
        RestoredIdentityResponse, ShardSetupForm, ShardSetupResponse, SuccessorResponse,
        TierResponse, WhoAmIResponse,
    },
    recovery::{RecoveryAttestation, RecoveryStatus},
    social::{ConnectionRequestOutcome, RelationshipTier},
    state::AppState,
    storage::{
        AccountOrigin, AuditEvent, AuditEventType, IdentityBinding, Notification,
        NotificationKind,
    },
};

pub mod audit;
pub mod guardians;
pub mod health;
pub mod identity;
pub mod notifications;
pub mod recovery;
pub mod social;

/// Header carrying the per-request id.
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Unwrap a form body, reporting malformed bodies as `validation_error`.
pub(crate) fn form<T>(body: Result<Form<T>, FormRejection>) -> Result<T, ApiError> {
    body.map(|Form(value)| value)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

/// Parse a peer id taken from a path or form.
pub(crate) fn parse_peer(value: &str) -> Result<Did, ApiError> {
    Did::parse(value.trim()).map_err(|e| ApiError::validation(e.to_string()))
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Identity
        .route("/auth/generate-identity", post(identity::generate_identity))
        .route("/auth/import-identity", post(identity::import_identity))
        .route("/auth/identity", delete(identity::erase_identity))
        .route("/auth/whoami", get(identity::whoami))
        .route("/identity/{did}/successor", get(identity::successor))
        // Guardians
        .route("/guardians", get(guardians::list_guardians))
        .route("/guardians/add", post(guardians::add_guardian))
        .route("/guardians/remove", post(guardians::remove_guardian))
        .route("/guardians/of/{did}", get(guardians::guardians_of))
        // Recovery
        .route("/recovery/setup", post(recovery::setup_shards))
        .route("/recovery/restore", post(recovery::restore_identity))
        .route("/recovery/request", post(recovery::request_recovery))
        .route("/recovery/approve", post(recovery::approve_recovery))
        .route("/recovery/{request_id}", get(recovery::recovery_status))
        .route("/recovery/{request_id}/cancel", post(recovery::cancel_recovery))
        .route(
            "/recovery/{request_id}/attestation",
            get(recovery::recovery_attestation),
        )
        // Social graph
        .route("/follow/{peer_id}", post(social::follow))
        .route("/unfollow/{peer_id}", post(social::unfollow))
        .route("/following", get(social::following))
        .route("/connections", get(social::connections))
        .route("/connections/request", post(social::request_connection))
        .route("/connections/accept", post(social::accept_connection))
        .route("/connections/reject", post(social::reject_connection))
        // Notifications
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/read-all",
            post(notifications::mark_all_read),
        )
        .route(
            "/notifications/{id}/read",
            post(notifications::mark_read),
        )
        // Audit
        .route("/audit", get(audit::list_audit_events));

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        identity::generate_identity,
        identity::import_identity,
        identity::erase_identity,
        identity::whoami,
        identity::successor,
        guardians::list_guardians,
        guardians::add_guardian,
        guardians::remove_guardian,
        guardians::guardians_of,
        recovery::setup_shards,
        recovery::restore_identity,
        recovery::request_recovery,
        recovery::approve_recovery,
        recovery::recovery_status,
        recovery::cancel_recovery,
        recovery::recovery_attestation,
        social::follow,
        social::unfollow,
        social::following,
        social::connections,
        social::request_connection,
        social::accept_connection,
        social::reject_connection,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        audit::list_audit_events,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Did,
            IdentityFile,
            IdentityBinding,
            AccountOrigin,
            CallerTrust,
            ErrorBody,
            ErrorKind,
            WhoAmIResponse,
            ImportedIdentityResponse,
            SuccessorResponse,
            PeerForm,
            GuardiansResponse,
            RecoveryRequestForm,
            RecoveryCreatedResponse,
            ApproveForm,
            ApprovalResponse,
            RecoveryStatusResponse,
            RecoveryStatus,
            RecoveryAttestation,
            ShardSetupForm,
            ShardSetupResponse,
            RestoreRequest,
            RestoredIdentityResponse,
            RelationshipTier,
            TierResponse,
            ConnectionRequestOutcome,
            ConnectionRequestResponse,
            ConnectionsResponse,
            RelationshipEntry,
            RelationshipsResponse,
            Notification,
            NotificationKind,
            NotificationsResponse,
            MarkAllReadResponse,
            AuditEvent,
            AuditEventType,
            AuditEventsResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    tags(
        (name = "Identity", description = "Identity generation, import and lookup"),
        (name = "Guardians", description = "Guardian set management"),
        (name = "Recovery", description = "Threshold social recovery"),
        (name = "Social", description = "Follows and connections"),
        (name = "Notifications", description = "Notification inbox"),
        (name = "Audit", description = "The caller's audit trail"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;


#[cfg(test)]
mod tests {
    use super::test_support::send;
    use super::*;
    use crate::state::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _temp) = test_state();
        let app = router(state);
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (state, _temp) = test_state();
        let app = router(state);
        let (status, _) = send(&app, None, "GET", "/api/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (state, _temp) = test_state();
        let app = router(state);
        let (status, doc) = send(&app, None, "GET", "/api-doc/openapi.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(doc["paths"]["/api/recovery/approve"].is_object());
        assert!(doc["paths"]["/api/recovery/restore"].is_object());
        assert!(doc["paths"]["/api/audit"].is_object());
    }
}

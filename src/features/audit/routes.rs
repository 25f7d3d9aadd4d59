use axum::{
    routing::{get, post},
    Router,
};

use crate::features::audit::handlers::{self, AuditState};

pub fn admin_routes(state: AuditState) -> Router {
    Router::new()
        .route("/api/admin/audit", get(handlers::query_audit))
        .route(
            "/api/admin/audit/security-events",
            get(handlers::security_events),
        )
        .route("/api/admin/audit/failed", get(handlers::failed_events))
        .route(
            "/api/admin/audit/stats/actors",
            get(handlers::stats_by_actor),
        )
        .route("/api/admin/audit/{id}/review", post(handlers::review_event))
        .with_state(state)
}

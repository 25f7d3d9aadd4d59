use axum::{
    routing::{get, post},
    Router,
};

use crate::features::prompts::handlers::{self, PromptsState};

/// Admin routes for definition and version management. Authorization happens
/// inside each handler through the access gate, not per route.
pub fn admin_routes(state: PromptsState) -> Router {
    Router::new()
        .route(
            "/api/admin/prompts",
            post(handlers::create_definition).get(handlers::list_definitions),
        )
        .route(
            "/api/admin/prompts/{id}",
            get(handlers::get_definition).delete(handlers::delete_definition),
        )
        .route(
            "/api/admin/prompts/{id}/versions",
            post(handlers::add_version).get(handlers::list_for_editing),
        )
        .route(
            "/api/admin/prompts/{id}/versions/{ordinal}/activate",
            post(handlers::activate_version),
        )
        .route(
            "/api/admin/prompts/{id}/active-content",
            get(handlers::get_active_content),
        )
        .with_state(state)
}

use axum::{routing::post, Router};

use crate::features::access_gate::handlers::{self, GateState};

pub fn admin_routes(state: GateState) -> Router {
    Router::new()
        .route(
            "/api/admin/security/step-up/enroll",
            post(handlers::enroll_step_up),
        )
        .route(
            "/api/admin/security/step-up/confirm",
            post(handlers::confirm_step_up),
        )
        .with_state(state)
}

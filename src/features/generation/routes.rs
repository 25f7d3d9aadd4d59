use axum::{routing::post, Router};

use crate::features::generation::handlers::{self, GenerationState};

pub fn routes(state: GenerationState) -> Router {
    Router::new()
        .route("/api/text/process", post(handlers::process_text))
        .with_state(state)
}

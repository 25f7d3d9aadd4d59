use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, RequestContext};
use crate::features::auth::model::Actor;
use crate::features::generation::dtos::{ProcessTextDto, ProcessTextResponseDto};
use crate::features::generation::service::GenerationService;
use crate::shared::types::ApiResponse;

#[derive(Clone)]
pub struct GenerationState {
    pub service: Arc<GenerationService>,
}

/// Run a text-processing operation driven by the named definition
#[utoipa::path(
    post,
    path = "/api/text/process",
    request_body = ProcessTextDto,
    responses(
        (status = 200, description = "Text processed", body = ApiResponse<ProcessTextResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Definition not available for this account"),
        (status = 404, description = "Definition not found"),
        (status = 429, description = "Rate limit exceeded")
    ),
    tag = "text",
    security(("bearer_auth" = []))
)]
pub async fn process_text(
    State(state): State<GenerationState>,
    actor: Actor,
    ctx: RequestContext,
    AppJson(dto): AppJson<ProcessTextDto>,
) -> Result<Json<ApiResponse<ProcessTextResponseDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let response = state.service.process(&actor, &ctx.ip, dto).await?;
    Ok(Json(ApiResponse::success(Some(response), None, None)))
}

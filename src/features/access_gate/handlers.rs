use axum::{extract::State, Json};
use std::sync::Arc;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, RequestContext};
use crate::features::access_gate::dtos::{ConfirmStepUpDto, EnrollmentResponseDto};
use crate::features::access_gate::ops::AdminOp;
use crate::features::access_gate::service::AccessGate;
use crate::features::access_gate::step_up::StepUpService;
use crate::features::audit::models::{
    ActionResult, AuditAction, EventMetadata, NewAuditEvent, TargetType,
};
use crate::features::audit::AuditService;
use crate::features::auth::model::Actor;
use crate::shared::types::ApiResponse;

#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<AccessGate>,
    pub step_up: Arc<StepUpService>,
    pub audit: Arc<AuditService>,
}

fn step_up_event(
    actor: &Actor,
    ctx: &RequestContext,
    action: AuditAction,
    description: String,
    result: ActionResult,
) -> NewAuditEvent {
    NewAuditEvent {
        actor_id: actor.id.clone(),
        action,
        target_type: TargetType::System,
        target_id: None,
        target_name: None,
        description,
        changes_before: None,
        changes_after: None,
        request: ctx.request_info(actor.session_id.clone()),
        result,
        metadata: EventMetadata::default(),
    }
}

/// Begin step-up enrollment: returns the secret and otpauth URL once
/// (moderator+)
#[utoipa::path(
    post,
    path = "/api/admin/security/step-up/enroll",
    responses(
        (status = 200, description = "Enrollment started", body = ApiResponse<EnrollmentResponseDto>),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Already enrolled")
    ),
    tag = "security",
    security(("bearer_auth" = []))
)]
pub async fn enroll_step_up(
    State(state): State<GateState>,
    actor: Actor,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<EnrollmentResponseDto>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::StepUpEnroll, None)
        .await?;

    let label = actor.email.clone().unwrap_or_else(|| actor.id.clone());
    let outcome = state.step_up.enroll(&actor.id, &label).await;

    let result = match &outcome {
        Ok(_) => ActionResult::success(),
        Err(e) => ActionResult::error(e.code(), e.to_string()),
    };
    state
        .audit
        .record(step_up_event(
            &actor,
            &ctx,
            AuditAction::StepUpEnrolled,
            format!("Step-up enrollment started for {}", actor.id),
            result,
        ))
        .await;

    let enrollment = outcome?;
    Ok(Json(ApiResponse::success(
        Some(EnrollmentResponseDto {
            secret: enrollment.secret,
            otpauth_url: enrollment.otpauth_url,
        }),
        None,
        None,
    )))
}

/// Confirm a pending enrollment with a valid current code (moderator+)
#[utoipa::path(
    post,
    path = "/api/admin/security/step-up/confirm",
    request_body = ConfirmStepUpDto,
    responses(
        (status = 200, description = "Enrollment confirmed"),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Invalid code"),
        (status = 404, description = "No pending enrollment")
    ),
    tag = "security",
    security(("bearer_auth" = []))
)]
pub async fn confirm_step_up(
    State(state): State<GateState>,
    actor: Actor,
    ctx: RequestContext,
    AppJson(dto): AppJson<ConfirmStepUpDto>,
) -> Result<Json<ApiResponse<()>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::StepUpConfirm, None)
        .await?;

    let outcome = state.step_up.confirm(&actor.id, &dto.code).await;

    let (action, result) = match &outcome {
        Ok(()) => (AuditAction::StepUpConfirmed, ActionResult::success()),
        Err(e) => (
            AuditAction::StepUpFailed,
            ActionResult::error(e.code(), e.to_string()),
        ),
    };
    state
        .audit
        .record(step_up_event(
            &actor,
            &ctx,
            action,
            format!("Step-up confirmation for {}", actor.id),
            result,
        ))
        .await;

    outcome?;
    Ok(Json(ApiResponse::success(
        None,
        Some("Step-up verification enabled".to_string()),
        None,
    )))
}

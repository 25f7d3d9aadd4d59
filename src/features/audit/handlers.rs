use axum::{extract::Path, extract::Query, extract::State, Json};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, RequestContext};
use crate::features::access_gate::{AccessGate, AdminOp};
use crate::features::audit::dtos::{AuditQueryParams, ReviewEventDto, StatsQuery, WindowQuery};
use crate::features::audit::models::{
    ActionResult, ActorStats, AdminAuditEvent, AuditAction, EventMetadata, NewAuditEvent,
    TargetType,
};
use crate::features::audit::AuditService;
use crate::features::auth::model::Actor;
use crate::shared::types::{ApiResponse, Meta};

#[derive(Clone)]
pub struct AuditState {
    pub audit: Arc<AuditService>,
    pub gate: Arc<AccessGate>,
}

/// Query the audit trail with filters and pagination (moderator+)
#[utoipa::path(
    get,
    path = "/api/admin/audit",
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Events retrieved", body = ApiResponse<Vec<AdminAuditEvent>>),
        (status = 403, description = "Forbidden")
    ),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn query_audit(
    State(state): State<AuditState>,
    actor: Actor,
    ctx: RequestContext,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<ApiResponse<Vec<AdminAuditEvent>>>> {
    let filter = params.to_filter()?;
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::QueryAudit, None)
        .await?;

    let (events, total) = state
        .audit
        .query(&filter, params.offset(), params.limit())
        .await?;

    Ok(Json(ApiResponse::success(
        Some(events),
        None,
        Some(Meta { total }),
    )))
}

/// Security-relevant events inside a lookback window (moderator+)
#[utoipa::path(
    get,
    path = "/api/admin/audit/security-events",
    params(WindowQuery),
    responses(
        (status = 200, description = "Security events retrieved", body = ApiResponse<Vec<AdminAuditEvent>>),
        (status = 403, description = "Forbidden")
    ),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn security_events(
    State(state): State<AuditState>,
    actor: Actor,
    ctx: RequestContext,
    Query(params): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<AdminAuditEvent>>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::SecurityEvents, None)
        .await?;

    let events = state.audit.security_events(params.window_hours).await?;
    Ok(Json(ApiResponse::success(Some(events), None, None)))
}

/// Failed administrative actions inside a lookback window (moderator+)
#[utoipa::path(
    get,
    path = "/api/admin/audit/failed",
    params(WindowQuery),
    responses(
        (status = 200, description = "Failed events retrieved", body = ApiResponse<Vec<AdminAuditEvent>>),
        (status = 403, description = "Forbidden")
    ),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn failed_events(
    State(state): State<AuditState>,
    actor: Actor,
    ctx: RequestContext,
    Query(params): Query<WindowQuery>,
) -> Result<Json<ApiResponse<Vec<AdminAuditEvent>>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::FailedEvents, None)
        .await?;

    let events = state.audit.failed_events(params.window_hours).await?;
    Ok(Json(ApiResponse::success(Some(events), None, None)))
}

/// Per-actor activity aggregates for dashboards (moderator+)
#[utoipa::path(
    get,
    path = "/api/admin/audit/stats/actors",
    params(StatsQuery),
    responses(
        (status = 200, description = "Stats retrieved", body = ApiResponse<Vec<ActorStats>>),
        (status = 403, description = "Forbidden")
    ),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn stats_by_actor(
    State(state): State<AuditState>,
    actor: Actor,
    ctx: RequestContext,
    Query(params): Query<StatsQuery>,
) -> Result<Json<ApiResponse<Vec<ActorStats>>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::StatsByActor, None)
        .await?;

    let stats = state.audit.stats_by_actor(params.from, params.to).await?;
    Ok(Json(ApiResponse::success(Some(stats), None, None)))
}

/// Attach a review annotation to an event (moderator+)
#[utoipa::path(
    post,
    path = "/api/admin/audit/{id}/review",
    params(("id" = Uuid, Path, description = "Audit event ID")),
    request_body = ReviewEventDto,
    responses(
        (status = 200, description = "Event reviewed", body = ApiResponse<AdminAuditEvent>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Event not found"),
        (status = 403, description = "Forbidden")
    ),
    tag = "audit",
    security(("bearer_auth" = []))
)]
pub async fn review_event(
    State(state): State<AuditState>,
    actor: Actor,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    AppJson(dto): AppJson<ReviewEventDto>,
) -> Result<Json<ApiResponse<AdminAuditEvent>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::ReviewAuditEvent, None)
        .await?;

    let outcome = state
        .audit
        .mark_reviewed(id, &actor.id, &dto.status, dto.notes.as_deref())
        .await;

    let result = match &outcome {
        Ok(_) => ActionResult::success(),
        Err(e) => ActionResult::error(e.code(), e.to_string()),
    };
    state
        .audit
        .record(NewAuditEvent {
            actor_id: actor.id.clone(),
            action: AuditAction::AuditEventReviewed,
            target_type: TargetType::Audit,
            target_id: Some(id.to_string()),
            target_name: None,
            description: format!("Reviewed audit event {} as {}", id, dto.status),
            changes_before: None,
            changes_after: None,
            request: ctx.request_info(actor.session_id.clone()),
            result,
            metadata: EventMetadata::default(),
        })
        .await;

    let event = outcome?;
    Ok(Json(ApiResponse::success(Some(event), None, None)))
}

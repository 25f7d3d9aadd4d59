use axum::{extract::Path, extract::Query, extract::State, Json};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, RequestContext};
use crate::features::access_gate::{AccessGate, AdminOp};
use crate::features::audit::models::{
    ActionResult, AuditAction, EventMetadata, NewAuditEvent, TargetType,
};
use crate::features::audit::AuditService;
use crate::features::auth::model::Actor;
use crate::features::prompts::dtos::{
    ActivateVersionDto, ActivationResultDto, ActiveContentDto, AddVersionDto, CreateDefinitionDto,
    DefinitionQueryParams, DefinitionResponseDto, DeleteDefinitionDto, VersionAddedDto,
    VersionContentDto,
};
use crate::features::prompts::models::PromptDefinition;
use crate::features::prompts::services::PromptService;
use crate::shared::types::{ApiResponse, Meta};

#[derive(Clone)]
pub struct PromptsState {
    pub service: Arc<PromptService>,
    pub gate: Arc<AccessGate>,
    pub audit: Arc<AuditService>,
}

/// Definition metadata without content, for audit snapshots.
fn definition_snapshot(definition: &PromptDefinition) -> serde_json::Value {
    serde_json::json!({
        "key": definition.key,
        "name": definition.name,
        "prompt_type": definition.prompt_type.as_str(),
        "is_active": definition.is_active,
        "is_public": definition.is_public,
        "current_version": definition.current_version,
        "total_versions": definition.versions.len(),
    })
}

#[allow(clippy::too_many_arguments)]
fn audit_event(
    actor: &Actor,
    ctx: &RequestContext,
    action: AuditAction,
    target_id: Option<String>,
    target_name: Option<String>,
    description: String,
    result: ActionResult,
) -> NewAuditEvent {
    NewAuditEvent {
        actor_id: actor.id.clone(),
        action,
        target_type: TargetType::Definition,
        target_id,
        target_name,
        description,
        changes_before: None,
        changes_after: None,
        request: ctx.request_info(actor.session_id.clone()),
        result,
        metadata: EventMetadata::default(),
    }
}

fn result_of<T>(outcome: &Result<T>) -> ActionResult {
    match outcome {
        Ok(_) => ActionResult::success(),
        Err(e) => ActionResult::error(e.code(), e.to_string()),
    }
}

/// Create a new prompt definition with its initial active version (owner only)
#[utoipa::path(
    post,
    path = "/api/admin/prompts",
    request_body = CreateDefinitionDto,
    responses(
        (status = 200, description = "Definition created", body = ApiResponse<DefinitionResponseDto>),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Duplicate key")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn create_definition(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    AppJson(dto): AppJson<CreateDefinitionDto>,
) -> Result<Json<ApiResponse<DefinitionResponseDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::CreateDefinition, None)
        .await?;

    let key = dto.key.clone();
    let outcome = state.service.create_definition(dto, &actor.id).await;

    let mut event = audit_event(
        &actor,
        &ctx,
        AuditAction::DefinitionCreated,
        outcome.as_ref().ok().map(|d| d.id.to_string()),
        Some(key.clone()),
        format!("Created definition '{}'", key),
        result_of(&outcome),
    );
    if let Ok(definition) = &outcome {
        event.changes_after = Some(definition_snapshot(definition));
    }
    state.audit.record(event).await;

    let definition = outcome?;
    Ok(Json(ApiResponse::success(
        Some(DefinitionResponseDto::from(definition)),
        None,
        None,
    )))
}

/// List definitions with pagination and filters (moderator+)
#[utoipa::path(
    get,
    path = "/api/admin/prompts",
    params(DefinitionQueryParams),
    responses(
        (status = 200, description = "Definitions retrieved", body = ApiResponse<Vec<DefinitionResponseDto>>),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn list_definitions(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Query(params): Query<DefinitionQueryParams>,
) -> Result<Json<ApiResponse<Vec<DefinitionResponseDto>>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::ListDefinitions, None)
        .await?;

    let (definitions, total) = state.service.list(&params).await?;

    state
        .audit
        .record(audit_event(
            &actor,
            &ctx,
            AuditAction::PromptsAccessed,
            None,
            None,
            "Listed prompt definitions".to_string(),
            ActionResult::success(),
        ))
        .await;

    Ok(Json(ApiResponse::success(
        Some(
            definitions
                .into_iter()
                .map(DefinitionResponseDto::from)
                .collect(),
        ),
        None,
        Some(Meta { total }),
    )))
}

/// Get definition metadata by id (moderator+)
#[utoipa::path(
    get,
    path = "/api/admin/prompts/{id}",
    params(("id" = Uuid, Path, description = "Definition ID")),
    responses(
        (status = 200, description = "Definition retrieved", body = ApiResponse<DefinitionResponseDto>),
        (status = 404, description = "Definition not found"),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn get_definition(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DefinitionResponseDto>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::GetDefinition, None)
        .await?;

    let definition = state.service.get_definition(id).await?;

    state
        .audit
        .record(audit_event(
            &actor,
            &ctx,
            AuditAction::PromptsAccessed,
            Some(id.to_string()),
            Some(definition.key.clone()),
            format!("Viewed definition '{}'", definition.key),
            ActionResult::success(),
        ))
        .await;

    Ok(Json(ApiResponse::success(
        Some(DefinitionResponseDto::from(definition)),
        None,
        None,
    )))
}

/// Add a new inactive content version (owner only)
#[utoipa::path(
    post,
    path = "/api/admin/prompts/{id}/versions",
    params(("id" = Uuid, Path, description = "Definition ID")),
    request_body = AddVersionDto,
    responses(
        (status = 200, description = "Version added", body = ApiResponse<VersionAddedDto>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Definition not found"),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn add_version(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    AppJson(dto): AppJson<AddVersionDto>,
) -> Result<Json<ApiResponse<VersionAddedDto>>> {
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::AddVersion, None)
        .await?;

    let outcome = state.service.add_version(id, dto, &actor.id).await;

    let mut event = audit_event(
        &actor,
        &ctx,
        AuditAction::VersionAdded,
        Some(id.to_string()),
        None,
        format!("Added version to definition {}", id),
        result_of(&outcome),
    );
    if let Ok(ordinal) = &outcome {
        event.changes_after = Some(serde_json::json!({ "ordinal": ordinal }));
    }
    state.audit.record(event).await;

    let ordinal = outcome?;
    Ok(Json(ApiResponse::success(
        Some(VersionAddedDto {
            definition_id: id,
            ordinal,
        }),
        None,
        None,
    )))
}

/// Activate a version: clears all flags, sets exactly one, moves the pointer
/// (moderator+, destructive class)
#[utoipa::path(
    post,
    path = "/api/admin/prompts/{id}/versions/{ordinal}/activate",
    params(
        ("id" = Uuid, Path, description = "Definition ID"),
        ("ordinal" = i32, Path, description = "Version ordinal")
    ),
    request_body = ActivateVersionDto,
    responses(
        (status = 200, description = "Version activated", body = ApiResponse<ActivationResultDto>),
        (status = 404, description = "Definition or version not found"),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn activate_version(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Path((id, ordinal)): Path<(Uuid, i32)>,
    AppJson(dto): AppJson<ActivateVersionDto>,
) -> Result<Json<ApiResponse<ActivationResultDto>>> {
    state
        .gate
        .authorize(
            &actor,
            &ctx,
            AdminOp::ActivateVersion,
            dto.step_up_code.as_deref(),
        )
        .await?;

    let before = match state.service.get_definition(id).await {
        Ok(definition) => definition,
        Err(e) => {
            state
                .audit
                .record(audit_event(
                    &actor,
                    &ctx,
                    AuditAction::VersionActivated,
                    Some(id.to_string()),
                    None,
                    format!("Activation of version {} failed for {}", ordinal, id),
                    ActionResult::error(e.code(), e.to_string()),
                ))
                .await;
            return Err(e);
        }
    };
    let outcome = state
        .service
        .activate_version(id, ordinal, &actor.id)
        .await;

    let mut event = audit_event(
        &actor,
        &ctx,
        AuditAction::VersionActivated,
        Some(id.to_string()),
        Some(before.key.clone()),
        format!(
            "Activated version {} of definition '{}'",
            ordinal, before.key
        ),
        result_of(&outcome),
    );
    event.changes_before = Some(serde_json::json!({ "active_version": before.current_version }));
    if outcome.is_ok() {
        event.changes_after = Some(serde_json::json!({ "active_version": ordinal }));
    }
    state.audit.record(event).await;

    outcome?;
    Ok(Json(ApiResponse::success(
        Some(ActivationResultDto {
            definition_id: id,
            active_version: ordinal,
        }),
        None,
        None,
    )))
}

/// List all versions with decrypted content, for editing (owner only)
#[utoipa::path(
    get,
    path = "/api/admin/prompts/{id}/versions",
    params(("id" = Uuid, Path, description = "Definition ID")),
    responses(
        (status = 200, description = "Versions retrieved", body = ApiResponse<Vec<VersionContentDto>>),
        (status = 404, description = "Definition not found"),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn list_for_editing(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<VersionContentDto>>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::ListForEditing, None)
        .await?;

    let versions = state.service.list_for_editing(id).await?;

    state
        .audit
        .record(audit_event(
            &actor,
            &ctx,
            AuditAction::PromptsAccessed,
            Some(id.to_string()),
            None,
            format!("Accessed version contents of definition {}", id),
            ActionResult::success(),
        ))
        .await;

    Ok(Json(ApiResponse::success(
        Some(
            versions
                .iter()
                .map(|(version, content)| VersionContentDto::from_version(version, content.clone()))
                .collect(),
        ),
        None,
        None,
    )))
}

/// Decrypted content of the active version (owner only)
#[utoipa::path(
    get,
    path = "/api/admin/prompts/{id}/active-content",
    params(("id" = Uuid, Path, description = "Definition ID")),
    responses(
        (status = 200, description = "Active content retrieved", body = ApiResponse<ActiveContentDto>),
        (status = 404, description = "Definition not found or no active version"),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn get_active_content(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ActiveContentDto>>> {
    state
        .gate
        .authorize(&actor, &ctx, AdminOp::GetActiveContent, None)
        .await?;

    let active = state.service.get_active_content(id).await?;

    state
        .audit
        .record(audit_event(
            &actor,
            &ctx,
            AuditAction::PromptsAccessed,
            Some(id.to_string()),
            Some(active.key.clone()),
            format!("Accessed active content of definition '{}'", active.key),
            ActionResult::success(),
        ))
        .await;

    Ok(Json(ApiResponse::success(
        Some(ActiveContentDto {
            definition_id: active.definition_id,
            key: active.key,
            ordinal: active.ordinal,
            content: active.content,
            system_instruction: active.system_instruction,
        }),
        None,
        None,
    )))
}

/// Soft-delete a definition. Requires a justification of at least five
/// characters and, by default, a step-up one-time code (moderator+)
#[utoipa::path(
    delete,
    path = "/api/admin/prompts/{id}",
    params(("id" = Uuid, Path, description = "Definition ID")),
    request_body = DeleteDefinitionDto,
    responses(
        (status = 200, description = "Definition deleted"),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Definition not found"),
        (status = 403, description = "Forbidden")
    ),
    tag = "prompts",
    security(("bearer_auth" = []))
)]
pub async fn delete_definition(
    State(state): State<PromptsState>,
    actor: Actor,
    ctx: RequestContext,
    Path(id): Path<Uuid>,
    AppJson(dto): AppJson<DeleteDefinitionDto>,
) -> Result<Json<ApiResponse<()>>> {
    // Malformed input is rejected before the gate runs, so nothing is
    // recorded or counted for an invalid request.
    dto.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    state
        .gate
        .authorize(
            &actor,
            &ctx,
            AdminOp::DeleteDefinition,
            dto.step_up_code.as_deref(),
        )
        .await?;

    let outcome = state
        .service
        .delete_definition(id, &dto.reason, &actor.id)
        .await;

    let mut event = audit_event(
        &actor,
        &ctx,
        AuditAction::DefinitionDeleted,
        Some(id.to_string()),
        outcome.as_ref().ok().map(|d| d.key.clone()),
        format!("Deleted definition {} (reason: {})", id, dto.reason),
        result_of(&outcome),
    );
    if let Ok(before) = &outcome {
        event.changes_before = Some(definition_snapshot(before));
    }
    state.audit.record(event).await;

    outcome?;
    Ok(Json(ApiResponse::success(None, None, None)))
}

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::features::access_gate::{dtos as gate_dtos, handlers as gate_handlers};
use crate::features::audit::{dtos as audit_dtos, handlers as audit_handlers, models as audit_models};
use crate::features::auth::model as auth_model;
use crate::features::generation::{
    client as generation_client, dtos as generation_dtos, handlers as generation_handlers,
};
use crate::features::prompts::{
    dtos as prompts_dtos, handlers as prompts_handlers, models as prompts_models,
};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Text processing
        generation_handlers::process_text,
        // Prompts (admin)
        prompts_handlers::prompt_handler::create_definition,
        prompts_handlers::prompt_handler::list_definitions,
        prompts_handlers::prompt_handler::get_definition,
        prompts_handlers::prompt_handler::add_version,
        prompts_handlers::prompt_handler::activate_version,
        prompts_handlers::prompt_handler::list_for_editing,
        prompts_handlers::prompt_handler::get_active_content,
        prompts_handlers::prompt_handler::delete_definition,
        // Audit (admin)
        audit_handlers::query_audit,
        audit_handlers::security_events,
        audit_handlers::failed_events,
        audit_handlers::stats_by_actor,
        audit_handlers::review_event,
        // Step-up (admin)
        gate_handlers::enroll_step_up,
        gate_handlers::confirm_step_up,
    ),
    components(
        schemas(
            // Shared
            Meta,
            auth_model::Actor,
            auth_model::Role,
            auth_model::Tier,
            // Text processing
            generation_client::ChatMessage,
            generation_dtos::ProcessTextDto,
            generation_dtos::ProcessTextResponseDto,
            ApiResponse<generation_dtos::ProcessTextResponseDto>,
            // Prompts
            prompts_models::PromptType,
            prompts_models::PromptCategory,
            prompts_models::PromptScope,
            prompts_models::UsageStats,
            prompts_dtos::SortDirection,
            prompts_dtos::CreateDefinitionDto,
            prompts_dtos::AddVersionDto,
            prompts_dtos::ActivateVersionDto,
            prompts_dtos::DeleteDefinitionDto,
            prompts_dtos::DefinitionResponseDto,
            prompts_dtos::VersionAddedDto,
            prompts_dtos::VersionContentDto,
            prompts_dtos::ActiveContentDto,
            prompts_dtos::ActivationResultDto,
            ApiResponse<prompts_dtos::DefinitionResponseDto>,
            ApiResponse<Vec<prompts_dtos::DefinitionResponseDto>>,
            ApiResponse<prompts_dtos::VersionAddedDto>,
            ApiResponse<Vec<prompts_dtos::VersionContentDto>>,
            ApiResponse<prompts_dtos::ActiveContentDto>,
            ApiResponse<prompts_dtos::ActivationResultDto>,
            // Audit
            audit_models::AuditAction,
            audit_models::Severity,
            audit_models::ResultStatus,
            audit_models::TargetType,
            audit_models::RequestInfo,
            audit_models::ActionResult,
            audit_models::EventMetadata,
            audit_models::ReviewAnnotation,
            audit_models::AdminAuditEvent,
            audit_models::ActorStats,
            audit_dtos::ReviewEventDto,
            ApiResponse<Vec<audit_models::AdminAuditEvent>>,
            ApiResponse<audit_models::AdminAuditEvent>,
            ApiResponse<Vec<audit_models::ActorStats>>,
            // Step-up
            gate_dtos::ConfirmStepUpDto,
            gate_dtos::EnrollmentResponseDto,
            ApiResponse<gate_dtos::EnrollmentResponseDto>,
        )
    ),
    tags(
        (name = "text", description = "Text processing driven by managed definitions"),
        (name = "prompts", description = "Prompt definition and version management (admin)"),
        (name = "audit", description = "Administrative audit trail (admin)"),
        (name = "security", description = "Step-up verification enrollment (admin)"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Sofer API",
        version = "0.1.0",
        description = "API documentation for Sofer",
    )
)]
pub struct ApiDoc;

/// Adds Bearer JWT security scheme to OpenAPI spec
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

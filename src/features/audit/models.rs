use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed set of administrative action identifiers. Severity and flags are
/// derived from this enum alone (see `policy`), never taken from callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DefinitionCreated,
    DefinitionUpdated,
    DefinitionDeleted,
    VersionAdded,
    VersionActivated,
    PromptsAccessed,
    AuditAccessed,
    UnauthorizedAccess,
    StepUpEnrolled,
    StepUpConfirmed,
    StepUpFailed,
    RateLimited,
    SecurityAlert,
    SettingsUpdated,
    AuditEventReviewed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DefinitionCreated => "definition_created",
            AuditAction::DefinitionUpdated => "definition_updated",
            AuditAction::DefinitionDeleted => "definition_deleted",
            AuditAction::VersionAdded => "version_added",
            AuditAction::VersionActivated => "version_activated",
            AuditAction::PromptsAccessed => "prompts_accessed",
            AuditAction::AuditAccessed => "audit_accessed",
            AuditAction::UnauthorizedAccess => "unauthorized_access",
            AuditAction::StepUpEnrolled => "step_up_enrolled",
            AuditAction::StepUpConfirmed => "step_up_confirmed",
            AuditAction::StepUpFailed => "step_up_failed",
            AuditAction::RateLimited => "rate_limited",
            AuditAction::SecurityAlert => "security_alert",
            AuditAction::SettingsUpdated => "settings_updated",
            AuditAction::AuditEventReviewed => "audit_event_reviewed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "definition_created" => AuditAction::DefinitionCreated,
            "definition_updated" => AuditAction::DefinitionUpdated,
            "definition_deleted" => AuditAction::DefinitionDeleted,
            "version_added" => AuditAction::VersionAdded,
            "version_activated" => AuditAction::VersionActivated,
            "prompts_accessed" => AuditAction::PromptsAccessed,
            "audit_accessed" => AuditAction::AuditAccessed,
            "unauthorized_access" => AuditAction::UnauthorizedAccess,
            "step_up_enrolled" => AuditAction::StepUpEnrolled,
            "step_up_confirmed" => AuditAction::StepUpConfirmed,
            "step_up_failed" => AuditAction::StepUpFailed,
            "rate_limited" => AuditAction::RateLimited,
            "security_alert" => AuditAction::SecurityAlert,
            "settings_updated" => AuditAction::SettingsUpdated,
            "audit_event_reviewed" => AuditAction::AuditEventReviewed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
    Partial,
    Pending,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
            ResultStatus::Partial => "partial",
            ResultStatus::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "success" => ResultStatus::Success,
            "error" => ResultStatus::Error,
            "partial" => ResultStatus::Partial,
            "pending" => ResultStatus::Pending,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Definition,
    Version,
    System,
    Audit,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Definition => "definition",
            TargetType::Version => "version",
            TargetType::System => "system",
            TargetType::Audit => "audit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "definition" => TargetType::Definition,
            "version" => TargetType::Version,
            "system" => TargetType::System,
            "audit" => TargetType::Audit,
            _ => return None,
        })
    }
}

/// Request context captured alongside every event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RequestInfo {
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResult {
    pub status: ResultStatus,
    pub message: Option<String>,
    pub error_code: Option<String>,
}

impl ActionResult {
    pub fn success() -> Self {
        Self {
            status: ResultStatus::Success,
            message: None,
            error_code: None,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Error,
            message: Some(message.into()),
            error_code: Some(code.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EventMetadata {
    pub duration_ms: Option<i64>,
    pub resources_affected: Option<i32>,
    pub batch_id: Option<String>,
    pub feature: Option<String>,
}

/// Input to `AuditService::record`. Severity and flags are intentionally
/// absent; they are derived centrally.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor_id: String,
    pub action: AuditAction,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub description: String,
    pub changes_before: Option<serde_json::Value>,
    pub changes_after: Option<serde_json::Value>,
    pub request: RequestInfo,
    pub result: ActionResult,
    pub metadata: EventMetadata,
}

/// Review annotation — the only mutation an event admits after creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewAnnotation {
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
    pub review_status: String,
    pub review_notes: Option<String>,
}

/// A fully-recorded audit event as read back from the trail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdminAuditEvent {
    pub id: Uuid,
    pub actor_id: String,
    pub action: AuditAction,
    pub target_type: TargetType,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub description: String,
    pub changes_before: Option<serde_json::Value>,
    pub changes_after: Option<serde_json::Value>,
    pub request: RequestInfo,
    pub result: ActionResult,
    pub severity: Severity,
    pub requires_review: bool,
    pub is_security_event: bool,
    pub is_compliance: bool,
    pub is_automated: bool,
    pub metadata: EventMetadata,
    pub review: Option<ReviewAnnotation>,
    pub created_at: DateTime<Utc>,
}

/// Filters for trail queries. All fields combine with AND.
#[derive(Debug, Clone, Default)]
pub struct AuditQueryFilter {
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub target_type: Option<TargetType>,
    pub target_id: Option<String>,
    pub severity: Option<Severity>,
    pub is_security_event: Option<bool>,
    pub status: Option<ResultStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Per-actor aggregation for operational dashboards. Never consulted for
/// access decisions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActorStats {
    pub actor_id: String,
    pub total_actions: i64,
    pub successful_actions: i64,
    pub failed_actions: i64,
    pub security_events: i64,
    pub success_rate: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

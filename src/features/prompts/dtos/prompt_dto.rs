use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::prompts::models::{
    PromptCategory, PromptDefinition, PromptScope, PromptType, PromptVersion, UsageStats,
};
use crate::shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::shared::validation::DEFINITION_KEY_REGEX;

// Sort direction
#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Desc,
    Asc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

// Helper functions for defaults
fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

// Query params for listing definitions
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct DefinitionQueryParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    #[param(minimum = 1)]
    pub page: i64,

    /// Items per page
    #[serde(default = "default_page_size")]
    #[param(minimum = 1, maximum = 100)]
    pub page_size: i64,

    /// Search in key, name, or description
    pub search: Option<String>,

    /// Filter by classification type
    pub prompt_type: Option<PromptType>,

    /// Filter by active status (true = active, false = inactive, none = all)
    pub is_active: Option<bool>,

    /// Include soft-deleted definitions (default: false)
    #[serde(default)]
    pub include_deleted: bool,

    /// Sort direction (default: desc by created_at)
    #[serde(default)]
    pub sort: SortDirection,
}

impl DefinitionQueryParams {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

// Create request: definition plus its initial version, which is activated
// immediately.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDefinitionDto {
    /// Machine key: lowercase letters and underscores only (e.g. "punctuation")
    #[validate(length(min = 1, max = 100), regex(path = *DEFINITION_KEY_REGEX, message = "key may contain only lowercase letters and underscores"))]
    pub key: String,

    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(length(max = 500))]
    pub description: Option<String>,

    pub prompt_type: PromptType,

    #[serde(default = "default_category")]
    pub category: PromptCategory,

    #[serde(default = "default_scope")]
    pub scope: PromptScope,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub is_public: bool,

    /// Role and tier names this definition is restricted to
    #[serde(default)]
    pub restricted_to: Vec<String>,

    /// Initial version content
    #[validate(length(min = 1))]
    pub content: String,

    pub system_instruction: Option<String>,

    #[validate(length(max = 500))]
    pub changelog: Option<String>,

    /// Explicitly store this content unencrypted. There is no silent
    /// downgrade: content is sealed unless this marker is set.
    #[serde(default)]
    pub store_plaintext: bool,
}

fn default_category() -> PromptCategory {
    PromptCategory::General
}

fn default_scope() -> PromptScope {
    PromptScope::Both
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddVersionDto {
    #[validate(length(min = 1))]
    pub content: String,

    pub system_instruction: Option<String>,

    #[validate(length(max = 500))]
    pub changelog: Option<String>,

    #[serde(default)]
    pub store_plaintext: bool,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ActivateVersionDto {
    /// One-time code, required when activation is in the step-up subset
    pub step_up_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DeleteDefinitionDto {
    /// Free-text justification, mandatory for destructive operations
    #[validate(length(min = 5, max = 500, message = "reason must be at least 5 characters"))]
    pub reason: String,

    /// One-time code for the step-up challenge
    pub step_up_code: Option<String>,
}

// Definition metadata response. Content never appears here; the vault-gated
// endpoints return it separately.
#[derive(Debug, Serialize, ToSchema)]
pub struct DefinitionResponseDto {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub prompt_type: PromptType,
    pub category: PromptCategory,
    pub scope: PromptScope,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_active: bool,
    pub restricted_to: Vec<String>,
    pub current_version: i32,
    pub total_versions: usize,
    pub usage: UsageStats,
    pub created_by: String,
    pub last_modified_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PromptDefinition> for DefinitionResponseDto {
    fn from(d: PromptDefinition) -> Self {
        Self {
            id: d.id,
            key: d.key,
            name: d.name,
            description: d.description,
            prompt_type: d.prompt_type,
            category: d.category,
            scope: d.scope,
            tags: d.tags,
            is_public: d.is_public,
            is_active: d.is_active,
            restricted_to: d.restricted_to,
            current_version: d.current_version,
            total_versions: d.versions.len(),
            usage: d.usage,
            created_by: d.created_by,
            last_modified_by: d.last_modified_by,
            deleted_at: d.deleted_at,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// Version with decrypted content, for the role-restricted editing path only.
#[derive(Debug, Serialize, ToSchema)]
pub struct VersionContentDto {
    pub ordinal: i32,
    pub content: String,
    pub system_instruction: Option<String>,
    pub author: String,
    pub changelog: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionAddedDto {
    pub definition_id: Uuid,
    pub ordinal: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActiveContentDto {
    pub definition_id: Uuid,
    pub key: String,
    pub ordinal: i32,
    pub content: String,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivationResultDto {
    pub definition_id: Uuid,
    pub active_version: i32,
}

impl VersionContentDto {
    pub fn from_version(version: &PromptVersion, content: String) -> Self {
        Self {
            ordinal: version.ordinal,
            content,
            system_instruction: version.system_instruction.clone(),
            author: version.author.clone(),
            changelog: version.changelog.clone(),
            is_active: version.is_active,
            created_at: version.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_reason_shorter_than_five_chars_is_rejected() {
        let dto = DeleteDefinitionDto {
            reason: "ok".to_string(),
            step_up_code: None,
        };
        assert!(dto.validate().is_err());

        let dto = DeleteDefinitionDto {
            reason: "obsolete".to_string(),
            step_up_code: None,
        };
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn create_dto_enforces_key_charset() {
        let mut dto = CreateDefinitionDto {
            key: "punctuation".to_string(),
            name: "Punctuation".to_string(),
            description: None,
            prompt_type: PromptType::Punctuation,
            category: PromptCategory::Torah,
            scope: PromptScope::Both,
            tags: vec![],
            is_public: false,
            restricted_to: vec![],
            content: "X".to_string(),
            system_instruction: None,
            changelog: None,
            store_plaintext: false,
        };
        assert!(dto.validate().is_ok());

        dto.key = "Punctuation-2".to_string();
        assert!(dto.validate().is_err());

        dto.key = "punctuation".to_string();
        dto.content = String::new();
        assert!(dto.validate().is_err());
    }
}

use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::core::error::{AppError, Result};
use crate::features::audit::models::{
    AuditAction, AuditQueryFilter, ResultStatus, Severity, TargetType,
};
use crate::shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_window_hours() -> i64 {
    24
}

/// Trail query parameters. Enum-valued filters arrive as strings and are
/// parsed strictly; unknown values are validation errors, not empty results.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    #[serde(default = "default_page")]
    #[param(minimum = 1)]
    pub page: i64,

    #[serde(default = "default_page_size")]
    #[param(minimum = 1, maximum = 100)]
    pub page_size: i64,

    pub actor_id: Option<String>,

    /// Action identifier, e.g. "definition_deleted"
    pub action: Option<String>,

    /// Target type: definition, version, system, audit
    pub target_type: Option<String>,

    pub target_id: Option<String>,

    /// Severity: low, medium, high, critical
    pub severity: Option<String>,

    pub is_security_event: Option<bool>,

    /// Result status: success, error, partial, pending
    pub status: Option<String>,

    pub from: Option<DateTime<Utc>>,

    pub to: Option<DateTime<Utc>>,
}

impl AuditQueryParams {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn to_filter(&self) -> Result<AuditQueryFilter> {
        let action = self
            .action
            .as_deref()
            .map(|v| {
                AuditAction::parse(v)
                    .ok_or_else(|| AppError::Validation(format!("Unknown action: {}", v)))
            })
            .transpose()?;
        let target_type = self
            .target_type
            .as_deref()
            .map(|v| {
                TargetType::parse(v)
                    .ok_or_else(|| AppError::Validation(format!("Unknown target type: {}", v)))
            })
            .transpose()?;
        let severity = self
            .severity
            .as_deref()
            .map(|v| {
                Severity::parse(v)
                    .ok_or_else(|| AppError::Validation(format!("Unknown severity: {}", v)))
            })
            .transpose()?;
        let status = self
            .status
            .as_deref()
            .map(|v| {
                ResultStatus::parse(v)
                    .ok_or_else(|| AppError::Validation(format!("Unknown status: {}", v)))
            })
            .transpose()?;

        Ok(AuditQueryFilter {
            actor_id: self.actor_id.clone(),
            action,
            target_type,
            target_id: self.target_id.clone(),
            severity,
            is_security_event: self.is_security_event,
            status,
            from: self.from,
            to: self.to,
        })
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct WindowQuery {
    /// Lookback window in hours (default: 24)
    #[serde(default = "default_window_hours")]
    #[param(minimum = 1)]
    pub window_hours: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct StatsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReviewEventDto {
    /// Review outcome: pending, approved, flagged, ignored
    #[validate(custom(function = validate_review_status))]
    pub status: String,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

fn validate_review_status(status: &str) -> std::result::Result<(), validator::ValidationError> {
    match status {
        "pending" | "approved" | "flagged" | "ignored" => Ok(()),
        _ => Err(validator::ValidationError::new("invalid_review_status")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_filter_is_a_validation_error() {
        let params = AuditQueryParams {
            page: 1,
            page_size: 10,
            actor_id: None,
            action: Some("made_up_action".to_string()),
            target_type: None,
            target_id: None,
            severity: None,
            is_security_event: None,
            status: None,
            from: None,
            to: None,
        };
        assert!(matches!(
            params.to_filter(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn valid_filters_parse() {
        let params = AuditQueryParams {
            page: 1,
            page_size: 10,
            actor_id: Some("actor-1".to_string()),
            action: Some("definition_deleted".to_string()),
            target_type: Some("definition".to_string()),
            target_id: None,
            severity: Some("high".to_string()),
            is_security_event: Some(true),
            status: Some("error".to_string()),
            from: None,
            to: None,
        };
        let filter = params.to_filter().unwrap();
        assert_eq!(filter.action, Some(AuditAction::DefinitionDeleted));
        assert_eq!(filter.severity, Some(Severity::High));
        assert_eq!(filter.status, Some(ResultStatus::Error));
    }

    #[test]
    fn review_status_is_a_closed_set() {
        let dto = ReviewEventDto {
            status: "approved".to_string(),
            notes: None,
        };
        assert!(dto.validate().is_ok());

        let dto = ReviewEventDto {
            status: "whatever".to_string(),
            notes: None,
        };
        assert!(dto.validate().is_err());
    }
}

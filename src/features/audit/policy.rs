//! Static action policy table: severity and flag derivation for every audit
//! action. Owned by the audit module, built once at startup, immutable at
//! runtime, and never overridable by callers.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::models::{AuditAction, Severity};

#[derive(Debug, Clone, Copy)]
pub struct ActionPolicy {
    pub severity: Severity,
    pub is_security_event: bool,
    pub requires_review: bool,
    pub is_compliance: bool,
}

const DEFAULT_POLICY: ActionPolicy = ActionPolicy {
    severity: Severity::Low,
    is_security_event: false,
    requires_review: false,
    is_compliance: false,
};

static ACTION_POLICIES: LazyLock<HashMap<AuditAction, ActionPolicy>> = LazyLock::new(|| {
    use AuditAction::*;

    let mut table = HashMap::new();
    let mut set = |action: AuditAction, policy: ActionPolicy| {
        table.insert(action, policy);
    };

    set(
        DefinitionDeleted,
        ActionPolicy {
            severity: Severity::High,
            is_security_event: false,
            requires_review: true,
            is_compliance: true,
        },
    );
    set(
        SettingsUpdated,
        ActionPolicy {
            severity: Severity::High,
            is_security_event: false,
            requires_review: true,
            is_compliance: false,
        },
    );
    set(
        SecurityAlert,
        ActionPolicy {
            severity: Severity::Critical,
            is_security_event: true,
            requires_review: true,
            is_compliance: false,
        },
    );
    set(
        UnauthorizedAccess,
        ActionPolicy {
            severity: Severity::High,
            is_security_event: true,
            requires_review: false,
            is_compliance: false,
        },
    );
    set(
        StepUpFailed,
        ActionPolicy {
            severity: Severity::Medium,
            is_security_event: true,
            requires_review: false,
            is_compliance: false,
        },
    );
    set(
        StepUpEnrolled,
        ActionPolicy {
            severity: Severity::Medium,
            is_security_event: true,
            requires_review: false,
            is_compliance: false,
        },
    );
    set(
        StepUpConfirmed,
        ActionPolicy {
            severity: Severity::Medium,
            is_security_event: true,
            requires_review: false,
            is_compliance: false,
        },
    );
    set(
        VersionActivated,
        ActionPolicy {
            severity: Severity::Medium,
            ..DEFAULT_POLICY
        },
    );
    set(
        DefinitionUpdated,
        ActionPolicy {
            severity: Severity::Medium,
            ..DEFAULT_POLICY
        },
    );
    set(
        RateLimited,
        ActionPolicy {
            severity: Severity::Medium,
            ..DEFAULT_POLICY
        },
    );

    // DefinitionCreated, VersionAdded, PromptsAccessed, AuditAccessed fall
    // through to the low-severity default.
    table
});

/// Look up the policy for an action. Unlisted actions get the low-severity
/// default.
pub fn policy_for(action: AuditAction) -> ActionPolicy {
    ACTION_POLICIES
        .get(&action)
        .copied()
        .unwrap_or(DEFAULT_POLICY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_idempotent() {
        for action in [
            AuditAction::DefinitionDeleted,
            AuditAction::UnauthorizedAccess,
            AuditAction::PromptsAccessed,
        ] {
            let first = policy_for(action);
            let second = policy_for(action);
            assert_eq!(first.severity, second.severity);
            assert_eq!(first.is_security_event, second.is_security_event);
            assert_eq!(first.requires_review, second.requires_review);
        }
    }

    #[test]
    fn destructive_actions_are_flagged_for_review() {
        let policy = policy_for(AuditAction::DefinitionDeleted);
        assert_eq!(policy.severity, Severity::High);
        assert!(policy.requires_review);
        assert!(policy.is_compliance);
    }

    #[test]
    fn identity_actions_are_security_events() {
        assert!(policy_for(AuditAction::UnauthorizedAccess).is_security_event);
        assert!(policy_for(AuditAction::StepUpFailed).is_security_event);
        assert!(policy_for(AuditAction::StepUpEnrolled).is_security_event);
        assert!(policy_for(AuditAction::StepUpConfirmed).is_security_event);
        assert!(policy_for(AuditAction::SecurityAlert).is_security_event);
        assert!(!policy_for(AuditAction::DefinitionCreated).is_security_event);
    }

    #[test]
    fn reads_default_to_low_severity() {
        let policy = policy_for(AuditAction::PromptsAccessed);
        assert_eq!(policy.severity, Severity::Low);
        assert!(!policy.requires_review);
        assert!(!policy.is_security_event);
    }
}

use crate::features::auth::model::Role;
use crate::features::rate_limits::RateLimitClass;

/// Administrative operations the gate knows how to authorize. Role floors,
/// destructiveness and rate classes are fixed properties of the operation,
/// not of the route that invokes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOp {
    CreateDefinition,
    AddVersion,
    ActivateVersion,
    DeleteDefinition,
    ListDefinitions,
    GetDefinition,
    ListForEditing,
    GetActiveContent,
    QueryAudit,
    SecurityEvents,
    FailedEvents,
    StatsByActor,
    ReviewAuditEvent,
    StepUpEnroll,
    StepUpConfirm,
}

impl AdminOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminOp::CreateDefinition => "create_definition",
            AdminOp::AddVersion => "add_version",
            AdminOp::ActivateVersion => "activate_version",
            AdminOp::DeleteDefinition => "delete_definition",
            AdminOp::ListDefinitions => "list_definitions",
            AdminOp::GetDefinition => "get_definition",
            AdminOp::ListForEditing => "list_for_editing",
            AdminOp::GetActiveContent => "get_active_content",
            AdminOp::QueryAudit => "query_audit",
            AdminOp::SecurityEvents => "security_events",
            AdminOp::FailedEvents => "failed_events",
            AdminOp::StatsByActor => "stats_by_actor",
            AdminOp::ReviewAuditEvent => "review_audit_event",
            AdminOp::StepUpEnroll => "step_up_enroll",
            AdminOp::StepUpConfirm => "step_up_confirm",
        }
    }

    /// Operations that seal or open plaintext prompt content.
    pub fn is_vault_op(&self) -> bool {
        matches!(
            self,
            AdminOp::CreateDefinition
                | AdminOp::AddVersion
                | AdminOp::ListForEditing
                | AdminOp::GetActiveContent
        )
    }

    /// The owner role is gated specifically for vault operations; everything
    /// else requires at least a moderator.
    pub fn required_role(&self) -> Role {
        if self.is_vault_op() {
            Role::Owner
        } else {
            Role::Moderator
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            AdminOp::ListDefinitions
                | AdminOp::GetDefinition
                | AdminOp::ListForEditing
                | AdminOp::GetActiveContent
                | AdminOp::QueryAudit
                | AdminOp::SecurityEvents
                | AdminOp::FailedEvents
                | AdminOp::StatsByActor
        )
    }

    /// Mutations that change or remove live behavior.
    pub fn is_destructive(&self) -> bool {
        matches!(self, AdminOp::DeleteDefinition | AdminOp::ActivateVersion)
    }

    /// Read-only traffic is exempt from the destructive class.
    pub fn rate_class(&self) -> RateLimitClass {
        if self.is_destructive() {
            RateLimitClass::DestructiveAdmin
        } else {
            RateLimitClass::Admin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_ops_require_owner() {
        assert_eq!(AdminOp::CreateDefinition.required_role(), Role::Owner);
        assert_eq!(AdminOp::AddVersion.required_role(), Role::Owner);
        assert_eq!(AdminOp::ListForEditing.required_role(), Role::Owner);
        assert_eq!(AdminOp::GetActiveContent.required_role(), Role::Owner);
        assert_eq!(AdminOp::DeleteDefinition.required_role(), Role::Moderator);
        assert_eq!(AdminOp::QueryAudit.required_role(), Role::Moderator);
    }

    #[test]
    fn destructive_ops_use_the_strict_class() {
        assert_eq!(
            AdminOp::DeleteDefinition.rate_class(),
            RateLimitClass::DestructiveAdmin
        );
        assert_eq!(
            AdminOp::ActivateVersion.rate_class(),
            RateLimitClass::DestructiveAdmin
        );
        assert_eq!(AdminOp::QueryAudit.rate_class(), RateLimitClass::Admin);
        assert_eq!(AdminOp::ListForEditing.rate_class(), RateLimitClass::Admin);
    }
}

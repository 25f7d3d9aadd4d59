use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role hierarchy (from lowest to highest):
/// - standard: end users of the text-processing API
/// - moderator: can inspect audit activity and manage version lifecycle
/// - owner: additionally cleared for vault operations (plaintext content)
///
/// Each higher role includes all permissions of lower roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Standard,
    Moderator,
    Owner,
}

impl Role {
    pub fn meets(&self, required: Role) -> bool {
        *self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Moderator => "moderator",
            Role::Owner => "owner",
        }
    }
}

/// Subscription tier, consumed from the billing collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        }
    }
}

/// Authenticated identity attempting an operation, built from validated
/// session-token claims by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Actor {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    pub tier: Tier,
    pub is_active: bool,
    /// When the underlying session was issued; the gate enforces a freshness
    /// ceiling on this independent of token expiry.
    pub session_issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Actor {
    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn has_moderator_access(&self) -> bool {
        self.role.meets(Role::Moderator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_ordered() {
        assert!(Role::Owner.meets(Role::Moderator));
        assert!(Role::Owner.meets(Role::Standard));
        assert!(Role::Moderator.meets(Role::Standard));
        assert!(!Role::Moderator.meets(Role::Owner));
        assert!(!Role::Standard.meets(Role::Moderator));
        assert!(Role::Standard.meets(Role::Standard));
    }
}

use std::sync::Arc;

use chrono::Utc;

use crate::core::config::GateConfig;
use crate::core::error::{AppError, Result};
use crate::core::extractor::RequestContext;
use crate::features::access_gate::ops::AdminOp;
use crate::features::access_gate::step_up::StepUpService;
use crate::features::audit::models::{
    ActionResult, AuditAction, EventMetadata, NewAuditEvent, TargetType,
};
use crate::features::audit::AuditService;
use crate::features::auth::model::Actor;
use crate::features::rate_limits::{RateLimitClass, RateLimitService};

/// Fixed-order predicate pipeline in front of every administrative request:
/// source IP, identity, role, session freshness, step-up challenge, rate
/// limit. The first failing predicate short-circuits with its own error code
/// and is recorded on the audit trail; disallowed callers never reach
/// business logic. Rate limiting runs last so that failed step-up attempts
/// still count toward their own stricter limiter.
pub struct AccessGate {
    config: GateConfig,
    audit: Arc<AuditService>,
    rate_limits: Arc<RateLimitService>,
    step_up: Arc<StepUpService>,
}

impl AccessGate {
    pub fn new(
        config: GateConfig,
        audit: Arc<AuditService>,
        rate_limits: Arc<RateLimitService>,
        step_up: Arc<StepUpService>,
    ) -> Self {
        Self {
            config,
            audit,
            rate_limits,
            step_up,
        }
    }

    pub async fn authorize(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        op: AdminOp,
        step_up_code: Option<&str>,
    ) -> Result<()> {
        // 1. Source-IP allow-list.
        if !self.config.bypass_ip_check && !self.ip_allowed(&ctx.ip) {
            tracing::warn!(ip = %ctx.ip, op = op.as_str(), "Admin access from non-allow-listed IP");
            self.record_denied(actor, ctx, op, AuditAction::UnauthorizedAccess, &AppError::IpNotAllowed)
                .await;
            return Err(AppError::IpNotAllowed);
        }

        // 2. Identity: the actor must be active.
        if !actor.is_active {
            self.record_denied(
                actor,
                ctx,
                op,
                AuditAction::UnauthorizedAccess,
                &AppError::AccountDisabled,
            )
            .await;
            return Err(AppError::AccountDisabled);
        }

        // 3. Role floor for the operation.
        if !actor.role.meets(op.required_role()) {
            self.record_denied(
                actor,
                ctx,
                op,
                AuditAction::UnauthorizedAccess,
                &AppError::InsufficientRole,
            )
            .await;
            return Err(AppError::InsufficientRole);
        }

        // 4. Session-freshness ceiling, independent of token expiry.
        let session_age = Utc::now() - actor.session_issued_at;
        let max_age = chrono::Duration::from_std(self.config.session_max_age)
            .unwrap_or_else(|_| chrono::Duration::hours(2));
        if session_age > max_age {
            self.record_denied(
                actor,
                ctx,
                op,
                AuditAction::UnauthorizedAccess,
                &AppError::SessionExpired,
            )
            .await;
            return Err(AppError::SessionExpired);
        }

        // 5. Step-up one-time code for the configured destructive subset.
        if self.requires_step_up(op) {
            self.check_step_up(actor, ctx, op, step_up_code).await?;
        }

        // 6. Rate limit for the operation's class.
        if let Err(e) = self
            .rate_limits
            .check(op.rate_class(), &actor.id, &ctx.ip)
            .await
        {
            self.record_denied(actor, ctx, op, AuditAction::RateLimited, &e)
                .await;
            return Err(e);
        }

        Ok(())
    }

    fn ip_allowed(&self, ip: &str) -> bool {
        self.config.admin_ip_allowlist.iter().any(|allowed| {
            // IPv6-mapped IPv4 addresses count as their IPv4 form.
            ip == allowed || ip == format!("::ffff:{}", allowed)
        })
    }

    fn requires_step_up(&self, op: AdminOp) -> bool {
        !op.is_read_only()
            && self
                .config
                .step_up_ops
                .iter()
                .any(|configured| configured == op.as_str())
    }

    async fn check_step_up(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        op: AdminOp,
        code: Option<&str>,
    ) -> Result<()> {
        if !self.step_up.has_confirmed_secret(&actor.id).await {
            self.record_denied(
                actor,
                ctx,
                op,
                AuditAction::UnauthorizedAccess,
                &AppError::StepUpRequired,
            )
            .await;
            return Err(AppError::StepUpRequired);
        }

        let code = match code {
            Some(code) if !code.is_empty() => code,
            _ => {
                self.record_denied(
                    actor,
                    ctx,
                    op,
                    AuditAction::UnauthorizedAccess,
                    &AppError::StepUpRequired,
                )
                .await;
                return Err(AppError::StepUpRequired);
            }
        };

        if !self.step_up.verify(&actor.id, code).await? {
            // Failed codes count toward the brute-force limiter even though
            // the request itself was rejected.
            self.rate_limits
                .record_failure(RateLimitClass::Auth, &actor.id, &ctx.ip)
                .await;
            self.record_denied(
                actor,
                ctx,
                op,
                AuditAction::StepUpFailed,
                &AppError::InvalidStepUpCode,
            )
            .await;
            return Err(AppError::InvalidStepUpCode);
        }

        Ok(())
    }

    async fn record_denied(
        &self,
        actor: &Actor,
        ctx: &RequestContext,
        op: AdminOp,
        action: AuditAction,
        error: &AppError,
    ) {
        self.audit
            .record(NewAuditEvent {
                actor_id: actor.id.clone(),
                action,
                target_type: TargetType::System,
                target_id: None,
                target_name: None,
                description: format!("Gate denied {} for {}", op.as_str(), actor.id),
                changes_before: None,
                changes_after: None,
                request: ctx.request_info(actor.session_id.clone()),
                result: ActionResult::error(error.code(), error.to_string()),
                metadata: EventMetadata {
                    feature: Some(op.as_str().to_string()),
                    ..EventMetadata::default()
                },
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::core::config::{RateLimitConfig, RateLimitRule};
    use crate::features::audit::models::ResultStatus;
    use crate::features::rate_limits::InMemoryCounterStore;
    use crate::shared::test_helpers::{
        in_memory_audit_store, moderator_actor, owner_actor, standard_actor, InMemoryAuditStore,
    };

    fn rate_config() -> RateLimitConfig {
        let generous = RateLimitRule {
            window_ms: 60_000,
            max_count: 1_000,
        };
        RateLimitConfig {
            general: generous,
            auth: generous,
            password_reset: generous,
            generation: generous,
            admin: generous,
            destructive_admin: generous,
        }
    }

    fn gate_config() -> GateConfig {
        GateConfig {
            admin_ip_allowlist: vec!["127.0.0.1".to_string(), "10.1.2.3".to_string()],
            bypass_ip_check: false,
            session_max_age: Duration::from_secs(2 * 3600),
            step_up_ops: vec!["delete_definition".to_string()],
        }
    }

    fn test_ctx() -> RequestContext {
        RequestContext {
            method: "DELETE".to_string(),
            endpoint: "/api/admin/prompts/abc".to_string(),
            user_agent: Some("test-agent".to_string()),
            ip: "127.0.0.1".to_string(),
        }
    }

    struct Harness {
        gate: AccessGate,
        audit_store: Arc<InMemoryAuditStore>,
        step_up: Arc<StepUpService>,
    }

    fn harness(config: GateConfig) -> Harness {
        let audit_store = in_memory_audit_store();
        let audit = Arc::new(AuditService::new(audit_store.clone()));
        let rate_limits = Arc::new(RateLimitService::new(
            Arc::new(InMemoryCounterStore::new()),
            rate_config(),
        ));
        let step_up = Arc::new(StepUpService::new("Sofer Admin"));
        let gate = AccessGate::new(config, audit, rate_limits.clone(), step_up.clone());
        Harness {
            gate,
            audit_store,
            step_up,
        }
    }

    #[tokio::test]
    async fn non_allowlisted_ip_is_denied_and_audited() {
        let h = harness(gate_config());
        let mut ctx = test_ctx();
        ctx.ip = "203.0.113.9".to_string();

        let err = h
            .gate
            .authorize(&owner_actor(), &ctx, AdminOp::ListDefinitions, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::IpNotAllowed));

        let events = h.audit_store.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::UnauthorizedAccess);
        assert!(events[0].is_security_event);
        assert_eq!(events[0].result.status, ResultStatus::Error);
        assert_eq!(events[0].result.error_code.as_deref(), Some("IP_NOT_ALLOWED"));
    }

    #[tokio::test]
    async fn ipv6_mapped_allowlisted_ip_is_accepted() {
        let h = harness(gate_config());
        let mut ctx = test_ctx();
        ctx.ip = "::ffff:10.1.2.3".to_string();

        h.gate
            .authorize(&moderator_actor(), &ctx, AdminOp::QueryAudit, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inactive_actor_is_denied() {
        let h = harness(gate_config());
        let mut actor = owner_actor();
        actor.is_active = false;

        let err = h
            .gate
            .authorize(&actor, &test_ctx(), AdminOp::ListDefinitions, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccountDisabled));
    }

    #[tokio::test]
    async fn standard_actor_deleting_definition_gets_forbidden_security_event() {
        let h = harness(gate_config());

        let err = h
            .gate
            .authorize(&standard_actor(), &test_ctx(), AdminOp::DeleteDefinition, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientRole));

        let events = h.audit_store.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::UnauthorizedAccess);
        assert!(events[0].is_security_event);
    }

    #[tokio::test]
    async fn moderator_cannot_touch_vault_operations() {
        let h = harness(gate_config());

        let err = h
            .gate
            .authorize(&moderator_actor(), &test_ctx(), AdminOp::ListForEditing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientRole));
    }

    #[tokio::test]
    async fn stale_session_is_denied_independent_of_token_expiry() {
        let h = harness(gate_config());
        let mut actor = owner_actor();
        actor.session_issued_at = Utc::now() - chrono::Duration::hours(3);

        let err = h
            .gate
            .authorize(&actor, &test_ctx(), AdminOp::ListDefinitions, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn step_up_without_enrollment_is_denied() {
        let h = harness(gate_config());

        let err = h
            .gate
            .authorize(&moderator_actor(), &test_ctx(), AdminOp::DeleteDefinition, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StepUpRequired));
    }

    #[tokio::test]
    async fn step_up_with_valid_code_passes() {
        let h = harness(gate_config());
        let actor = moderator_actor();

        h.step_up.enroll(&actor.id, "mod@example.com").await.unwrap();
        let code = h.step_up.current_code(&actor.id).await.unwrap();
        h.step_up.confirm(&actor.id, &code).await.unwrap();

        let code = h.step_up.current_code(&actor.id).await.unwrap();
        h.gate
            .authorize(&actor, &test_ctx(), AdminOp::DeleteDefinition, Some(&code))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn repeated_invalid_codes_all_appear_in_security_events() {
        let h = harness(gate_config());
        let actor = moderator_actor();

        h.step_up.enroll(&actor.id, "mod@example.com").await.unwrap();
        let code = h.step_up.current_code(&actor.id).await.unwrap();
        h.step_up.confirm(&actor.id, &code).await.unwrap();

        for _ in 0..10 {
            let err = h
                .gate
                .authorize(
                    &actor,
                    &test_ctx(),
                    AdminOp::DeleteDefinition,
                    Some("000000"),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidStepUpCode));
        }

        let audit = AuditService::new(h.audit_store.clone());
        let events = audit.security_events(24).await.unwrap();
        let failed: Vec<_> = events
            .iter()
            .filter(|e| e.action == AuditAction::StepUpFailed)
            .collect();
        assert_eq!(failed.len(), 10);
    }

    #[tokio::test]
    async fn read_only_ops_skip_step_up() {
        let mut config = gate_config();
        config.step_up_ops.push("list_for_editing".to_string());
        let h = harness(config);

        // Owner with no step-up enrollment: read path still passes.
        h.gate
            .authorize(&owner_actor(), &test_ctx(), AdminOp::ListForEditing, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rate_limited_requests_are_audited() {
        let mut rate = rate_config();
        rate.admin = RateLimitRule {
            window_ms: 60_000,
            max_count: 1,
        };

        let audit_store = in_memory_audit_store();
        let audit = Arc::new(AuditService::new(audit_store.clone()));
        let rate_limits = Arc::new(RateLimitService::new(
            Arc::new(InMemoryCounterStore::new()),
            rate,
        ));
        let step_up = Arc::new(StepUpService::new("Sofer Admin"));
        let gate = AccessGate::new(gate_config(), audit, rate_limits, step_up);

        let actor = moderator_actor();
        gate.authorize(&actor, &test_ctx(), AdminOp::QueryAudit, None)
            .await
            .unwrap();
        let err = gate
            .authorize(&actor, &test_ctx(), AdminOp::QueryAudit, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));

        let events = audit_store.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::RateLimited);
    }
}

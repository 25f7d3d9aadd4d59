use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::audit::models::{
    ActorStats, AdminAuditEvent, AuditQueryFilter, NewAuditEvent,
};
use crate::features::audit::policy::policy_for;
use crate::features::audit::store::AuditStore;

/// Service over the append-only audit trail. `record` derives severity and
/// flags from the static action policy table; the caller supplies neither.
pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append one event. Never fails from the caller's perspective: a store
    /// failure must not abort the operation that triggered the event, so it
    /// is logged operationally and swallowed.
    pub async fn record(&self, event: NewAuditEvent) {
        let policy = policy_for(event.action);
        let action = event.action;

        let full = AdminAuditEvent {
            id: Uuid::new_v4(),
            actor_id: event.actor_id,
            action: event.action,
            target_type: event.target_type,
            target_id: event.target_id,
            target_name: event.target_name,
            description: event.description,
            changes_before: event.changes_before,
            changes_after: event.changes_after,
            request: event.request,
            result: event.result,
            severity: policy.severity,
            requires_review: policy.requires_review,
            is_security_event: policy.is_security_event,
            is_compliance: policy.is_compliance,
            is_automated: false,
            metadata: event.metadata,
            review: None,
            created_at: Utc::now(),
        };

        if full.is_security_event {
            tracing::warn!(
                action = action.as_str(),
                actor_id = %full.actor_id,
                severity = full.severity.as_str(),
                "Security-relevant admin action recorded"
            );
        }

        if let Err(e) = self.store.insert(&full).await {
            tracing::error!(
                action = action.as_str(),
                actor_id = %full.actor_id,
                "Failed to write audit event: {}",
                e
            );
        }
    }

    pub async fn query(
        &self,
        filter: &AuditQueryFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AdminAuditEvent>, i64)> {
        self.store.query(filter, offset, limit).await
    }

    pub async fn security_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>> {
        self.store.security_events(window_hours).await
    }

    pub async fn failed_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>> {
        self.store.failed_events(window_hours).await
    }

    /// Aggregates for operational dashboards, never for access decisions.
    pub async fn stats_by_actor(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActorStats>> {
        self.store.stats_by_actor(from, to).await
    }

    /// Attach a review annotation, the only mutation an event admits.
    pub async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewed_by: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<AdminAuditEvent> {
        self.store.mark_reviewed(id, reviewed_by, status, notes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::audit::models::{
        ActionResult, AuditAction, EventMetadata, RequestInfo, Severity, TargetType,
    };
    use crate::shared::test_helpers::InMemoryAuditStore;

    fn new_event(action: AuditAction) -> NewAuditEvent {
        NewAuditEvent {
            actor_id: "actor-1".to_string(),
            action,
            target_type: TargetType::Definition,
            target_id: Some("def-1".to_string()),
            target_name: Some("punctuation".to_string()),
            description: "test event".to_string(),
            changes_before: None,
            changes_after: None,
            request: RequestInfo::default(),
            result: ActionResult::success(),
            metadata: EventMetadata::default(),
        }
    }

    #[tokio::test]
    async fn record_derives_severity_and_flags() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = AuditService::new(store.clone());

        service.record(new_event(AuditAction::DefinitionDeleted)).await;

        let events = store.all().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::High);
        assert!(events[0].requires_review);
    }

    #[tokio::test]
    async fn recording_same_action_twice_derives_identical_classification() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = AuditService::new(store.clone());

        service.record(new_event(AuditAction::UnauthorizedAccess)).await;
        service.record(new_event(AuditAction::UnauthorizedAccess)).await;

        let events = store.all().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].severity, events[1].severity);
        assert_eq!(events[0].is_security_event, events[1].is_security_event);
        assert_eq!(events[0].requires_review, events[1].requires_review);
    }

    #[tokio::test]
    async fn security_events_window_returns_flagged_events() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = AuditService::new(store);

        service.record(new_event(AuditAction::UnauthorizedAccess)).await;
        service.record(new_event(AuditAction::DefinitionCreated)).await;

        let events = service.security_events(24).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::UnauthorizedAccess);
    }

    #[tokio::test]
    async fn stats_by_actor_aggregates_success_and_failure() {
        let store = Arc::new(InMemoryAuditStore::new());
        let service = AuditService::new(store);

        service.record(new_event(AuditAction::DefinitionCreated)).await;
        let mut failed = new_event(AuditAction::VersionActivated);
        failed.result = ActionResult::error("NOT_FOUND", "missing version");
        service.record(failed).await;

        let stats = service.stats_by_actor(None, None).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_actions, 2);
        assert_eq!(stats[0].successful_actions, 1);
        assert_eq!(stats[0].failed_actions, 1);
        assert!((stats[0].success_rate - 50.0).abs() < f64::EPSILON);
        assert!(stats[0].last_activity.is_some());
    }
}

#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::audit::models::{
    ActorStats, AdminAuditEvent, AuditQueryFilter, ResultStatus, ReviewAnnotation,
};
use crate::features::audit::store::AuditStore;
use crate::features::auth::model::{Actor, Role, Tier};

pub fn owner_actor() -> Actor {
    actor_with_role("owner-1", Role::Owner)
}

pub fn moderator_actor() -> Actor {
    actor_with_role("moderator-1", Role::Moderator)
}

pub fn standard_actor() -> Actor {
    actor_with_role("standard-1", Role::Standard)
}

pub fn actor_with_role(id: &str, role: Role) -> Actor {
    Actor {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        role,
        tier: Tier::Enterprise,
        is_active: true,
        session_issued_at: Utc::now(),
        session_id: Some(format!("sess-{}", id)),
    }
}

/// In-memory audit store for exercising gate and service behavior without a
/// database.
#[derive(Default)]
pub struct InMemoryAuditStore {
    events: Mutex<Vec<AdminAuditEvent>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<AdminAuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, event: &AdminAuditEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }

    async fn query(
        &self,
        filter: &AuditQueryFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AdminAuditEvent>, i64)> {
        let events = self.events.lock().await;
        let matching: Vec<AdminAuditEvent> = events
            .iter()
            .filter(|e| {
                filter.actor_id.as_ref().map_or(true, |v| &e.actor_id == v)
                    && filter.action.map_or(true, |v| e.action == v)
                    && filter.target_type.map_or(true, |v| e.target_type == v)
                    && filter
                        .target_id
                        .as_ref()
                        .map_or(true, |v| e.target_id.as_ref() == Some(v))
                    && filter.severity.map_or(true, |v| e.severity == v)
                    && filter
                        .is_security_event
                        .map_or(true, |v| e.is_security_event == v)
                    && filter.status.map_or(true, |v| e.result.status == v)
                    && filter.from.map_or(true, |v| e.created_at >= v)
                    && filter.to.map_or(true, |v| e.created_at <= v)
            })
            .cloned()
            .collect();

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn security_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>> {
        let since = Utc::now() - Duration::hours(window_hours);
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.is_security_event && e.created_at >= since)
            .cloned()
            .collect())
    }

    async fn failed_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>> {
        let since = Utc::now() - Duration::hours(window_hours);
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|e| e.result.status == ResultStatus::Error && e.created_at >= since)
            .cloned()
            .collect())
    }

    async fn stats_by_actor(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActorStats>> {
        let events = self.events.lock().await;
        let mut by_actor: std::collections::HashMap<String, ActorStats> =
            std::collections::HashMap::new();

        for e in events.iter() {
            if from.is_some_and(|v| e.created_at < v) || to.is_some_and(|v| e.created_at > v) {
                continue;
            }
            let entry = by_actor
                .entry(e.actor_id.clone())
                .or_insert_with(|| ActorStats {
                    actor_id: e.actor_id.clone(),
                    total_actions: 0,
                    successful_actions: 0,
                    failed_actions: 0,
                    security_events: 0,
                    success_rate: 0.0,
                    last_activity: None,
                });
            entry.total_actions += 1;
            match e.result.status {
                ResultStatus::Success => entry.successful_actions += 1,
                ResultStatus::Error => entry.failed_actions += 1,
                _ => {}
            }
            if e.is_security_event {
                entry.security_events += 1;
            }
            entry.last_activity = Some(match entry.last_activity {
                Some(prev) if prev > e.created_at => prev,
                _ => e.created_at,
            });
        }

        let mut stats: Vec<ActorStats> = by_actor
            .into_values()
            .map(|mut s| {
                if s.total_actions > 0 {
                    s.success_rate = (s.successful_actions as f64 / s.total_actions as f64) * 100.0;
                }
                s
            })
            .collect();
        stats.sort_by(|a, b| b.total_actions.cmp(&a.total_actions));
        Ok(stats)
    }

    async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewed_by: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<AdminAuditEvent> {
        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Audit event {} not found", id)))?;
        event.review = Some(ReviewAnnotation {
            reviewed_by: reviewed_by.to_string(),
            reviewed_at: Utc::now(),
            review_status: status.to_string(),
            review_notes: notes.map(|s| s.to_string()),
        });
        Ok(event.clone())
    }
}

pub fn in_memory_audit_store() -> Arc<InMemoryAuditStore> {
    Arc::new(InMemoryAuditStore::new())
}

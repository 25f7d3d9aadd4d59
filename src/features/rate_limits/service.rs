use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::config::{RateLimitConfig, RateLimitRule};
use crate::core::error::{AppError, Result};
use crate::features::rate_limits::counter_store::CounterStore;

/// Independent windowed counter classes. Read-only admin traffic uses
/// `Admin`, never `DestructiveAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitClass {
    General,
    Auth,
    PasswordReset,
    Generation,
    Admin,
    DestructiveAdmin,
}

impl RateLimitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitClass::General => "general",
            RateLimitClass::Auth => "auth",
            RateLimitClass::PasswordReset => "password_reset",
            RateLimitClass::Generation => "generation",
            RateLimitClass::Admin => "admin",
            RateLimitClass::DestructiveAdmin => "destructive_admin",
        }
    }

    /// Classes that count rejected attempts to slow brute force. A rejected
    /// authentication check still extends the caller's own window.
    fn counts_rejected(&self) -> bool {
        matches!(self, RateLimitClass::Auth)
    }
}

/// Service for checking and enforcing rate limits
pub struct RateLimitService {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimitService {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn rule(&self, class: RateLimitClass) -> RateLimitRule {
        match class {
            RateLimitClass::General => self.config.general,
            RateLimitClass::Auth => self.config.auth,
            RateLimitClass::PasswordReset => self.config.password_reset,
            RateLimitClass::Generation => self.config.generation,
            RateLimitClass::Admin => self.config.admin,
            RateLimitClass::DestructiveAdmin => self.config.destructive_admin,
        }
    }

    fn window_key(class: RateLimitClass, actor_id: &str, ip: &str) -> String {
        format!("{}:{}:{}", class.as_str(), actor_id, ip)
    }

    /// Check the window for (class, actor, ip): prune stale hits, then either
    /// record-and-allow or reject with retry guidance.
    pub async fn check(&self, class: RateLimitClass, actor_id: &str, ip: &str) -> Result<()> {
        self.check_at(class, actor_id, ip, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        class: RateLimitClass,
        actor_id: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let rule = self.rule(class);
        let key = Self::window_key(class, actor_id, ip);
        let window = Duration::from_millis(rule.window_ms);

        let count = self.store.prune_and_count(&key, window, now).await;
        if count >= rule.max_count as usize {
            if class.counts_rejected() {
                self.store.record(&key, now).await;
            }
            tracing::warn!(
                class = class.as_str(),
                actor_id,
                ip,
                "Rate limit exceeded"
            );
            return Err(AppError::RateLimited {
                retry_after_secs: rule.window_ms / 1000,
            });
        }

        self.store.record(&key, now).await;
        Ok(())
    }

    /// Count a failed attempt (e.g. an invalid one-time code) against the
    /// class window even though no request was admitted.
    pub async fn record_failure(&self, class: RateLimitClass, actor_id: &str, ip: &str) {
        self.record_failure_at(class, actor_id, ip, Utc::now()).await;
    }

    pub async fn record_failure_at(
        &self,
        class: RateLimitClass,
        actor_id: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) {
        let key = Self::window_key(class, actor_id, ip);
        self.store.record(&key, now).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rate_limits::counter_store::InMemoryCounterStore;

    fn test_service(window_ms: u64, max_count: u32) -> RateLimitService {
        let rule = RateLimitRule {
            window_ms,
            max_count,
        };
        RateLimitService::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitConfig {
                general: rule,
                auth: rule,
                password_reset: rule,
                generation: rule,
                admin: rule,
                destructive_admin: rule,
            },
        )
    }

    #[tokio::test]
    async fn sixth_call_in_window_is_rejected() {
        let service = test_service(60_000, 5);
        let now = Utc::now();

        for _ in 0..5 {
            service
                .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
                .await
                .unwrap();
        }

        let err = service
            .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after_secs: 60 }));
    }

    #[tokio::test]
    async fn window_elapse_allows_again() {
        let service = test_service(60_000, 5);
        let now = Utc::now();

        for _ in 0..5 {
            service
                .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
                .await
                .unwrap();
        }
        assert!(service
            .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
            .await
            .is_err());

        let later = now + chrono::Duration::milliseconds(61_000);
        service
            .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", later)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn keys_are_independent_per_actor_and_ip() {
        let service = test_service(60_000, 1);
        let now = Utc::now();

        service
            .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
            .await
            .unwrap();
        // Different actor, same ip: its own window.
        service
            .check_at(RateLimitClass::Admin, "actor-2", "10.0.0.1", now)
            .await
            .unwrap();
        // Same actor, different class: its own window.
        service
            .check_at(RateLimitClass::Generation, "actor-1", "10.0.0.1", now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn auth_class_counts_rejected_attempts() {
        let service = test_service(60_000, 2);
        let now = Utc::now();

        for _ in 0..2 {
            service
                .check_at(RateLimitClass::Auth, "actor-1", "10.0.0.1", now)
                .await
                .unwrap();
        }

        // Each rejected check is itself recorded, so the window keeps
        // extending for a hammering caller.
        for i in 0..3 {
            let at = now + chrono::Duration::milliseconds(i * 10);
            assert!(service
                .check_at(RateLimitClass::Auth, "actor-1", "10.0.0.1", at)
                .await
                .is_err());
        }

        // Admin class does not record rejections: after pruning the original
        // two hits the caller is admitted again.
        let service = test_service(60_000, 2);
        for _ in 0..2 {
            service
                .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
                .await
                .unwrap();
        }
        assert!(service
            .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", now)
            .await
            .is_err());
        let later = now + chrono::Duration::milliseconds(61_000);
        service
            .check_at(RateLimitClass::Admin, "actor-1", "10.0.0.1", later)
            .await
            .unwrap();
    }
}

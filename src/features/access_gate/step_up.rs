use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::core::error::{AppError, Result};

const OTP_DIGITS: usize = 6;
const OTP_SKEW: u8 = 1;
const OTP_STEP_SECS: u64 = 30;

/// Returned once at enrollment; the secret never leaves the process again.
#[derive(Debug, Clone)]
pub struct StepUpEnrollment {
    pub secret: String,
    pub otpauth_url: String,
}

struct SecretState {
    totp: TOTP,
    confirmed: bool,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

/// Time-based one-time-code challenge for destructive operations. Secrets
/// are established through a separate enroll + confirm flow; only confirmed
/// secrets gate later operations. State is process-local, matching the
/// single-node deployment; a durable store can replace the map without
/// changing the service surface.
pub struct StepUpService {
    issuer: String,
    secrets: RwLock<HashMap<String, SecretState>>,
}

impl StepUpService {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            secrets: RwLock::new(HashMap::new()),
        }
    }

    /// Begin enrollment: generate a fresh secret for the actor, pending until
    /// confirmed. Re-enrolling replaces any unconfirmed secret but never a
    /// confirmed one.
    pub async fn enroll(&self, actor_id: &str, account_label: &str) -> Result<StepUpEnrollment> {
        let mut secrets = self.secrets.write().await;
        if secrets.get(actor_id).is_some_and(|s| s.confirmed) {
            return Err(AppError::Conflict(
                "Step-up verification is already enrolled for this actor".to_string(),
            ));
        }

        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|_| AppError::Internal("Failed to generate step-up secret".to_string()))?;
        let encoded = match secret.to_encoded() {
            Secret::Encoded(value) => value,
            Secret::Raw(_) => {
                return Err(AppError::Internal(
                    "Failed to encode step-up secret".to_string(),
                ))
            }
        };

        let totp = TOTP::new(
            Algorithm::SHA1,
            OTP_DIGITS,
            OTP_SKEW,
            OTP_STEP_SECS,
            secret_bytes,
            Some(self.issuer.clone()),
            account_label.to_string(),
        )
        .map_err(|e| AppError::Internal(format!("Failed to build one-time-code state: {:?}", e)))?;

        let otpauth_url = totp.get_url();

        secrets.insert(
            actor_id.to_string(),
            SecretState {
                totp,
                confirmed: false,
                created_at: Utc::now(),
            },
        );

        Ok(StepUpEnrollment {
            secret: encoded,
            otpauth_url,
        })
    }

    /// Confirm a pending enrollment with a valid current code. Only after
    /// confirmation does the secret gate destructive operations.
    pub async fn confirm(&self, actor_id: &str, code: &str) -> Result<()> {
        let mut secrets = self.secrets.write().await;
        let state = secrets
            .get_mut(actor_id)
            .ok_or_else(|| AppError::NotFound("No pending step-up enrollment".to_string()))?;

        let valid = state
            .totp
            .check_current(code)
            .map_err(|e| AppError::Internal(format!("Clock error during code check: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidStepUpCode);
        }

        state.confirmed = true;
        Ok(())
    }

    pub async fn has_confirmed_secret(&self, actor_id: &str) -> bool {
        self.secrets
            .read()
            .await
            .get(actor_id)
            .is_some_and(|s| s.confirmed)
    }

    /// Check a code against the actor's confirmed secret. Unconfirmed or
    /// missing secrets never verify.
    pub async fn verify(&self, actor_id: &str, code: &str) -> Result<bool> {
        let secrets = self.secrets.read().await;
        let state = match secrets.get(actor_id) {
            Some(state) if state.confirmed => state,
            _ => return Ok(false),
        };

        state
            .totp
            .check_current(code)
            .map_err(|e| AppError::Internal(format!("Clock error during code check: {}", e)))
    }

    /// Current valid code for an actor. Test-only convenience.
    #[cfg(test)]
    pub async fn current_code(&self, actor_id: &str) -> Option<String> {
        let secrets = self.secrets.read().await;
        secrets
            .get(actor_id)
            .and_then(|s| s.totp.generate_current().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enroll_confirm_verify_flow() {
        let service = StepUpService::new("Sofer Admin");

        let enrollment = service.enroll("actor-1", "admin@example.com").await.unwrap();
        assert!(!enrollment.secret.is_empty());
        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));

        // Unconfirmed secrets never gate operations.
        assert!(!service.has_confirmed_secret("actor-1").await);
        let code = service.current_code("actor-1").await.unwrap();
        assert!(!service.verify("actor-1", &code).await.unwrap());

        service.confirm("actor-1", &code).await.unwrap();
        assert!(service.has_confirmed_secret("actor-1").await);

        let code = service.current_code("actor-1").await.unwrap();
        assert!(service.verify("actor-1", &code).await.unwrap());
        assert!(!service.verify("actor-1", "000000").await.unwrap());
    }

    #[tokio::test]
    async fn confirm_with_wrong_code_is_rejected() {
        let service = StepUpService::new("Sofer Admin");
        service.enroll("actor-1", "admin@example.com").await.unwrap();

        let err = service.confirm("actor-1", "000000").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidStepUpCode));
        assert!(!service.has_confirmed_secret("actor-1").await);
    }

    #[tokio::test]
    async fn re_enroll_replaces_pending_but_not_confirmed() {
        let service = StepUpService::new("Sofer Admin");

        let first = service.enroll("actor-1", "admin@example.com").await.unwrap();
        let second = service.enroll("actor-1", "admin@example.com").await.unwrap();
        assert_ne!(first.secret, second.secret);

        let code = service.current_code("actor-1").await.unwrap();
        service.confirm("actor-1", &code).await.unwrap();

        let err = service
            .enroll("actor-1", "admin@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn verify_for_unknown_actor_is_false() {
        let service = StepUpService::new("Sofer Admin");
        assert!(!service.verify("nobody", "123456").await.unwrap());
    }
}

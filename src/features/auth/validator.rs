use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::model::{Actor, Role, Tier};
use crate::core::config::AuthConfig;
use crate::core::error::AppError;

/// Session-token claims. Role, tier and the active flag are supplied by the
/// identity collaborator at issue time; this service only validates and maps
/// them onto an [`Actor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    email: Option<String>,
    role: Role,
    tier: Tier,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    sid: Option<String>,
    iat: i64,
    exp: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    leeway: u64,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            token_ttl: config.token_ttl,
            leeway: config.jwt_leeway.as_secs(),
        }
    }

    /// Issue a bearer token for an actor. Session issue time is stamped here;
    /// the access gate later enforces its own freshness ceiling on `iat`.
    pub fn issue(&self, actor: &Actor) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: actor.id.clone(),
            email: actor.email.clone(),
            role: actor.role,
            tier: actor.tier,
            active: actor.is_active,
            sid: actor.session_id.clone(),
            iat: now.timestamp(),
            exp: (now
                + chrono::Duration::from_std(self.token_ttl)
                    .unwrap_or_else(|_| chrono::Duration::hours(8)))
            .timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Actor, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        let claims = data.claims;
        let session_issued_at = timestamp_to_datetime(claims.iat)?;

        Ok(Actor {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
            tier: claims.tier,
            is_active: claims.active,
            session_issued_at,
            session_id: claims.sid,
        })
    }
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| AppError::Auth("Invalid iat claim".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret!".to_string(),
            token_ttl: Duration::from_secs(3600),
            jwt_leeway: Duration::from_secs(0),
        }
    }

    fn test_actor() -> Actor {
        Actor {
            id: "actor-1".to_string(),
            email: Some("admin@example.com".to_string()),
            role: Role::Owner,
            tier: Tier::Enterprise,
            is_active: true,
            session_issued_at: Utc::now(),
            session_id: Some("sess-1".to_string()),
        }
    }

    #[test]
    fn issue_and_validate_round_trip() {
        let service = TokenService::new(&test_config());
        let token = service.issue(&test_actor()).unwrap();
        let actor = service.validate(&token).unwrap();

        assert_eq!(actor.id, "actor-1");
        assert_eq!(actor.role, Role::Owner);
        assert_eq!(actor.tier, Tier::Enterprise);
        assert!(actor.is_active);
        assert_eq!(actor.session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let service = TokenService::new(&test_config());
        let mut token = service.issue(&test_actor()).unwrap();
        token.push('x');

        assert!(matches!(
            service.validate(&token),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret-another-secret-anoth".to_string(),
            token_ttl: Duration::from_secs(3600),
            jwt_leeway: Duration::from_secs(0),
        });
        let service = TokenService::new(&test_config());

        let token = issuer.issue(&test_actor()).unwrap();
        assert!(service.validate(&token).is_err());
    }
}

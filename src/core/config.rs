use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub gate: GateConfig,
    pub vault: VaultConfig,
    pub rate_limits: RateLimitConfig,
    pub generation: GenerationConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub jwt_leeway: Duration,
}

/// Access-gate policy: IP allow-list, session-freshness ceiling, and the
/// subset of destructive operations that require a step-up one-time code.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub admin_ip_allowlist: Vec<String>,
    pub bypass_ip_check: bool,
    pub session_max_age: Duration,
    pub step_up_ops: Vec<String>,
}

#[derive(Clone)]
pub struct VaultConfig {
    pub master_secret: String,
    pub rotation_secret: String,
    pub max_envelope_age: Duration,
}

// Key material must never end up in logs.
impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_secret", &"<redacted>")
            .field("rotation_secret", &"<redacted>")
            .field("max_envelope_age", &self.max_envelope_age)
            .finish()
    }
}

/// Window/ceiling pair for one rate-limit class.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub window_ms: u64,
    pub max_count: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub general: RateLimitRule,
    pub auth: RateLimitRule,
    pub password_reset: RateLimitRule,
    pub generation: RateLimitRule,
    pub admin: RateLimitRule,
    pub destructive_admin: RateLimitRule,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
    pub max_history_messages: usize,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: String,
    pub version: String,
    pub description: String,
}

const MIN_SECRET_LEN: usize = 32;

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        let config = Config {
            app: AppConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            gate: GateConfig::from_env()?,
            vault: VaultConfig::from_env()?,
            rate_limits: RateLimitConfig::from_env()?,
            generation: GenerationConfig::from_env()?,
            swagger: SwaggerConfig::from_env()?,
        };
        config.validate_secrets()?;
        Ok(config)
    }

    /// Weak security keys abort startup. A bypassed IP allow-list is only
    /// tolerated outside production.
    fn validate_secrets(&self) -> Result<(), String> {
        for (name, secret) in [
            ("JWT_SECRET", &self.auth.jwt_secret),
            ("VAULT_MASTER_SECRET", &self.vault.master_secret),
            ("VAULT_ROTATION_SECRET", &self.vault.rotation_secret),
        ] {
            if secret.len() < MIN_SECRET_LEN {
                return Err(format!(
                    "{} must be at least {} characters",
                    name, MIN_SECRET_LEN
                ));
            }
        }

        if self.app.environment == "production" && self.gate.bypass_ip_check {
            return Err("GATE_BYPASS_IP_CHECK must not be set in production".to_string());
        }

        Ok(())
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port,
            environment,
            cors_allowed_origins,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    // Default values for database connection pool (conservative defaults for small-medium apps)
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MAX_CONNECTIONS must be a valid number".to_string())?;

        let min_connections = env::var("DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| Self::DEFAULT_MIN_CONNECTIONS.to_string())
            .parse::<u32>()
            .map_err(|_| "DB_MIN_CONNECTIONS must be a valid number".to_string())?;

        let acquire_timeout_secs = env::var("DB_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_ACQUIRE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_ACQUIRE_TIMEOUT_SECS must be a valid number".to_string())?;

        let idle_timeout_secs = env::var("DB_IDLE_TIMEOUT_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_IDLE_TIMEOUT_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_IDLE_TIMEOUT_SECS must be a valid number".to_string())?;

        let max_lifetime_secs = env::var("DB_MAX_LIFETIME_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_LIFETIME_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "DB_MAX_LIFETIME_SECS must be a valid number".to_string())?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            acquire_timeout_secs,
            idle_timeout_secs,
            max_lifetime_secs,
        })
    }
}

impl AuthConfig {
    const DEFAULT_TOKEN_TTL_SECS: u64 = 8 * 3600; // 8 hours
    const DEFAULT_JWT_LEEWAY_SECS: u64 = 60; // 1 minute

    pub fn from_env() -> Result<Self, String> {
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;

        let token_ttl_secs = env::var("TOKEN_TTL_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_TOKEN_TTL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "TOKEN_TTL_SECS must be a valid number".to_string())?;

        let jwt_leeway_secs = env::var("JWT_LEEWAY")
            .unwrap_or_else(|_| Self::DEFAULT_JWT_LEEWAY_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "JWT_LEEWAY must be a valid number".to_string())?;

        Ok(Self {
            jwt_secret,
            token_ttl: Duration::from_secs(token_ttl_secs),
            jwt_leeway: Duration::from_secs(jwt_leeway_secs),
        })
    }
}

impl GateConfig {
    const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 2 * 3600; // 2 hours
    const DEFAULT_STEP_UP_OPS: &'static str = "delete_definition";

    pub fn from_env() -> Result<Self, String> {
        let admin_ip_allowlist = env::var("ADMIN_IP_ALLOWLIST")
            .unwrap_or_else(|_| "127.0.0.1,::1".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let bypass_ip_check = env::var("GATE_BYPASS_IP_CHECK")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let session_max_age_secs = env::var("GATE_SESSION_MAX_AGE_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_SESSION_MAX_AGE_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "GATE_SESSION_MAX_AGE_SECS must be a valid number".to_string())?;

        let step_up_ops = env::var("GATE_STEP_UP_OPS")
            .unwrap_or_else(|_| Self::DEFAULT_STEP_UP_OPS.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            admin_ip_allowlist,
            bypass_ip_check,
            session_max_age: Duration::from_secs(session_max_age_secs),
            step_up_ops,
        })
    }
}

impl VaultConfig {
    const DEFAULT_MAX_ENVELOPE_AGE_SECS: u64 = 24 * 3600; // 24 hours

    pub fn from_env() -> Result<Self, String> {
        let master_secret = env::var("VAULT_MASTER_SECRET")
            .map_err(|_| "VAULT_MASTER_SECRET must be set".to_string())?;

        let rotation_secret = env::var("VAULT_ROTATION_SECRET")
            .map_err(|_| "VAULT_ROTATION_SECRET must be set".to_string())?;

        let max_envelope_age_secs = env::var("VAULT_MAX_ENVELOPE_AGE_SECS")
            .unwrap_or_else(|_| Self::DEFAULT_MAX_ENVELOPE_AGE_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| "VAULT_MAX_ENVELOPE_AGE_SECS must be a valid number".to_string())?;

        Ok(Self {
            master_secret,
            rotation_secret,
            max_envelope_age: Duration::from_secs(max_envelope_age_secs),
        })
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            general: Self::rule("RATE_GENERAL", 15 * 60 * 1000, 100)?,
            auth: Self::rule("RATE_AUTH", 15 * 60 * 1000, 5)?,
            password_reset: Self::rule("RATE_PASSWORD_RESET", 60 * 60 * 1000, 3)?,
            generation: Self::rule("RATE_GENERATION", 60 * 1000, 10)?,
            admin: Self::rule("RATE_ADMIN", 15 * 60 * 1000, 100)?,
            destructive_admin: Self::rule("RATE_DESTRUCTIVE_ADMIN", 60 * 60 * 1000, 10)?,
        })
    }

    fn rule(prefix: &str, default_window_ms: u64, default_max: u32) -> Result<RateLimitRule, String> {
        let window_ms = env::var(format!("{}_WINDOW_MS", prefix))
            .unwrap_or_else(|_| default_window_ms.to_string())
            .parse::<u64>()
            .map_err(|_| format!("{}_WINDOW_MS must be a valid number", prefix))?;
        let max_count = env::var(format!("{}_MAX", prefix))
            .unwrap_or_else(|_| default_max.to_string())
            .parse::<u32>()
            .map_err(|_| format!("{}_MAX must be a valid number", prefix))?;
        Ok(RateLimitRule {
            window_ms,
            max_count,
        })
    }
}

impl GenerationConfig {
    pub fn from_env() -> Result<Self, String> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| "ANTHROPIC_API_KEY must be set".to_string())?;

        let base_url = env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com".to_string());

        let default_model = env::var("GENERATION_DEFAULT_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

        let default_max_tokens = env::var("GENERATION_DEFAULT_MAX_TOKENS")
            .unwrap_or_else(|_| "4096".to_string())
            .parse::<u32>()
            .map_err(|_| "GENERATION_DEFAULT_MAX_TOKENS must be a valid number".to_string())?;

        let default_temperature = env::var("GENERATION_DEFAULT_TEMPERATURE")
            .unwrap_or_else(|_| "0.3".to_string())
            .parse::<f32>()
            .map_err(|_| "GENERATION_DEFAULT_TEMPERATURE must be a valid number".to_string())?;

        let max_history_messages = env::var("GENERATION_MAX_HISTORY_MESSAGES")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .map_err(|_| "GENERATION_MAX_HISTORY_MESSAGES must be a valid number".to_string())?;

        Ok(Self {
            api_key,
            base_url,
            default_model,
            default_max_tokens,
            default_temperature,
            max_history_messages,
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Result<Self, String> {
        // Only use credentials if they are non-empty
        let username = env::var("SWAGGER_USERNAME").ok().filter(|s| !s.is_empty());
        let password = env::var("SWAGGER_PASSWORD").ok().filter(|s| !s.is_empty());
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Sofer API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "API documentation for Sofer".to_string());

        Ok(Self {
            username,
            password,
            title,
            version,
            description,
        })
    }

    /// Returns credentials in "username:password" format if auth is enabled
    pub fn credentials(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(format!("{}:{}", user, pass)),
            _ => None,
        }
    }
}

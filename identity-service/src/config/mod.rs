use ipnetwork::IpNetwork;
use platform_core::config as core_config;
use platform_core::error::AppError;
use serde::Deserialize;
use std::env;
use uuid::Uuid;

use crate::models::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub mfa: MfaConfig,
    pub admin_gate: AdminGateConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    /// Organization assumed for legacy admin accounts whose identity record
    /// predates multi-tenancy and carries no org id.
    pub default_org_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of the session itself; access tokens referencing an expired
    /// session fail even when their own `exp` has not passed.
    pub session_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    /// Lifetime of client-contact portal (magic-link) tokens.
    pub portal_token_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MfaConfig {
    /// Issuer shown in authenticator apps.
    pub issuer: String,
    /// Roles for which the organization enforces a verified factor on
    /// privileged routes.
    pub enforced_roles: Vec<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminGateConfig {
    /// CIDR ranges allowed to reach privileged routes. Empty = gate open.
    pub ip_allowlist: Vec<IpNetwork>,
    /// Number of trusted reverse proxies appending to X-Forwarded-For.
    /// 0 = ignore the header entirely and use the socket address.
    pub trusted_proxy_hops: usize,
    /// Whether the process starts in read-only mode.
    pub read_only_default: bool,
    /// Upper bound for break-glass token TTLs.
    pub break_glass_max_ttl_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                access_token_ttl_minutes: parse_env("JWT_ACCESS_TOKEN_TTL_MINUTES", "15", is_prod)?,
            },
            session: SessionConfig {
                session_ttl_minutes: parse_env("SESSION_TTL_MINUTES", "720", is_prod)?,
                refresh_ttl_minutes: parse_env("REFRESH_TTL_MINUTES", "10080", is_prod)?,
                portal_token_ttl_minutes: parse_env("PORTAL_TOKEN_TTL_MINUTES", "60", is_prod)?,
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("identity-service"), is_prod)?,
                enforced_roles: parse_role_list(&get_env(
                    "MFA_ENFORCED_ROLES",
                    Some("owner,admin"),
                    is_prod,
                )?)?,
            },
            admin_gate: AdminGateConfig {
                ip_allowlist: parse_cidr_list(&get_env("ADMIN_IP_ALLOWLIST", Some(""), is_prod)?)?,
                trusted_proxy_hops: parse_env("TRUSTED_PROXY_HOPS", "0", is_prod)?,
                read_only_default: get_env("READ_ONLY_DEFAULT", Some("false"), is_prod)?
                    .parse()
                    .unwrap_or(false),
                break_glass_max_ttl_seconds: parse_env(
                    "BREAK_GLASS_MAX_TTL_SECONDS",
                    "3600",
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "5", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
            default_org_id: match env::var("DEFAULT_ORG_ID") {
                Ok(v) if !v.is_empty() => Some(v.parse().map_err(|e: uuid::Error| {
                    AppError::ConfigError(anyhow::anyhow!("DEFAULT_ORG_ID: {}", e))
                })?),
                _ => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_ttl_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_TTL_MINUTES must be positive"
            )));
        }

        if self.session.refresh_ttl_minutes < self.session.session_ttl_minutes {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TTL_MINUTES must not be shorter than SESSION_TTL_MINUTES"
            )));
        }

        if self.admin_gate.break_glass_max_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BREAK_GLASS_MAX_TTL_SECONDS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.jwt.secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 bytes in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

fn parse_role_list(raw: &str) -> Result<Vec<Role>, AppError> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))
        })
        .collect()
}

fn parse_cidr_list(raw: &str) -> Result<Vec<IpNetwork>, AppError> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|e: ipnetwork::IpNetworkError| {
                AppError::ConfigError(anyhow::anyhow!("ADMIN_IP_ALLOWLIST: {}", e))
            })
        })
        .collect()
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

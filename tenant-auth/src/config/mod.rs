use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fs;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs against the in-memory store (dev only).
    pub database: Option<DatabaseConfig>,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub password_reset_token_ttl_minutes: i64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// PEM encoded, PKCS#8 or PKCS#1.
    pub private_key: Secret<String>,
    /// PEM encoded, SPKI or PKCS#1.
    pub public_key: String,
    pub key_id: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_attempts: 5,
            login_window_seconds: 60,
            password_reset_attempts: 1,
            password_reset_window_seconds: 300,
            global_ip_limit: 100,
            global_ip_window_seconds: 60,
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let database = match env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url: Secret::new(url),
                max_connections: parse(
                    "DATABASE_MAX_CONNECTIONS",
                    get_env("DATABASE_MAX_CONNECTIONS", Some("10"), false)?,
                )?,
                min_connections: parse(
                    "DATABASE_MIN_CONNECTIONS",
                    get_env("DATABASE_MIN_CONNECTIONS", Some("1"), false)?,
                )?,
            }),
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )));
            }
            Err(_) => None,
        };

        let config = AuthConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("tenant-auth"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database,
            jwt: JwtConfig {
                private_key: Secret::new(resolve_key(
                    "JWT_PRIVATE_KEY",
                    env::var("JWT_PRIVATE_KEY").ok(),
                    env::var("JWT_PRIVATE_KEY_FILE").ok(),
                )?),
                public_key: resolve_key(
                    "JWT_PUBLIC_KEY",
                    env::var("JWT_PUBLIC_KEY").ok(),
                    env::var("JWT_PUBLIC_KEY_FILE").ok(),
                )?,
                key_id: get_env("JWT_KEY_ID", Some("key-1"), is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("solobueno-erp"), is_prod)?,
                audience: split_list(&get_env("JWT_AUDIENCE", Some("solobueno-api"), is_prod)?),
                access_token_expiry_minutes: parse(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    get_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", Some("60"), is_prod)?,
                )?,
                refresh_token_expiry_days: parse(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    get_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", Some("30"), is_prod)?,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
            },
            rate_limit: RateLimitConfig {
                login_attempts: parse(
                    "RATE_LIMIT_LOGIN_ATTEMPTS",
                    get_env("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                )?,
                login_window_seconds: parse(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    get_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", Some("60"), is_prod)?,
                )?,
                password_reset_attempts: parse(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    get_env("RATE_LIMIT_PASSWORD_RESET_ATTEMPTS", Some("1"), is_prod)?,
                )?,
                password_reset_window_seconds: parse(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    get_env("RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS", Some("300"), is_prod)?,
                )?,
                global_ip_limit: parse(
                    "RATE_LIMIT_GLOBAL_IP_LIMIT",
                    get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                )?,
                global_ip_window_seconds: parse(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    get_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", Some("60"), is_prod)?,
                )?,
            },
            password_reset_token_ttl_minutes: parse(
                "PASSWORD_RESET_TOKEN_TTL_MINUTES",
                get_env("PASSWORD_RESET_TOKEN_TTL_MINUTES", Some("60"), is_prod)?,
            )?,
            request_timeout_seconds: parse(
                "REQUEST_TIMEOUT_SECONDS",
                get_env("REQUEST_TIMEOUT_SECONDS", Some("30"), is_prod)?,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT must be greater than 0"));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(config_error("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(config_error("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"));
        }

        if self.password_reset_token_ttl_minutes <= 0 {
            return Err(config_error("PASSWORD_RESET_TOKEN_TTL_MINUTES must be positive"));
        }

        if self.jwt.issuer.trim().is_empty() {
            return Err(config_error("JWT_ISSUER must not be empty"));
        }

        if self.jwt.audience.is_empty() {
            return Err(config_error("JWT_AUDIENCE must list at least one audience"));
        }

        let limits = &self.rate_limit;
        if limits.login_attempts == 0
            || limits.password_reset_attempts == 0
            || limits.global_ip_limit == 0
        {
            return Err(config_error("Rate limit attempts must be greater than 0"));
        }

        if limits.login_window_seconds == 0
            || limits.password_reset_window_seconds == 0
            || limits.global_ip_window_seconds == 0
        {
            return Err(config_error("Rate limit windows must be greater than 0"));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(config_error("Wildcard CORS origin not allowed in production"));
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.to_string()))
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

fn parse<T>(key: &str, value: String) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e)))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Key material comes either inline (`KEY`) or from a file (`KEY_FILE`); inline wins.
pub fn resolve_key(
    key: &str,
    value: Option<String>,
    path: Option<String>,
) -> Result<String, AppError> {
    if let Some(pem) = value.filter(|v| !v.trim().is_empty()) {
        return Ok(pem);
    }

    match path.filter(|p| !p.trim().is_empty()) {
        Some(path) => fs::read_to_string(&path).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{}_FILE ({}) unreadable: {}", key, path, e))
        }),
        None => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} or {}_FILE must be set",
            key,
            key
        ))),
    }
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

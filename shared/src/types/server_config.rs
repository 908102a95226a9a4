use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Every route is mounted under this prefix, e.g. `/api/auth/login`.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Browser origin allowed to make credentialed CORS requests.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_db_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_access_minutes")]
    pub access_token_minutes: u64,
    #[serde(default = "default_refresh_days")]
    pub refresh_token_days: u64,
    /// Force the `Secure` attribute on the refresh cookie even when the
    /// request did not arrive over HTTPS.
    #[serde(default)]
    pub cookie_secure: bool,
    /// Permission code required to revoke another user's sessions.
    #[serde(default = "default_admin_permission")]
    pub admin_permission: String,
    /// HMAC key for access tokens. Prefer the `JWT_SECRET` env var.
    ///
    /// **Minimum length:** 32 characters.
    /// **Hot-reload safe:** NO — rotating it invalidates every access token.
    pub jwt_secret: Option<String>,
    /// HMAC key for refresh tokens. Prefer the `JWT_REFRESH_SECRET` env var.
    /// Must differ from `jwt_secret`.
    pub jwt_refresh_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:4000"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Prefix without a trailing slash; empty when mounted at the root.
    pub fn prefix(&self) -> &str {
        self.api_prefix.trim_end_matches('/')
    }

    /// Path the refresh cookie is scoped to, e.g. `/api/auth`.
    pub fn auth_path(&self) -> String {
        format!("{}/auth", self.prefix())
    }
}

impl AuthConfig {
    pub fn access_token_secs(&self) -> i64 {
        (self.access_token_minutes * 60) as i64
    }

    /// Refresh lifetime in seconds, also used as the cookie `Max-Age`.
    pub fn refresh_token_secs(&self) -> i64 {
        (self.refresh_token_days * 24 * 60 * 60) as i64
    }

    /// Resolve the access-token secret, `JWT_SECRET` taking priority over the
    /// config file field.
    pub fn resolved_jwt_secret(&self) -> Option<String> {
        resolve_secret("JWT_SECRET", self.jwt_secret.as_ref())
    }

    /// Resolve the refresh-token secret, `JWT_REFRESH_SECRET` taking priority
    /// over the config file field.
    pub fn resolved_refresh_secret(&self) -> Option<String> {
        resolve_secret("JWT_REFRESH_SECRET", self.jwt_refresh_secret.as_ref())
    }
}

fn resolve_secret(var: &str, fallback: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.cloned())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            api_prefix: default_api_prefix(),
            cors_origin: default_cors_origin(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_db_connections(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_minutes: default_access_minutes(),
            refresh_token_days: default_refresh_days(),
            cookie_secure: false,
            admin_permission: default_admin_permission(),
            jwt_secret: None,
            jwt_refresh_secret: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    4000
}

pub fn default_api_prefix() -> String {
    "/api".to_string()
}

pub fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

pub fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn default_database_url() -> String {
    "sqlite://casefile.db?mode=rwc".to_string()
}

pub fn default_db_connections() -> u32 {
    10
}

pub fn default_access_minutes() -> u64 {
    15
}

pub fn default_refresh_days() -> u64 {
    7
}

pub fn default_admin_permission() -> String {
    "USERS_MANAGE".to_string()
}

pub fn default_max_requests() -> u32 {
    300
}

pub fn default_window_secs() -> u64 {
    15 * 60
}

use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError};

pub const MIN_SECRET_LEN: usize = 32;

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let mut config: AppConfig = toml::from_str(&contents)?;

    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.is_empty() {
            debug!("DATABASE_URL overrides database.url");
            config.database.url = url;
        }
    }

    info!("Configuration loaded successfully");

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.access_token_minutes == 0 {
        return Err(ConfigError::InvalidConfig(
            "access_token_minutes must be greater than 0".into(),
        ));
    }

    if config.auth.refresh_token_days == 0 {
        return Err(ConfigError::InvalidConfig(
            "refresh_token_days must be greater than 0".into(),
        ));
    }

    if config.database.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "database.max_connections must be greater than 0".into(),
        ));
    }

    if !config.server.api_prefix.is_empty() && !config.server.api_prefix.starts_with('/') {
        return Err(ConfigError::InvalidConfig(
            "api_prefix must start with '/'".into(),
        ));
    }

    if config.rate_limit.max_requests == 0 || config.rate_limit.window_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "rate_limit.max_requests and rate_limit.window_secs must be greater than 0".into(),
        ));
    }

    validate_secrets(
        config.auth.resolved_jwt_secret(),
        config.auth.resolved_refresh_secret(),
    )
}

/// Both secrets must be resolvable, long enough, and distinct. Checked at load
/// time so a bad config fails at startup rather than at the first login.
pub fn validate_secrets(
    access: Option<String>,
    refresh: Option<String>,
) -> Result<(), ConfigError> {
    let access = access.ok_or_else(|| {
        ConfigError::InvalidConfig(
            "jwt_secret must be set via the JWT_SECRET env var or auth.jwt_secret".into(),
        )
    })?;
    let refresh = refresh.ok_or_else(|| {
        ConfigError::InvalidConfig(
            "jwt_refresh_secret must be set via the JWT_REFRESH_SECRET env var or auth.jwt_refresh_secret"
                .into(),
        )
    })?;

    if access.len() < MIN_SECRET_LEN || refresh.len() < MIN_SECRET_LEN {
        return Err(ConfigError::InvalidConfig(format!(
            "token secrets must be at least {} characters long",
            MIN_SECRET_LEN
        )));
    }

    if access == refresh {
        return Err(ConfigError::InvalidConfig(
            "access and refresh token secrets must be different".into(),
        ));
    }

    Ok(())
}

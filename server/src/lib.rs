//! Session and token service: credential verification, access/refresh token
//! codec, refresh-token store, session orchestration and the HTTP surface.

pub mod app;
pub mod auth;
pub mod cli;
pub mod database;
pub mod handlers;
pub mod security;
pub mod tower_middle;

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use shared::types::AppConfig;

use crate::auth::{Clock, SessionService, SystemClock, TokenCodec};

/// Shared by every request. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub sessions: SessionService,
}

impl AppState {
    pub fn new(config: AppConfig, db: SqlitePool) -> Result<Self> {
        Self::with_clock(config, db, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, db: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        let access_secret = config
            .auth
            .resolved_jwt_secret()
            .context("Access token secret is not configured")?;
        let refresh_secret = config
            .auth
            .resolved_refresh_secret()
            .context("Refresh token secret is not configured")?;

        let codec = TokenCodec::new(
            &access_secret,
            &refresh_secret,
            config.auth.access_token_secs(),
            config.auth.refresh_token_secs(),
            clock,
        )
        .context("Failed to build token codec")?;

        Ok(Self {
            sessions: SessionService::new(db.clone(), Arc::new(codec)),
            db,
            config: Arc::new(config),
        })
    }
}

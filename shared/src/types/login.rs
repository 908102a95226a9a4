use serde::{Deserialize, Serialize};

use crate::types::jwt::Principal;

// ---------------------------------------------------------------------------
// Login wire types
// ---------------------------------------------------------------------------

/// Body of `POST /auth/login`.
///
/// Both fields are optional at the serde level so a missing field becomes a
/// `400 MISSING_FIELD` rather than a generic parse failure.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoginData {
    #[serde(default, alias = "username")]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl LoginData {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }
}

/// Successful login / refresh body: `{ok: true, token, user}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub ok: bool,
    /// Signed access token. The refresh token travels only in the `rt` cookie.
    pub token: String,
    pub user: Principal,
}

impl SessionResponse {
    pub fn new(token: String, user: Principal) -> Self {
        Self {
            ok: true,
            token,
            user,
        }
    }
}

/// `GET /me` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub ok: bool,
    pub user: Principal,
}

/// Body of logout and revocation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub ok: bool,
    /// Number of refresh tokens revoked, present only for bulk revocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked: Option<u64>,
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Machine-readable codes carried in the `code` field of error bodies.
pub mod codes {
    pub const MISSING_FIELD: &str = "MISSING_FIELD";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const NO_REFRESH: &str = "NO_REFRESH";
    pub const BAD_REFRESH: &str = "BAD_REFRESH";
    pub const REFRESH_REVOKED: &str = "REFRESH_REVOKED";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Name of the HTTP-only cookie that carries the refresh token.
pub const REFRESH_COOKIE: &str = "rt";

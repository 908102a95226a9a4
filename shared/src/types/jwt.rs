use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The authenticated identity plus its roles and permissions, as of token
/// issuance.
///
/// Built at login/refresh time by joining the user row with its role
/// assignments and the (active) permissions granted through those roles.
/// It is never persisted; the access token is the only place it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl Principal {
    pub fn has_permission(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Which signing context a token was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims carried by a short-lived access token.
///
/// # Fast path
/// Every protected request decodes these and verifies the HMAC signature with
/// **zero DB reads**. A role or permission change only becomes visible after
/// the next refresh re-derives the principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(flatten)]
    pub principal: Principal,

    /// Always `TokenType::Access`.
    pub token_type: TokenType,

    /// Issued-at (Unix timestamp, seconds).
    pub iat: i64,

    /// Standard JWT expiry (Unix timestamp, seconds).
    pub exp: i64,
}

/// Claims carried by a long-lived refresh token.
///
/// Deliberately minimal: the principal is re-derived from the database on
/// every refresh, so nothing here can go stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: i64,

    /// Always `TokenType::Refresh`.
    pub token_type: TokenType,

    /// Random per-token id. Two refresh tokens minted for the same user in the
    /// same second must still hash to different store records.
    pub jti: String,

    pub iat: i64,
    pub exp: i64,
}

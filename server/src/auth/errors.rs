use hyper::StatusCode;
use thiserror::Error;

use shared::types::codes;

use super::codec::TokenError;

/// Every way a session operation can fail. Handlers turn these into JSON
/// bodies with `to_code` / `to_message`; internal detail stays in the logs.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing required field: {0}")]
    Validation(String),

    #[error("request body could not be parsed")]
    BadRequest,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("token missing")]
    MissingToken,

    #[error("token malformed")]
    MalformedToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("wrong token type")]
    WrongTokenType,

    #[error("refresh token revoked or expired")]
    RevokedToken,

    #[error("principal no longer active")]
    PrincipalInactive,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Malformed => AuthError::MalformedToken,
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::WrongType => AuthError::WrongTokenType,
            TokenError::Signing(e) => AuthError::Internal(e.into()),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::BadRequest => StatusCode::BAD_REQUEST,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Database(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn to_code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => codes::MISSING_FIELD,
            AuthError::BadRequest => codes::BAD_REQUEST,
            AuthError::InvalidCredentials => codes::INVALID_CREDENTIALS,
            AuthError::RevokedToken => codes::REFRESH_REVOKED,
            AuthError::Forbidden => codes::FORBIDDEN,
            AuthError::Database(_) | AuthError::Internal(_) => codes::INTERNAL_ERROR,
            AuthError::MissingToken
            | AuthError::MalformedToken
            | AuthError::ExpiredToken
            | AuthError::WrongTokenType
            | AuthError::PrincipalInactive => codes::UNAUTHORIZED,
        }
    }

    pub fn to_message(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "Email and password are required",
            AuthError::BadRequest => "Request body could not be parsed",
            AuthError::InvalidCredentials => "Invalid email or password",
            AuthError::RevokedToken => "Refresh token revoked or expired",
            AuthError::PrincipalInactive => "User is not active",
            AuthError::Forbidden => "Insufficient privileges",
            AuthError::Database(_) | AuthError::Internal(_) => "Internal server error",
            _ => "Authentication required",
        }
    }

    /// Code reported by the refresh endpoint. Token problems are split into
    /// "no cookie" and "bad cookie"; anything unexpected collapses into a
    /// generic 401 rather than a 500.
    pub fn refresh_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => codes::NO_REFRESH,
            AuthError::MalformedToken | AuthError::ExpiredToken | AuthError::WrongTokenType => {
                codes::BAD_REFRESH
            }
            AuthError::RevokedToken => codes::REFRESH_REVOKED,
            _ => codes::UNAUTHORIZED,
        }
    }

    pub fn refresh_message(&self) -> &'static str {
        match self.refresh_code() {
            codes::NO_REFRESH => "Refresh token required",
            codes::BAD_REFRESH => "Invalid refresh token",
            codes::REFRESH_REVOKED => "Refresh token revoked or expired",
            _ => match self {
                AuthError::PrincipalInactive => "User is not active",
                _ => "Could not refresh session",
            },
        }
    }

    /// True for errors that should be logged at `error!` rather than `warn!`.
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Database(_) | AuthError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_codes_split_missing_bad_and_revoked() {
        assert_eq!(AuthError::MissingToken.refresh_code(), codes::NO_REFRESH);
        assert_eq!(AuthError::MalformedToken.refresh_code(), codes::BAD_REFRESH);
        assert_eq!(AuthError::ExpiredToken.refresh_code(), codes::BAD_REFRESH);
        assert_eq!(AuthError::WrongTokenType.refresh_code(), codes::BAD_REFRESH);
        assert_eq!(AuthError::RevokedToken.refresh_code(), codes::REFRESH_REVOKED);
        assert_eq!(AuthError::PrincipalInactive.refresh_code(), codes::UNAUTHORIZED);
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).refresh_code(),
            codes::UNAUTHORIZED
        );
    }

    #[test]
    fn access_token_problems_are_generic_401s() {
        for e in [
            AuthError::MissingToken,
            AuthError::MalformedToken,
            AuthError::ExpiredToken,
            AuthError::WrongTokenType,
        ] {
            assert_eq!(e.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(e.to_code(), codes::UNAUTHORIZED);
        }
    }

    #[test]
    fn credential_failures_share_one_message() {
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InvalidCredentials.to_message(),
            "Invalid email or password"
        );
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let e = AuthError::Internal(anyhow::anyhow!("secret table name"));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.to_message().contains("secret"));
        assert!(e.is_internal());
    }

    #[test]
    fn token_errors_map_onto_auth_errors() {
        assert!(matches!(
            AuthError::from(TokenError::Expired),
            AuthError::ExpiredToken
        ));
        assert!(matches!(
            AuthError::from(TokenError::WrongType),
            AuthError::WrongTokenType
        ));
    }
}

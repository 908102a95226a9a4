use std::fmt;
use std::sync::Arc;

use anyhow::{Result, bail};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use shared::types::{AccessClaims, Principal, RefreshClaims, TokenType};

use super::clock::Clock;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token is malformed or its signature is invalid")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token is not of the expected type")]
    WrongType,

    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// A freshly signed refresh token together with the expiry that must be
/// persisted alongside its digest.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub jti: String,
    pub expires_at: i64,
}

struct SigningContext {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: i64,
}

impl SigningContext {
    fn new(secret: &str, lifetime: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }
}

// ---------------------------------------------------------------------------
// TokenCodec
// ---------------------------------------------------------------------------
//
// Two independent HS256 contexts. Access tokens carry the whole Principal,
// refresh tokens carry only the user id and a random jti. Because the secrets
// differ, a token from one context fails the other's signature check before
// its `token_type` is even looked at.

pub struct TokenCodec {
    access: SigningContext,
    refresh: SigningContext,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_lifetime", &self.access.lifetime)
            .field("refresh_lifetime", &self.refresh.lifetime)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_lifetime: i64,
        refresh_lifetime: i64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            bail!("token secrets must not be empty");
        }
        if access_secret == refresh_secret {
            bail!("access and refresh token secrets must be different");
        }
        if access_lifetime <= 0 || refresh_lifetime <= 0 {
            bail!("token lifetimes must be positive");
        }

        Ok(Self {
            access: SigningContext::new(access_secret, access_lifetime),
            refresh: SigningContext::new(refresh_secret, refresh_lifetime),
            clock,
        })
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn sign_access(&self, principal: &Principal) -> Result<String, TokenError> {
        let iat = self.clock.now();
        let claims = AccessClaims {
            principal: principal.clone(),
            token_type: TokenType::Access,
            iat,
            exp: iat + self.access.lifetime,
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.access.encoding,
        )?)
    }

    pub fn sign_refresh(&self, user_id: i64) -> Result<IssuedRefresh, TokenError> {
        let iat = self.clock.now();
        let claims = RefreshClaims {
            user_id,
            token_type: TokenType::Refresh,
            jti: Uuid::new_v4().to_string(),
            iat,
            exp: iat + self.refresh.lifetime,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.refresh.encoding,
        )?;
        Ok(IssuedRefresh {
            token,
            jti: claims.jti,
            expires_at: claims.exp,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh, TokenType::Refresh)
    }

    /// Signature first, then expiry against the injected clock (no leeway),
    /// then the `token_type` tag, then the typed claim shape.
    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        ctx: &SigningContext,
        expected: TokenType,
    ) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<Value>(token, &ctx.decoding, &validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            TokenError::Malformed
        })?;
        let claims = data.claims;

        let exp = claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(TokenError::Malformed)?;
        if exp <= self.clock.now() {
            return Err(TokenError::Expired);
        }

        let token_type = claims.get("token_type").cloned().unwrap_or(Value::Null);
        let expected_type = serde_json::to_value(expected).map_err(|_| TokenError::Malformed)?;
        if token_type != expected_type {
            return Err(TokenError::WrongType);
        }

        serde_json::from_value(claims).map_err(|e| {
            debug!("Token claims have an unexpected shape: {}", e);
            TokenError::Malformed
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use shared::types::{AccessClaims, LoginData, Principal};

use super::codec::TokenCodec;
use super::errors::AuthError;
use super::verifier::CredentialVerifier;
use crate::database::refresh_tokens;

/// Everything a successful login or refresh hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: i64,
    pub principal: Principal,
}

// ---------------------------------------------------------------------------
// SessionService
// ---------------------------------------------------------------------------
//
// Login, refresh (rotation), logout and bulk revocation. HTTP concerns
// (cookies, status codes) live in the handlers; this type only talks to the
// codec, the verifier and the refresh-token store.

#[derive(Debug, Clone)]
pub struct SessionService {
    db: SqlitePool,
    codec: Arc<TokenCodec>,
    verifier: CredentialVerifier,
}

impl SessionService {
    pub fn new(db: SqlitePool, codec: Arc<TokenCodec>) -> Self {
        Self {
            verifier: CredentialVerifier::new(db.clone()),
            db,
            codec,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub async fn login(&self, data: &LoginData) -> Result<IssuedSession, AuthError> {
        let email = data
            .email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let password = data.password.as_deref().filter(|s| !s.is_empty());

        let (Some(email), Some(password)) = (email, password) else {
            return Err(AuthError::Validation("email, password".to_string()));
        };

        let principal = self.verifier.verify(email, password).await?;
        let session = self.issue(principal).await?;

        info!("User {} logged in", session.principal.user_id);
        Ok(session)
    }

    /// Rotate the presented refresh token.
    ///
    /// The old record is consumed before the principal is re-derived, and a
    /// new record is only written once the principal is known to be active,
    /// so a failed refresh never leaves a live token behind.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<IssuedSession, AuthError> {
        let raw = presented
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self.codec.verify_refresh(raw)?;
        let user_id = claims.user_id;
        let now = self.codec.now();

        if refresh_tokens::find_valid(&self.db, user_id, raw, now)
            .await?
            .is_none()
        {
            warn!("Refresh rejected for user {}: record revoked or expired", user_id);
            return Err(AuthError::RevokedToken);
        }

        if !refresh_tokens::consume(&self.db, user_id, raw, now).await? {
            warn!("Refresh rejected for user {}: token already rotated", user_id);
            return Err(AuthError::RevokedToken);
        }

        let Some(principal) = self.verifier.load_principal(user_id).await? else {
            warn!("Refresh rejected: user {} is no longer active", user_id);
            return Err(AuthError::PrincipalInactive);
        };

        let session = self.issue(principal).await?;
        debug!("Refresh token rotated for user {}", user_id);
        Ok(session)
    }

    /// Best effort. A missing, unverifiable or unknown token is not an
    /// error; the caller clears the cookie either way. Returns whether a
    /// record was actually revoked.
    pub async fn logout(&self, presented: Option<&str>) -> bool {
        let Some(raw) = presented.filter(|t| !t.is_empty()) else {
            return false;
        };

        let claims = match self.codec.verify_refresh(raw) {
            Ok(claims) => claims,
            Err(e) => {
                debug!("Logout with unusable refresh token: {}", e);
                return false;
            }
        };

        match refresh_tokens::revoke(&self.db, claims.user_id, raw, self.codec.now()).await {
            Ok(revoked) => {
                if revoked {
                    info!("User {} logged out", claims.user_id);
                }
                revoked
            }
            Err(e) => {
                warn!("Failed to revoke refresh token on logout: {}", e);
                false
            }
        }
    }

    /// Revoke every outstanding refresh token of `user_id`.
    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, AuthError> {
        let revoked = refresh_tokens::revoke_all(&self.db, user_id, self.codec.now()).await?;
        info!("Revoked {} refresh token(s) for user {}", revoked, user_id);
        Ok(revoked)
    }

    pub async fn active_sessions(&self, user_id: i64) -> Result<i64, AuthError> {
        Ok(refresh_tokens::active_count(&self.db, user_id, self.codec.now()).await?)
    }

    /// Stateless access-token check used by protected routes.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        Ok(self.codec.verify_access(token)?)
    }

    async fn issue(&self, principal: Principal) -> Result<IssuedSession, AuthError> {
        let refresh = self.codec.sign_refresh(principal.user_id)?;
        refresh_tokens::save(
            &self.db,
            principal.user_id,
            &refresh.token,
            refresh.expires_at,
            self.codec.now(),
        )
        .await?;

        let access_token = self.codec.sign_access(&principal)?;

        Ok(IssuedSession {
            access_token,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
            principal,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::database::{accounts, connect_in_memory, create_tables, utils};

    const START: i64 = 1_700_000_000;

    struct Fixture {
        service: SessionService,
        clock: Arc<ManualClock>,
        db: SqlitePool,
        user_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = connect_in_memory().await.unwrap();
        create_tables(&db).await.unwrap();
        let hash = utils::hash_password("secret").unwrap();
        let user_id = accounts::create_user(&db, "Alice", "a@x.com", &hash, START)
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(START));
        let codec = TokenCodec::new(
            "access-secret-access-secret-access-secret",
            "refresh-secret-refresh-secret-refresh-secret",
            900,
            604_800,
            clock.clone(),
        )
        .unwrap();

        Fixture {
            service: SessionService::new(db.clone(), Arc::new(codec)),
            clock,
            db,
            user_id,
        }
    }

    fn creds(email: &str, password: &str) -> LoginData {
        LoginData::new(email, password)
    }

    #[tokio::test]
    async fn login_issues_both_tokens_and_persists_refresh() {
        let f = fixture().await;
        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();

        assert!(!s.access_token.is_empty());
        assert_eq!(s.principal.email, "a@x.com");
        assert_eq!(s.refresh_expires_at, START + 604_800);
        assert_eq!(f.service.active_sessions(f.user_id).await.unwrap(), 1);

        let claims = f.service.verify_access(&s.access_token).unwrap();
        assert_eq!(claims.principal, s.principal);
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let f = fixture().await;
        for data in [creds("", "secret"), creds("a@x.com", ""), LoginData::default()] {
            assert!(matches!(
                f.service.login(&data).await,
                Err(AuthError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn login_with_wrong_password_fails() {
        let f = fixture().await;
        assert!(matches!(
            f.service.login(&creds("a@x.com", "nope")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(f.service.active_sessions(f.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_is_single_use() {
        let f = fixture().await;
        let first = f.service.login(&creds("a@x.com", "secret")).await.unwrap();

        let second = f.service.refresh(Some(&first.refresh_token)).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_eq!(second.principal, first.principal);

        assert!(matches!(
            f.service.refresh(Some(&first.refresh_token)).await,
            Err(AuthError::RevokedToken)
        ));
        assert!(f.service.refresh(Some(&second.refresh_token)).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_without_token_is_missing() {
        let f = fixture().await;
        assert!(matches!(
            f.service.refresh(None).await,
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            f.service.refresh(Some("")).await,
            Err(AuthError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn refresh_with_access_token_is_rejected() {
        let f = fixture().await;
        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        let err = f.service.refresh(Some(&s.access_token)).await.unwrap_err();
        assert_eq!(err.refresh_code(), shared::types::codes::BAD_REFRESH);
    }

    #[tokio::test]
    async fn expired_refresh_token_is_bad_refresh() {
        let f = fixture().await;
        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        f.clock.advance(604_800);
        assert!(matches!(
            f.service.refresh(Some(&s.refresh_token)).await,
            Err(AuthError::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn refresh_after_logout_is_revoked() {
        let f = fixture().await;
        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        assert!(f.service.logout(Some(&s.refresh_token)).await);
        assert!(matches!(
            f.service.refresh(Some(&s.refresh_token)).await,
            Err(AuthError::RevokedToken)
        ));
    }

    #[tokio::test]
    async fn refresh_for_deactivated_user_leaves_no_live_token() {
        let f = fixture().await;
        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        accounts::set_user_active(&f.db, f.user_id, false).await.unwrap();

        assert!(matches!(
            f.service.refresh(Some(&s.refresh_token)).await,
            Err(AuthError::PrincipalInactive)
        ));
        assert_eq!(f.service.active_sessions(f.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn logout_swallows_every_failure() {
        let f = fixture().await;
        assert!(!f.service.logout(None).await);
        assert!(!f.service.logout(Some("garbage")).await);

        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        assert!(f.service.logout(Some(&s.refresh_token)).await);
        assert!(!f.service.logout(Some(&s.refresh_token)).await);
    }

    #[tokio::test]
    async fn revoke_all_kills_every_device() {
        let f = fixture().await;
        let a = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        let b = f.service.login(&creds("a@x.com", "secret")).await.unwrap();

        assert_eq!(f.service.revoke_all(f.user_id).await.unwrap(), 2);
        for s in [a, b] {
            assert!(matches!(
                f.service.refresh(Some(&s.refresh_token)).await,
                Err(AuthError::RevokedToken)
            ));
        }
    }

    #[tokio::test]
    async fn access_token_expires_after_its_lifetime() {
        let f = fixture().await;
        let s = f.service.login(&creds("a@x.com", "secret")).await.unwrap();
        f.clock.advance(899);
        assert!(f.service.verify_access(&s.access_token).is_ok());
        f.clock.advance(1);
        assert!(matches!(
            f.service.verify_access(&s.access_token),
            Err(AuthError::ExpiredToken)
        ));
    }
}

use std::sync::OnceLock;

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use shared::types::Principal;

use super::errors::AuthError;
use crate::database::{accounts, utils};

/// Read-only check of email + password against the stored Argon2 hash.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    db: SqlitePool,
}

impl CredentialVerifier {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Unknown email, inactive account and wrong password all fail with the
    /// same `InvalidCredentials`, and all three pay for one Argon2 check.
    pub async fn verify(&self, email: &str, password: &str) -> Result<Principal, AuthError> {
        let email = utils::normalize_email(email);
        let user = accounts::get_user_auth_by_email(&self.db, &email).await?;

        let stored_hash = match &user {
            Some(user) if user.active => Some(user.password_hash.clone()),
            Some(user) => {
                debug!("Login attempt for inactive account {}", user.id);
                None
            }
            None => {
                debug!("Login attempt for unknown account");
                None
            }
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => utils::verify_password(&hash, &password),
            None => {
                if let Some(dummy) = dummy_hash() {
                    let _ = utils::verify_password(dummy, &password);
                }
                Ok(false)
            }
        })
        .await
        .context("Password verification task failed")?;

        let Some(user) = user.filter(|u| u.active) else {
            return Err(AuthError::InvalidCredentials);
        };

        match matches {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::InvalidCredentials),
            Err(e) => {
                warn!("Stored password hash for user {} is unusable: {}", user.id, e);
                return Err(AuthError::InvalidCredentials);
            }
        }

        self.principal_for(user.id, user.name, user.email).await
    }

    /// Current principal for `user_id`, or `None` if the account is gone or
    /// inactive.
    pub async fn load_principal(&self, user_id: i64) -> Result<Option<Principal>, AuthError> {
        match accounts::get_user_by_id(&self.db, user_id).await? {
            Some(user) if user.active => Ok(Some(
                self.principal_for(user.id, user.name, user.email).await?,
            )),
            _ => Ok(None),
        }
    }

    async fn principal_for(
        &self,
        user_id: i64,
        name: String,
        email: String,
    ) -> Result<Principal, AuthError> {
        let roles = accounts::get_user_roles(&self.db, user_id).await?;
        let permissions = accounts::get_user_permissions(&self.db, user_id).await?;

        Ok(Principal {
            user_id,
            name,
            email,
            roles: roles.into_iter().collect(),
            permissions: permissions.into_iter().collect(),
        })
    }
}

/// Argon2 hash with the same parameters as real accounts, checked when the
/// account is unknown or inactive. Built on first use.
pub(crate) fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| utils::hash_password("no-such-account").ok())
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{connect_in_memory, create_tables};

    async fn setup() -> (CredentialVerifier, i64) {
        let pool = connect_in_memory().await.unwrap();
        create_tables(&pool).await.unwrap();
        let hash = utils::hash_password("secret").unwrap();
        let uid = accounts::create_user(&pool, "Alice", "a@x.com", &hash, 0)
            .await
            .unwrap();
        let role = accounts::ensure_role(&pool, "ADMIN").await.unwrap();
        accounts::assign_role(&pool, uid, role).await.unwrap();
        let perm = accounts::ensure_permission(&pool, "USERS_MANAGE").await.unwrap();
        accounts::grant_permission(&pool, role, perm).await.unwrap();
        (CredentialVerifier::new(pool), uid)
    }

    #[tokio::test]
    async fn correct_password_yields_principal() {
        let (verifier, uid) = setup().await;
        let p = verifier.verify("a@x.com", "secret").await.unwrap();
        assert_eq!(p.user_id, uid);
        assert_eq!(p.email, "a@x.com");
        assert!(p.has_role("ADMIN"));
        assert!(p.has_permission("USERS_MANAGE"));
    }

    #[tokio::test]
    async fn email_lookup_ignores_case_and_whitespace() {
        let (verifier, _) = setup().await;
        assert!(verifier.verify(" A@X.COM ", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_fail_identically() {
        let (verifier, _) = setup().await;
        let wrong = verifier.verify("a@x.com", "nope").await.unwrap_err();
        let unknown = verifier.verify("b@x.com", "secret").await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_message(), unknown.to_message());
    }

    #[tokio::test]
    async fn inactive_user_cannot_log_in_or_load() {
        let (verifier, uid) = setup().await;
        accounts::set_user_active(&verifier.db, uid, false).await.unwrap();
        assert!(matches!(
            verifier.verify("a@x.com", "secret").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(verifier.load_principal(uid).await.unwrap().is_none());
    }

    #[test]
    fn dummy_hash_is_a_real_argon2_hash() {
        let dummy = dummy_hash().unwrap();
        assert!(dummy.starts_with("$argon2id$"));
        assert!(!utils::verify_password(dummy, "secret").unwrap());
    }

    #[tokio::test]
    async fn unknown_account_costs_as_much_as_wrong_password() {
        let (verifier, _) = setup().await;
        // Warm up both paths.
        let _ = verifier.verify("a@x.com", "nope").await;
        let _ = verifier.verify("ghost@x.com", "nope").await;

        let started = std::time::Instant::now();
        let _ = verifier.verify("a@x.com", "nope").await;
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        let _ = verifier.verify("ghost@x.com", "nope").await;
        let unknown = started.elapsed();

        assert!(
            unknown * 4 >= wrong_password,
            "unknown account took {:?}, wrong password {:?}",
            unknown,
            wrong_password
        );
    }

    #[tokio::test]
    async fn unparseable_hash_is_invalid_credentials() {
        let pool = connect_in_memory().await.unwrap();
        create_tables(&pool).await.unwrap();
        accounts::create_user(&pool, "B", "b@x.com", "plaintext", 0)
            .await
            .unwrap();
        let verifier = CredentialVerifier::new(pool);
        assert!(matches!(
            verifier.verify("b@x.com", "plaintext").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn load_principal_reflects_current_grants() {
        let (verifier, uid) = setup().await;
        accounts::set_permission_active(&verifier.db, "USERS_MANAGE", false)
            .await
            .unwrap();
        let p = verifier.load_principal(uid).await.unwrap().unwrap();
        assert!(!p.has_permission("USERS_MANAGE"));
        assert!(verifier.load_principal(uid + 50).await.unwrap().is_none());
    }
}

use sqlx::SqlitePool;

use super::utils::token_digest;

/// Persisted refresh-token record. `expires_at` is `None` when the stored
/// value is not an integer; such a row is never valid.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub revoked_at: Option<i64>,
}

impl RefreshTokenRecord {
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_some_and(|exp| exp > now)
    }
}

/// Store a new record for `raw_token`. Only the digest is written.
pub async fn save(
    pool: &SqlitePool,
    user_id: i64,
    raw_token: &str,
    expires_at: i64,
    now: i64,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        "INSERT INTO refresh_tokens (user_id, token_hash, created_at, expires_at, revoked_at)
         VALUES (?, ?, ?, ?, NULL)",
    )
    .bind(user_id)
    .bind(token_digest(raw_token))
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// The record for `(user_id, raw_token)` if it is not revoked and not expired.
pub async fn find_valid(
    pool: &SqlitePool,
    user_id: i64,
    raw_token: &str,
    now: i64,
) -> sqlx::Result<Option<RefreshTokenRecord>> {
    let record = sqlx::query_as::<_, RefreshTokenRecord>(
        "SELECT id, user_id, token_hash, created_at,
                CASE WHEN typeof(expires_at) = 'integer' THEN expires_at END AS expires_at,
                revoked_at
         FROM refresh_tokens
         WHERE user_id = ? AND token_hash = ? AND revoked_at IS NULL
         ORDER BY id DESC
         LIMIT 1",
    )
    .bind(user_id)
    .bind(token_digest(raw_token))
    .fetch_optional(pool)
    .await?;

    Ok(record.filter(|r| r.is_valid_at(now)))
}

/// Mark the matching record revoked. Returns whether a row changed; an
/// unknown or already revoked token is a no-op.
pub async fn revoke(
    pool: &SqlitePool,
    user_id: i64,
    raw_token: &str,
    now: i64,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ?
         WHERE user_id = ? AND token_hash = ? AND revoked_at IS NULL",
    )
    .bind(now)
    .bind(user_id)
    .bind(token_digest(raw_token))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Compare-and-set used by rotation: revokes the record only while it is
/// still valid. Of two requests presenting the same token, exactly one sees
/// `true`.
pub async fn consume(
    pool: &SqlitePool,
    user_id: i64,
    raw_token: &str,
    now: i64,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ?
         WHERE user_id = ? AND token_hash = ?
           AND revoked_at IS NULL
           AND typeof(expires_at) = 'integer'
           AND expires_at > ?",
    )
    .bind(now)
    .bind(user_id)
    .bind(token_digest(raw_token))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Revoke every outstanding record of the user. Returns how many changed.
pub async fn revoke_all(pool: &SqlitePool, user_id: i64, now: i64) -> sqlx::Result<u64> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
    )
    .bind(now)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Number of currently valid records for the user.
pub async fn active_count(pool: &SqlitePool, user_id: i64, now: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM refresh_tokens
         WHERE user_id = ?
           AND revoked_at IS NULL
           AND typeof(expires_at) = 'integer'
           AND expires_at > ?",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await
}

use sqlx::SqlitePool;

/// Row the credential verifier needs to check a login.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserAuth {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub active: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub created_at: i64,
}

/// Get authentication data by (normalized) email
pub async fn get_user_auth_by_email(
    pool: &SqlitePool,
    email: &str,
) -> sqlx::Result<Option<UserAuth>> {
    sqlx::query_as::<_, UserAuth>(
        "SELECT id, name, email, password_hash, active FROM users WHERE email = ? LIMIT 1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn get_user_by_id(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Option<UserRecord>> {
    sqlx::query_as::<_, UserRecord>(
        "SELECT id, name, email, active, created_at FROM users WHERE id = ? LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Role names assigned to the user.
pub async fn get_user_roles(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT r.name
         FROM user_roles ur
         JOIN roles r ON r.id = ur.role_id
         WHERE ur.user_id = ?",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Distinct active permission codes reachable through the user's roles.
pub async fn get_user_permissions(pool: &SqlitePool, user_id: i64) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT p.code
         FROM user_roles ur
         JOIN role_permissions rp ON rp.role_id = ur.role_id
         JOIN permissions p ON p.id = rp.permission_id
         WHERE ur.user_id = ? AND p.active = 1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Provisioning (CLI and tests)
// ---------------------------------------------------------------------------

/// Insert a user and return its id. `email` is stored as given; callers
/// normalize it first.
pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
    created_at: i64,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        "INSERT INTO users (name, email, password_hash, active, created_at)
         VALUES (?, ?, ?, 1, ?)",
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn set_user_active(pool: &SqlitePool, user_id: i64, active: bool) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE users SET active = ? WHERE id = ?")
        .bind(active)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Get or create a role by name.
pub async fn ensure_role(pool: &SqlitePool, name: &str) -> sqlx::Result<i64> {
    sqlx::query("INSERT INTO roles (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .execute(pool)
        .await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM roles WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
}

pub async fn assign_role(pool: &SqlitePool, user_id: i64, role_id: i64) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Get or create a permission by code. New permissions are active.
pub async fn ensure_permission(pool: &SqlitePool, code: &str) -> sqlx::Result<i64> {
    sqlx::query("INSERT INTO permissions (code, active) VALUES (?, 1) ON CONFLICT(code) DO NOTHING")
        .bind(code)
        .execute(pool)
        .await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM permissions WHERE code = ?")
        .bind(code)
        .fetch_one(pool)
        .await
}

pub async fn grant_permission(
    pool: &SqlitePool,
    role_id: i64,
    permission_id: i64,
) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(permission_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_permission_active(pool: &SqlitePool, code: &str, active: bool) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE permissions SET active = ? WHERE code = ?")
        .bind(active)
        .bind(code)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{connect_in_memory, create_tables};

    async fn pool() -> SqlitePool {
        let pool = connect_in_memory().await.unwrap();
        create_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_and_lookup_user() {
        let pool = pool().await;
        let id = create_user(&pool, "Alice", "a@x.com", "hash", 10).await.unwrap();

        let auth = get_user_auth_by_email(&pool, "a@x.com").await.unwrap().unwrap();
        assert_eq!(auth.id, id);
        assert!(auth.active);
        assert_eq!(auth.password_hash, "hash");

        let user = get_user_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.created_at, 10);

        assert!(get_user_auth_by_email(&pool, "b@x.com").await.unwrap().is_none());
        assert!(get_user_by_id(&pool, id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let pool = pool().await;
        create_user(&pool, "A", "a@x.com", "h", 0).await.unwrap();
        assert!(create_user(&pool, "B", "a@x.com", "h", 0).await.is_err());
    }

    #[tokio::test]
    async fn permissions_are_distinct_and_only_active() {
        let pool = pool().await;
        let uid = create_user(&pool, "A", "a@x.com", "h", 0).await.unwrap();

        let agent = ensure_role(&pool, "AGENT").await.unwrap();
        let lead = ensure_role(&pool, "LEAD").await.unwrap();
        assign_role(&pool, uid, agent).await.unwrap();
        assign_role(&pool, uid, lead).await.unwrap();

        let read = ensure_permission(&pool, "CASES_READ").await.unwrap();
        let export = ensure_permission(&pool, "CASES_EXPORT").await.unwrap();
        grant_permission(&pool, agent, read).await.unwrap();
        grant_permission(&pool, lead, read).await.unwrap();
        grant_permission(&pool, lead, export).await.unwrap();

        let mut perms = get_user_permissions(&pool, uid).await.unwrap();
        perms.sort();
        assert_eq!(perms, vec!["CASES_EXPORT", "CASES_READ"]);

        assert!(set_permission_active(&pool, "CASES_EXPORT", false).await.unwrap());
        assert_eq!(get_user_permissions(&pool, uid).await.unwrap(), vec!["CASES_READ"]);

        let mut roles = get_user_roles(&pool, uid).await.unwrap();
        roles.sort();
        assert_eq!(roles, vec!["AGENT", "LEAD"]);
    }

    #[tokio::test]
    async fn ensure_role_is_idempotent() {
        let pool = pool().await;
        let a = ensure_role(&pool, "ADMIN").await.unwrap();
        let b = ensure_role(&pool, "ADMIN").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn deactivate_user() {
        let pool = pool().await;
        let uid = create_user(&pool, "A", "a@x.com", "h", 0).await.unwrap();
        assert!(set_user_active(&pool, uid, false).await.unwrap());
        assert!(!get_user_by_id(&pool, uid).await.unwrap().unwrap().active);
        assert!(!set_user_active(&pool, uid + 100, false).await.unwrap());
    }
}

use sqlx::SqlitePool;
use tracing::info;

/// Current schema version. Bump this whenever the schema changes and add a
/// corresponding arm in `run_migrations`.
const SCHEMA_VERSION: i64 = 1;

/// Initialize the database schema and run any pending migrations.
pub async fn create_tables(pool: &SqlitePool) -> sqlx::Result<()> {
    create_schema(pool).await?;
    run_migrations(pool).await?;
    Ok(())
}

async fn create_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    // Identity tables. The verifier only reads these; the CLI provisions them.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT    NOT NULL,
            email         TEXT    NOT NULL UNIQUE,
            password_hash TEXT    NOT NULL,
            active        INTEGER NOT NULL DEFAULT 1,
            created_at    INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS roles (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT    NOT NULL UNIQUE
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_roles (
            user_id INTEGER NOT NULL,
            role_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, role_id),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS permissions (
            id     INTEGER PRIMARY KEY AUTOINCREMENT,
            code   TEXT    NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS role_permissions (
            role_id       INTEGER NOT NULL,
            permission_id INTEGER NOT NULL,
            PRIMARY KEY (role_id, permission_id),
            FOREIGN KEY (role_id)       REFERENCES roles(id)       ON DELETE CASCADE,
            FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
        )",
    )
    .execute(pool)
    .await?;

    // Refresh tokens: only the SHA-256 digest is stored, rows are revoked
    // and never deleted.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS refresh_tokens (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id    INTEGER NOT NULL,
            token_hash TEXT    NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            revoked_at INTEGER,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        )",
    )
    .execute(pool)
    .await?;

    // --- Indexes --------------------------------------------------------
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_lookup ON refresh_tokens(user_id, token_hash)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_roles_user ON user_roles(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_role_permissions_role ON role_permissions(role_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Highest version recorded in `schema_version`, 0 for a fresh database.
pub async fn current_version(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
}

/// Apply any schema migrations required to reach `SCHEMA_VERSION`.
async fn run_migrations(pool: &SqlitePool) -> sqlx::Result<()> {
    let current = current_version(pool).await?;

    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Database schema at version {}; target version {}",
        current, SCHEMA_VERSION
    );

    // v0 -> v1 is the initial schema created above.
    sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
        .bind(SCHEMA_VERSION)
        .bind(super::utils::get_timestamp())
        .execute(pool)
        .await?;

    info!("Schema version set to {}.", SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::connect_in_memory;

    #[tokio::test]
    async fn create_tables_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        create_tables(&pool).await.unwrap();
        create_tables(&pool).await.unwrap();

        assert_eq!(current_version(&pool).await.unwrap(), SCHEMA_VERSION);
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn all_tables_exist() {
        let pool = connect_in_memory().await.unwrap();
        create_tables(&pool).await.unwrap();

        for table in [
            "users",
            "roles",
            "user_roles",
            "permissions",
            "role_permissions",
            "refresh_tokens",
            "schema_version",
        ] {
            let found: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(found, 1, "missing table {}", table);
        }
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::AppState;
use server::cli::{Cli, Commands};
use server::database::{self, accounts, utils};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("server=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = shared::config::load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    let pool = database::connect(&config.database).await?;
    database::create_tables(&pool)
        .await
        .context("Failed to create database schema")?;

    let state = AppState::new(config, pool)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            server::app::serve(state).await?;
            info!("Server closed");
        }
        Commands::CreateUser {
            email,
            name,
            password,
            roles,
            grants,
        } => {
            let user_id = create_user(&state, &email, &name, &password, &roles, &grants).await?;
            println!("Created user {} ({})", user_id, utils::normalize_email(&email));
        }
        Commands::RevokeSessions { user_id } => {
            let revoked = state
                .sessions
                .revoke_all(user_id)
                .await
                .context("Failed to revoke sessions")?;
            let remaining = state
                .sessions
                .active_sessions(user_id)
                .await
                .context("Failed to count sessions")?;
            println!(
                "Revoked {} refresh token(s) for user {}; {} still active",
                revoked, user_id, remaining
            );
        }
    }

    Ok(())
}

async fn create_user(
    state: &AppState,
    email: &str,
    name: &str,
    password: &str,
    roles: &[String],
    grants: &[String],
) -> Result<i64> {
    let email = utils::normalize_email(email);
    if email.is_empty() || password.is_empty() {
        anyhow::bail!("email and password must not be empty");
    }

    let hash = utils::hash_password(password)?;
    let user_id = accounts::create_user(&state.db, name, &email, &hash, utils::get_timestamp())
        .await
        .with_context(|| format!("Failed to create user {}", email))?;

    for role in roles {
        let role_id = accounts::ensure_role(&state.db, role).await?;
        accounts::assign_role(&state.db, user_id, role_id).await?;
        for code in grants {
            let permission_id = accounts::ensure_permission(&state.db, code).await?;
            accounts::grant_permission(&state.db, role_id, permission_id).await?;
        }
    }

    info!("Provisioned user {} with roles {:?}", user_id, roles);
    Ok(user_id)
}

use clap::{Parser, Subcommand};

/// Session service: login, rotating refresh tokens and revocation
#[derive(Parser, Debug)]
#[command(name = "server", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "config.toml", env = "SERVER_CONFIG")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Provision an account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "NEW_USER_PASSWORD")]
        password: String,
        /// Role to assign; repeat or comma-separate for several
        #[arg(long = "role", value_delimiter = ',')]
        roles: Vec<String>,
        /// Permission codes granted to every role given with --role
        #[arg(long = "grant", value_delimiter = ',')]
        grants: Vec<String>,
    },

    /// Revoke every refresh token of a user
    RevokeSessions {
        #[arg(long)]
        user_id: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["server"]).unwrap();
        assert_eq!(cli.config, "config.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn create_user_collects_roles_and_grants() {
        let cli = Cli::try_parse_from([
            "server",
            "--config",
            "prod.toml",
            "create-user",
            "--email",
            "a@x.com",
            "--name",
            "Alice",
            "--password",
            "secret",
            "--role",
            "ADMIN,AGENT",
            "--grant",
            "USERS_MANAGE",
        ])
        .unwrap();
        assert_eq!(cli.config, "prod.toml");
        match cli.command {
            Some(Commands::CreateUser { roles, grants, .. }) => {
                assert_eq!(roles, vec!["ADMIN", "AGENT"]);
                assert_eq!(grants, vec!["USERS_MANAGE"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn revoke_sessions_requires_user_id() {
        assert!(Cli::try_parse_from(["server", "revoke-sessions"]).is_err());
        let cli = Cli::try_parse_from(["server", "revoke-sessions", "--user-id", "4"]).unwrap();
        assert_eq!(cli.command, Some(Commands::RevokeSessions { user_id: 4 }));
    }
}

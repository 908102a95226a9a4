pub mod json_error;
pub mod jwt;
pub mod login;
pub mod server_config;

pub use self::json_error::ErrorResponse;
pub use self::jwt::{AccessClaims, Principal, RefreshClaims, TokenType};
pub use self::login::{LoginData, LogoutResponse, MeResponse, REFRESH_COOKIE, SessionResponse, codes};
pub use self::server_config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, RateLimitConfig, ServerConfig,
};

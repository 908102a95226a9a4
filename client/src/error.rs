use thiserror::Error;

/// Everything an `ApiClient` call can fail with.
///
/// String payloads keep the type `Clone`, so one refresh outcome can be handed
/// to every request waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success response carrying the server's `{code, message}` body.
    #[error("HTTP {status} {code}: {message}")]
    Http {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The refresh token was rejected. Terminal until the next login.
    #[error("Session expired")]
    SessionExpired,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Server error code, when this is an HTTP error.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Http { code, .. } => Some(code),
            _ => None,
        }
    }
}

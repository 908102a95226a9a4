use serde::{Deserialize, Serialize};

/// Standard error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            ok: false,
            status: "error".to_string(),
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

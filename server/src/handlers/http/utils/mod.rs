pub mod headers;
pub mod http;
pub mod json_response;

// Re-export commonly used utilities
pub use headers::*;
pub use http::*;
pub use json_response::*;

//! HTTP client for the session server.
//!
//! `ApiClient` attaches the access token to every request and, on a 401,
//! performs a single shared refresh before replaying the request.

pub mod coordinator;
pub mod error;
pub mod session;
pub mod transport;

pub use coordinator::ApiClient;
pub use error::ClientError;
pub use session::{SessionEvent, SessionStore};
pub use transport::{ApiRequest, ApiResponse, CookieJar, HyperTransport, Transport};

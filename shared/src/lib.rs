//! Types shared by the session server and its HTTP client: the principal and
//! token claims, the auth wire bodies, and the configuration model.

pub mod config;
pub mod types;

/// Tower middleware module
///
/// Layers that sit in front of the router in the connection pipeline.
pub mod tower_rate_limiter;

pub use tower_rate_limiter::{RateLimiterLayer, RateLimiterService};

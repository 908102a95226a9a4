pub mod clock;
pub mod codec;
pub mod errors;
pub mod session;
pub mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{IssuedRefresh, TokenCodec, TokenError};
pub use errors::AuthError;
pub use session::{IssuedSession, SessionService};
pub use verifier::CredentialVerifier;

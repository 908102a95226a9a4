pub mod login;
pub mod logout;
pub mod refresh;

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::Request;
use hyper::header::HeaderValue;
use tracing::{error, warn};

use shared::types::REFRESH_COOKIE;

use crate::AppState;
use crate::auth::AuthError;
use crate::handlers::http::utils::{
    HttpResponse, create_persistent_cookie, delete_cookie, deliver_error_json, is_https,
};

pub use login::handle_login;
pub use logout::{handle_logout, handle_logout_all};
pub use refresh::handle_refresh;

/// `Secure` is set when the request came in over HTTPS or the config forces it.
pub(crate) fn cookie_secure(req: &Request<Bytes>, state: &AppState) -> bool {
    state.config.auth.cookie_secure || is_https(req)
}

/// `rt=<token>` scoped to `<prefix>/auth`, living as long as the token.
pub(crate) fn refresh_cookie(state: &AppState, token: &str, secure: bool) -> Result<HeaderValue> {
    let max_age = Duration::from_secs(state.config.auth.refresh_token_secs().max(0) as u64);
    create_persistent_cookie(
        REFRESH_COOKIE,
        token,
        max_age,
        &state.config.server.auth_path(),
        secure,
    )
    .context("Failed to create refresh cookie")
}

pub(crate) fn clear_refresh_cookie(state: &AppState, secure: bool) -> Result<HeaderValue> {
    delete_cookie(REFRESH_COOKIE, &state.config.server.auth_path(), secure)
        .context("Failed to clear refresh cookie")
}

/// JSON error body for an `AuthError` outside the refresh endpoint.
pub(crate) fn auth_error_response(err: &AuthError) -> Result<HttpResponse> {
    if err.is_internal() {
        error!("Auth operation failed: {}", err);
    } else {
        warn!("Auth rejected: {}", err.to_code());
    }
    deliver_error_json(err.to_code(), err.to_message(), err.status())
}

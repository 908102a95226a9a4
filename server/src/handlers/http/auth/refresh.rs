use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use tracing::{error, warn};

use shared::types::{REFRESH_COOKIE, SessionResponse};

use super::{clear_refresh_cookie, cookie_secure, refresh_cookie};
use crate::AppState;
use crate::auth::AuthError;
use crate::handlers::http::utils::{
    HttpResponse, deliver_error_json, deliver_error_json_with_cookie,
    deliver_serialized_json_with_cookie, get_cookie,
};

/// `GET <prefix>/auth/refresh`
///
/// Every failure is a 401 carrying one of `NO_REFRESH`, `BAD_REFRESH`,
/// `REFRESH_REVOKED` or `UNAUTHORIZED`.
pub async fn handle_refresh(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    let secure = cookie_secure(&req, &state);
    let presented = get_cookie(req.headers(), REFRESH_COOKIE);

    match state.sessions.refresh(presented.as_deref()).await {
        Ok(session) => {
            let cookie = refresh_cookie(&state, &session.refresh_token, secure)?;
            deliver_serialized_json_with_cookie(
                &SessionResponse::new(session.access_token, session.principal),
                StatusCode::OK,
                cookie,
            )
        }
        Err(e) => {
            if e.is_internal() {
                error!("Refresh failed: {}", e);
            } else {
                warn!("Refresh rejected: {}", e.refresh_code());
            }

            if matches!(e, AuthError::PrincipalInactive) {
                return deliver_error_json_with_cookie(
                    e.refresh_code(),
                    e.refresh_message(),
                    StatusCode::UNAUTHORIZED,
                    clear_refresh_cookie(&state, secure)?,
                );
            }

            deliver_error_json(
                e.refresh_code(),
                e.refresh_message(),
                StatusCode::UNAUTHORIZED,
            )
        }
    }
}

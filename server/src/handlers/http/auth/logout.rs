use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use tracing::info;

use shared::types::{AccessClaims, LogoutResponse, REFRESH_COOKIE};

use super::{auth_error_response, clear_refresh_cookie, cookie_secure};
use crate::AppState;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json_with_cookie, get_cookie};

/// `POST <prefix>/auth/logout`
///
/// Always `200 {ok:true}` with the cookie cleared. Revocation is best effort:
/// a missing, garbage or already revoked cookie is not an error.
pub async fn handle_logout(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    let secure = cookie_secure(&req, &state);
    let presented = get_cookie(req.headers(), REFRESH_COOKIE);

    state.sessions.logout(presented.as_deref()).await;

    deliver_serialized_json_with_cookie(
        &LogoutResponse {
            ok: true,
            revoked: None,
        },
        StatusCode::OK,
        clear_refresh_cookie(&state, secure)?,
    )
}

/// `POST <prefix>/auth/logout-all`: revoke every refresh token of the caller.
pub async fn handle_logout_all(
    req: Request<Bytes>,
    state: AppState,
    claims: AccessClaims,
) -> Result<HttpResponse> {
    let secure = cookie_secure(&req, &state);
    let user_id = claims.principal.user_id;

    match state.sessions.revoke_all(user_id).await {
        Ok(revoked) => {
            info!("User {} logged out everywhere", user_id);
            deliver_serialized_json_with_cookie(
                &LogoutResponse {
                    ok: true,
                    revoked: Some(revoked),
                },
                StatusCode::OK,
                clear_refresh_cookie(&state, secure)?,
            )
        }
        Err(e) => auth_error_response(&e),
    }
}

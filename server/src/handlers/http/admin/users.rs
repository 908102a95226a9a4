use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use tracing::info;

use shared::types::{AccessClaims, LogoutResponse};

use crate::AppState;
use crate::handlers::http::auth::auth_error_response;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json};

/// `POST <prefix>/users/:id/sessions/revoke`
///
/// The router has already checked the admin permission. Revoking the
/// sessions of an unknown user is not an error; it revokes nothing.
pub async fn handle_revoke_sessions(
    _req: Request<Bytes>,
    state: AppState,
    claims: AccessClaims,
    target_user_id: i64,
) -> Result<HttpResponse> {
    match state.sessions.revoke_all(target_user_id).await {
        Ok(revoked) => {
            info!(
                "Admin {} revoked {} session(s) of user {}",
                claims.principal.user_id, revoked, target_user_id
            );
            deliver_serialized_json(
                &LogoutResponse {
                    ok: true,
                    revoked: Some(revoked),
                },
                StatusCode::OK,
            )
        }
        Err(e) => auth_error_response(&e),
    }
}

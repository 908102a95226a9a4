use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode};
use tracing::debug;

use shared::types::{AccessClaims, MeResponse};

use crate::AppState;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json};

/// `GET <prefix>/me`: the principal embedded in the caller's access token.
/// No database read; the snapshot is as of token issuance.
pub async fn handle_get_profile(
    _req: Request<Bytes>,
    _state: AppState,
    claims: AccessClaims,
) -> Result<HttpResponse> {
    debug!("Profile requested by user {}", claims.principal.user_id);

    deliver_serialized_json(
        &MeResponse {
            ok: true,
            user: claims.principal,
        },
        StatusCode::OK,
    )
}

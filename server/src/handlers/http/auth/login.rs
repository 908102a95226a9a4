use anyhow::Result;
use bytes::Bytes;
use hyper::{Request, StatusCode, header};
use tracing::{debug, info};

use shared::types::{LoginData, SessionResponse};

use super::{auth_error_response, cookie_secure, refresh_cookie};
use crate::AppState;
use crate::auth::AuthError;
use crate::handlers::http::utils::{HttpResponse, deliver_serialized_json_with_cookie};

/// `POST <prefix>/auth/login`
pub async fn handle_login(req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
    info!("Processing login request");

    let secure = cookie_secure(&req, &state);

    let login_data = match parse_login_body(&req) {
        Ok(data) => data,
        Err(e) => return auth_error_response(&e),
    };

    match state.sessions.login(&login_data).await {
        Ok(session) => {
            let cookie = refresh_cookie(&state, &session.refresh_token, secure)?;
            deliver_serialized_json_with_cookie(
                &SessionResponse::new(session.access_token, session.principal),
                StatusCode::OK,
                cookie,
            )
        }
        Err(e) => auth_error_response(&e),
    }
}

/// JSON by default; url-encoded forms are accepted too. An empty body parses
/// to empty credentials so the caller reports the missing fields.
fn parse_login_body(req: &Request<Bytes>) -> Result<LoginData, AuthError> {
    let body = req.body();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(LoginData::default());
    }

    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        let mut data = LoginData::default();
        for (key, value) in form_urlencoded::parse(body.as_ref()) {
            match key.as_ref() {
                "email" | "username" => data.email = Some(value.into_owned()),
                "password" => data.password = Some(value.into_owned()),
                _ => {}
            }
        }
        return Ok(data);
    }

    serde_json::from_slice(body).map_err(|e| {
        debug!("Login body is not valid JSON: {}", e);
        AuthError::BadRequest
    })
}

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderValue;
use hyper::{Response, StatusCode, header};
use serde::Serialize;
use std::convert::Infallible;
use tracing::debug;

use shared::types::ErrorResponse;

pub type HttpResponse = Response<BoxBody<Bytes, Infallible>>;

pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
pub fn deliver_serialized_json<T: Serialize>(data: &T, status: StatusCode) -> Result<HttpResponse> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))
}

/// Same as `deliver_serialized_json`, plus a `Set-Cookie` header.
pub fn deliver_serialized_json_with_cookie<T: Serialize>(
    data: &T,
    status: StatusCode,
    cookie: HeaderValue,
) -> Result<HttpResponse> {
    let mut response = deliver_serialized_json(data, status)?;
    response.headers_mut().append(header::SET_COOKIE, cookie);
    Ok(response)
}

/// Delivers a JSON error response with the specified error code, message, and status.
pub fn deliver_error_json(error_code: &str, message: &str, status: StatusCode) -> Result<HttpResponse> {
    debug!(
        "Delivering error JSON: {} - {} ({})",
        status.as_u16(),
        error_code,
        message
    );

    deliver_serialized_json(&ErrorResponse::new(error_code, message), status)
        .context("Failed to build error JSON response")
}

/// Error response that also sets (usually clears) a cookie.
pub fn deliver_error_json_with_cookie(
    error_code: &str,
    message: &str,
    status: StatusCode,
    cookie: HeaderValue,
) -> Result<HttpResponse> {
    let mut response = deliver_error_json(error_code, message, status)?;
    response.headers_mut().append(header::SET_COOKIE, cookie);
    Ok(response)
}

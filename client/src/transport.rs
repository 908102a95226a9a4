use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderValue, Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use shared::types::ErrorResponse;

use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// One API call. `path` is relative to the API prefix, e.g. `/auth/login`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self, ClientError> {
        let body = serde_json::to_vec(value).map_err(|e| ClientError::Decode(e.to_string()))?;
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// `Ok(self)` on 2xx, otherwise the server's error body as
    /// `ClientError::Http`.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let (code, message) = match self.json::<ErrorResponse>() {
            Ok(err) => (err.code, err.message),
            Err(_) => (
                String::new(),
                String::from_utf8_lossy(&self.body).into_owned(),
            ),
        };
        Err(ClientError::Http {
            status: self.status.as_u16(),
            code,
            message,
        })
    }
}

/// Sends one request and returns the raw response. Implementations own the
/// cookie jar; the refresh cookie never passes through the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ClientError>;
}

// ---------------------------------------------------------------------------
// Cookie jar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredCookie {
    value: String,
    path: String,
}

/// Single-origin cookie store. Honours `Path` and deletes on `Max-Age<=0`.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<HashMap<String, StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `Set-Cookie` header value. `default_path` is used when the
    /// cookie carries no `Path` attribute.
    pub async fn store(&self, set_cookie: &str, default_path: &str) {
        let mut parts = set_cookie.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|p| p.split_once('=')) else {
            return;
        };

        let mut path = default_path.to_string();
        let mut expired = false;
        for attr in parts {
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            if key.eq_ignore_ascii_case("path") && !val.is_empty() {
                path = val.to_string();
            } else if key.eq_ignore_ascii_case("max-age") {
                expired = val.parse::<i64>().map(|age| age <= 0).unwrap_or(false);
            }
        }

        let mut cookies = self.cookies.lock().await;
        if expired {
            debug!("Cookie {} removed", name);
            cookies.remove(name);
        } else {
            debug!("Cookie {} stored for {}", name, path);
            cookies.insert(
                name.to_string(),
                StoredCookie {
                    value: value.to_string(),
                    path,
                },
            );
        }
    }

    /// `Cookie` header value for a request to `request_path`, if any cookie
    /// applies.
    pub async fn header_for(&self, request_path: &str) -> Option<String> {
        let cookies = self.cookies.lock().await;
        let mut pairs: Vec<String> = cookies
            .iter()
            .filter(|(_, c)| path_matches(&c.path, request_path))
            .map(|(name, c)| format!("{}={}", name, c.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        pairs.sort();
        Some(pairs.join("; "))
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.cookies.lock().await.get(name).map(|c| c.value.clone())
    }
}

// RFC 6265 path-match.
fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

// ---------------------------------------------------------------------------
// Hyper transport
// ---------------------------------------------------------------------------

/// Plain-HTTP transport on the hyper-util pooled client.
#[derive(Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    /// e.g. `http://127.0.0.1:4000/api`, no trailing slash.
    base: String,
    /// Path part of `base`, e.g. `/api`.
    base_path: String,
    jar: CookieJar,
}

impl HyperTransport {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = base_url.trim_end_matches('/').to_string();
        let uri: Uri = base
            .parse()
            .map_err(|e: http::uri::InvalidUri| ClientError::InvalidUrl(e.to_string()))?;

        if uri.scheme_str() != Some("http") || uri.host().is_none() {
            return Err(ClientError::InvalidUrl(format!(
                "{} (expected http://host[:port][/prefix])",
                base_url
            )));
        }

        let base_path = uri.path().trim_end_matches('/').to_string();
        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            client,
            base,
            base_path,
            jar: CookieJar::new(),
        })
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.jar
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{}", self.base, req.path);
        let full_path = format!("{}{}", self.base_path, req.path);

        let mut builder = Request::builder().method(req.method.clone()).uri(&url);
        if req.body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        if let Some(token) = &req.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(cookie) = self.jar.header_for(&full_path).await {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = builder
            .body(Full::new(req.body.unwrap_or_default()))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        debug!("{} {}", req.method, url);
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e: hyper_util::client::legacy::Error| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        for value in response.headers().get_all(header::SET_COOKIE) {
            if let Ok(s) = HeaderValue::to_str(value) {
                self.jar.store(s, &full_path).await;
            }
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?
            .to_bytes();

        debug!("{} {} -> {}", req.method, url, status);
        Ok(ApiResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cookie_is_sent_only_under_its_path() {
        let jar = CookieJar::new();
        jar.store("rt=abc; Max-Age=604800; Path=/api/auth; HttpOnly; SameSite=Lax", "/")
            .await;

        assert_eq!(jar.header_for("/api/auth/refresh").await.as_deref(), Some("rt=abc"));
        assert_eq!(jar.header_for("/api/auth").await.as_deref(), Some("rt=abc"));
        assert!(jar.header_for("/api/me").await.is_none());
        assert!(jar.header_for("/api/authx").await.is_none());
    }

    #[tokio::test]
    async fn max_age_zero_deletes_cookie() {
        let jar = CookieJar::new();
        jar.store("rt=abc; Path=/api/auth", "/").await;
        jar.store("rt=; Max-Age=0; Path=/api/auth; HttpOnly", "/").await;
        assert!(jar.get("rt").await.is_none());
    }

    #[tokio::test]
    async fn newer_cookie_replaces_older() {
        let jar = CookieJar::new();
        jar.store("rt=one; Path=/api/auth", "/").await;
        jar.store("rt=two; Path=/api/auth", "/").await;
        assert_eq!(jar.get("rt").await.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn malformed_set_cookie_is_ignored() {
        let jar = CookieJar::new();
        jar.store("garbage", "/").await;
        assert!(jar.header_for("/").await.is_none());
    }

    #[test]
    fn error_for_status_uses_server_body() {
        let res = ApiResponse {
            status: StatusCode::UNAUTHORIZED,
            body: Bytes::from(
                r#"{"ok":false,"status":"error","code":"NO_REFRESH","message":"Refresh token required"}"#,
            ),
        };
        let err = res.error_for_status().unwrap_err();
        assert_eq!(err.code(), Some("NO_REFRESH"));
    }

    #[tokio::test]
    async fn base_url_must_be_plain_http() {
        assert!(HyperTransport::new("http://127.0.0.1:4000/api").is_ok());
        assert!(matches!(
            HyperTransport::new("ftp://host/api"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            HyperTransport::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}

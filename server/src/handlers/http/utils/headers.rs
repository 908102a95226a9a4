use anyhow::{Result, anyhow};
use hyper::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::debug;

/// Extract a header value as a string
pub fn get_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract cookie value by name. Every `Cookie` header is searched.
pub fn get_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let mut parts = cookie.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next()?.trim();
            if name == cookie_name {
                debug!("Cookie found: {}", cookie_name);
                Some(value.to_string())
            } else {
                None
            }
        })
}

/// Build a `Set-Cookie` value with `SameSite=Lax`.
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age: Option<Duration>,
    path: Option<&str>,
    http_only: bool,
    secure: bool,
) -> Result<HeaderValue> {
    let mut cookie = format!("{}={}", name, value);

    if let Some(age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", age.as_secs()));
    }

    if let Some(p) = path {
        cookie.push_str(&format!("; Path={}", p));
    }

    if http_only {
        cookie.push_str("; HttpOnly");
    }

    cookie.push_str("; SameSite=Lax");

    if secure {
        cookie.push_str("; Secure");
    }

    debug!("Setting cookie: {}", name);

    HeaderValue::from_str(&cookie).map_err(|e| anyhow!("Invalid cookie value for {}: {}", name, e))
}

/// HTTP-only cookie scoped to `path` that lives for `max_age`.
pub fn create_persistent_cookie(
    name: &str,
    value: &str,
    max_age: Duration,
    path: &str,
    secure: bool,
) -> Result<HeaderValue> {
    set_cookie(name, value, Some(max_age), Some(path), true, secure)
}

/// Expire a cookie. Path must match the one it was set with.
pub fn delete_cookie(name: &str, path: &str, secure: bool) -> Result<HeaderValue> {
    debug!("Deleting cookie: {}", name);
    set_cookie(
        name,
        "",
        Some(Duration::from_secs(0)),
        Some(path),
        true,
        secure,
    )
}

/// Extract bearer token from the Authorization header.
/// Only the exact form `Bearer <token>` is accepted.
pub fn get_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth = get_header_value(headers, "authorization")?;
    let mut parts = auth.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token.to_string()),
        _ => {
            debug!("Authorization header is not a bearer token");
            None
        }
    }
}

/// Headers applied to every response.
pub fn add_security_headers<T>(mut res: hyper::Response<T>) -> hyper::Response<T> {
    let headers = res.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn cookie_is_found_among_others() {
        let h = headers(&[("cookie", "theme=dark; rt=abc.def.ghi; other=1")]);
        assert_eq!(get_cookie(&h, "rt").as_deref(), Some("abc.def.ghi"));
        assert_eq!(get_cookie(&h, "missing"), None);
    }

    #[test]
    fn cookie_is_found_in_second_header() {
        let h = headers(&[("cookie", "theme=dark"), ("cookie", "rt=xyz")]);
        assert_eq!(get_cookie(&h, "rt").as_deref(), Some("xyz"));
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        let h = headers(&[("cookie", "rtx=1")]);
        assert_eq!(get_cookie(&h, "rt"), None);
    }

    #[test]
    fn refresh_cookie_attributes() {
        let v = create_persistent_cookie("rt", "tok", Duration::from_secs(604_800), "/api/auth", false)
            .unwrap();
        assert_eq!(
            v.to_str().unwrap(),
            "rt=tok; Max-Age=604800; Path=/api/auth; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn secure_flag_is_appended() {
        let v = create_persistent_cookie("rt", "tok", Duration::from_secs(1), "/", true).unwrap();
        assert!(v.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn delete_cookie_expires_immediately() {
        let v = delete_cookie("rt", "/api/auth", false).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("rt=; Max-Age=0; Path=/api/auth"));
    }

    #[test]
    fn bearer_token_must_be_exact() {
        assert_eq!(
            get_bearer_token(&headers(&[("authorization", "Bearer abc")])).as_deref(),
            Some("abc")
        );
        assert!(get_bearer_token(&headers(&[("authorization", "bearer abc")])).is_none());
        assert!(get_bearer_token(&headers(&[("authorization", "Bearer")])).is_none());
        assert!(get_bearer_token(&headers(&[("authorization", "Bearer  abc")])).is_none());
        assert!(get_bearer_token(&headers(&[("authorization", "Bearer a b")])).is_none());
        assert!(get_bearer_token(&headers(&[("authorization", "Basic abc")])).is_none());
        assert!(get_bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn security_headers_are_set() {
        let res = add_security_headers(hyper::Response::new(()));
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
        assert_eq!(res.headers()["x-frame-options"], "DENY");
        assert_eq!(res.headers()["referrer-policy"], "no-referrer");
    }
}

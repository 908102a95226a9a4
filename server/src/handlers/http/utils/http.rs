/// Returns true only when the request arrived over a secure (HTTPS) connection.
///
/// Checks, in order:
///   1. `X-Forwarded-Proto: https`   — set by most reverse proxies (nginx, Caddy, etc.)
///   2. `X-Forwarded-Ssl: on`        — Apache-style variant
///   3. The request URI scheme is literally "https"
///
/// Falls back to `false` so that plain HTTP dev servers work out of the box.
pub fn is_https<B>(req: &hyper::Request<B>) -> bool {
    let header_is = |name: &str, expected: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    };

    if header_is("x-forwarded-proto", "https") || header_is("x-forwarded-ssl", "on") {
        return true;
    }

    // Only present when using an absolute-form request URI
    req.uri()
        .scheme()
        .map(|s| s.as_str() == "https")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_request_is_not_https() {
        let req = hyper::Request::builder().uri("/api/auth/login").body(()).unwrap();
        assert!(!is_https(&req));
    }

    #[test]
    fn proxy_headers_mark_https() {
        let req = hyper::Request::builder()
            .uri("/")
            .header("x-forwarded-proto", "HTTPS")
            .body(())
            .unwrap();
        assert!(is_https(&req));

        let req = hyper::Request::builder()
            .uri("/")
            .header("x-forwarded-ssl", "on")
            .body(())
            .unwrap();
        assert!(is_https(&req));
    }

    #[test]
    fn absolute_https_uri_is_https() {
        let req = hyper::Request::builder()
            .uri("https://example.com/api")
            .body(())
            .unwrap();
        assert!(is_https(&req));
    }
}

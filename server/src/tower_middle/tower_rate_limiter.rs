use hyper::{Request, StatusCode};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use shared::types::codes;

use crate::handlers::http::utils::{HttpResponse, deliver_error_json, full};
use crate::security::RateLimiter;

/// Tower layer for rate limiting
///
/// Wraps the JSON API service and rate limits requests per client IP. The IP is read
/// from the `SocketAddr` the accept loop stores in the request extensions;
/// requests without one pass through.
#[derive(Clone, Debug)]
pub struct RateLimiterLayer {
    limiter: RateLimiter,
}

impl RateLimiterLayer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimiterLayer {
    type Service = RateLimiterService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiterService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimiterService<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RateLimiterService<S>
where
    S: Service<Request<ReqBody>, Response = HttpResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let client_ip = req.extensions().get::<SocketAddr>().map(|addr| addr.ip());

        let limiter = self.limiter.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(ip) = client_ip {
                if !limiter.check(ip).await {
                    tracing::warn!("Connection from {} rate limited", ip);
                    return Ok(too_many_requests(limiter.retry_after_secs()));
                }
            }

            inner.call(req).await
        })
    }
}

/// `429 {code: "RATE_LIMITED"}` with `retry-after` in seconds.
fn too_many_requests(retry_after: u64) -> HttpResponse {
    let mut response = deliver_error_json(
        codes::RATE_LIMITED,
        "Too many requests",
        StatusCode::TOO_MANY_REQUESTS,
    )
    .unwrap_or_else(|_| {
        let mut fallback = HttpResponse::new(full(""));
        *fallback.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        fallback
    });
    response
        .headers_mut()
        .insert(hyper::header::RETRY_AFTER, retry_after.into());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use std::convert::Infallible;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn second_request_from_same_ip_is_rejected() {
        let svc = tower::ServiceBuilder::new()
            .layer(RateLimiterLayer::new(RateLimiter::new(
                1,
                Duration::from_secs(900),
            )))
            .service_fn(|_req: Request<()>| async {
                Ok::<_, Infallible>(HttpResponse::new(full("ok")))
            });

        let addr: SocketAddr = "10.1.1.1:5000".parse().unwrap();
        let mut first = Request::new(());
        first.extensions_mut().insert(addr);
        let res = svc.clone().oneshot(first).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let mut second = Request::new(());
        second.extensions_mut().insert(addr);
        let res = svc.clone().oneshot(second).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()["retry-after"], "900");
        assert_eq!(res.headers()["content-type"], "application/json");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn requests_without_peer_address_pass() {
        let svc = tower::ServiceBuilder::new()
            .layer(RateLimiterLayer::new(RateLimiter::new(
                1,
                Duration::from_secs(900),
            )))
            .service_fn(|_req: Request<()>| async {
                Ok::<_, Infallible>(HttpResponse::new(full("ok")))
            });

        for _ in 0..3 {
            let res = svc.clone().oneshot(Request::new(())).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
    }
}

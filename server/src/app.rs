use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use shared::types::codes;

use crate::AppState;
use crate::handlers::http::utils::{HttpResponse, add_security_headers, deliver_error_json, full};
use crate::handlers::http::{Router, build_api_router};
use crate::security::RateLimiter;
use crate::tower_middle::RateLimiterLayer;

/// Router plus shared state. `handle` is the whole request path minus the
/// tower layers, so tests can drive it without a socket.
#[derive(Debug)]
pub struct App {
    router: Router,
    state: AppState,
}

impl App {
    pub fn new(state: AppState) -> Self {
        let router = build_api_router(
            state.config.server.prefix(),
            &state.config.auth.admin_permission,
        );
        Self { router, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Result<HttpResponse, Infallible>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let bytes = match Limited::new(body, self.state.config.server.max_body_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let too_large = e.downcast_ref::<http_body_util::LengthLimitError>().is_some();
                warn!("Failed to read request body: {}", e);
                let response = if too_large {
                    deliver_error_json(
                        codes::BAD_REQUEST,
                        "Request body too large",
                        StatusCode::PAYLOAD_TOO_LARGE,
                    )
                } else {
                    deliver_error_json(
                        codes::BAD_REQUEST,
                        "Request body could not be read",
                        StatusCode::BAD_REQUEST,
                    )
                };
                return Ok(add_security_headers(response.unwrap_or_else(|_| internal_error())));
            }
        };

        let req = Request::from_parts(parts, bytes);
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let response = match self.router.route(req, self.state.clone()).await {
            Ok(response) => response,
            Err(e) => {
                error!("{} {} failed: {:#}", method, path, e);
                deliver_error_json(
                    codes::INTERNAL_ERROR,
                    "Internal server error",
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
                .unwrap_or_else(|_| internal_error())
            }
        };

        debug!("{} {} -> {}", method, path, response.status());
        Ok(add_security_headers(response))
    }
}

fn internal_error() -> HttpResponse {
    let mut response = Response::new(full("Internal server error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Credentialed CORS for exactly one browser origin.
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("Invalid cors_origin: {}", origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------
//
// Per connection: store the peer address in the request extensions, then
// CORS -> per-IP rate limit -> App::handle, served over HTTP/1 on its own
// task. Ctrl-C stops accepting; in-flight connections finish on their tasks.

pub async fn serve(state: AppState) -> Result<()> {
    let config = state.config.clone();
    let addr: SocketAddr = config
        .server
        .addr()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.addr()))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let limiter = RateLimiter::new(
        config.rate_limit.max_requests,
        Duration::from_secs(config.rate_limit.window_secs),
    );
    let cleanup = limiter.spawn_cleanup(Duration::from_secs(60));
    let cors = cors_layer(&config.server.cors_origin)?;
    let app = Arc::new(App::new(state));

    info!(
        "Listening on http://{} (api prefix '{}')",
        addr,
        config.server.prefix()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let app = app.clone();
                let service = ServiceBuilder::new()
                    .map_request(move |mut req: Request<Incoming>| {
                        req.extensions_mut().insert(peer);
                        req
                    })
                    .layer(cors.clone())
                    .layer(RateLimiterLayer::new(limiter.clone()))
                    .service_fn(move |req: Request<Incoming>| {
                        let app = app.clone();
                        async move { app.handle(req).await }
                    });

                let io = TokioIo::new(stream);
                tokio::task::spawn(async move {
                    if let Err(err) = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(io, TowerToHyperService::new(service))
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", peer, err);
                    }
                });
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received, no longer accepting connections");
                break;
            }
        }
    }

    cleanup.abort();
    Ok(())
}

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use bytes::Bytes;
use hyper::{Method, Request, StatusCode};
use tracing::{debug, warn};

use shared::types::{AccessClaims, codes};

use crate::AppState;
use crate::handlers::http::utils::{HttpResponse, deliver_error_json, get_bearer_token};
use crate::handlers::http::{admin, auth, profile};

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Three security tiers:
//
//   RouteHandler  — no auth.  Receives (req, state).
//                   Use for: login, refresh, logout, health.
//
//   LightHandler  — access token signature + expiry + type, zero DB reads.
//                   Receives (req, state, claims).
//
//   Permitted     — a LightHandler that additionally requires a permission
//                   code in the token's principal; 403 otherwise.
//
// Bodies are collected before routing, so every handler sees `Request<Bytes>`.

type HandlerFuture = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>>;

type RouteHandler = Box<dyn Fn(Request<Bytes>, AppState) -> HandlerFuture + Send + Sync>;

type LightHandler =
    Box<dyn Fn(Request<Bytes>, AppState, AccessClaims) -> HandlerFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// RouteKind
// ---------------------------------------------------------------------------

enum RouteKind {
    /// No authentication check.
    Open(RouteHandler),

    /// Bearer access token required. Handler receives the verified claims.
    Light(LightHandler),

    /// Bearer access token plus the named permission.
    Permitted(String, LightHandler),
}

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct Router {
    routes: Vec<Route>,
    prefix: String,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            prefix: String::new(),
        }
    }

    /// Mount every route registered after this call under `prefix`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    fn push(&mut self, method: Method, path: &str, kind: RouteKind) {
        self.routes.push(Route {
            method,
            path: format!("{}{}", self.prefix, path),
            kind,
        });
    }

    // ── Open (no auth) ────────────────────────────────────────────────────────

    pub fn get<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.push(
            Method::GET,
            path,
            RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        );
        self
    }

    pub fn post<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.push(
            Method::POST,
            path,
            RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        );
        self
    }

    // ── Light auth (access token, zero DB reads) ──────────────────────────────
    //
    // The router verifies the bearer token before the handler is called.
    // Handlers receive `AccessClaims` and must not re-verify.

    pub fn get_light<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, AccessClaims) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.push(
            Method::GET,
            path,
            RouteKind::Light(Box::new(move |req, state, claims| {
                Box::pin(handler(req, state, claims))
            })),
        );
        self
    }

    pub fn post_light<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, AccessClaims) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.push(
            Method::POST,
            path,
            RouteKind::Light(Box::new(move |req, state, claims| {
                Box::pin(handler(req, state, claims))
            })),
        );
        self
    }

    // ── Permitted (access token + permission code) ────────────────────────────

    pub fn post_permitted<F, Fut>(mut self, path: &str, permission: &str, handler: F) -> Self
    where
        F: Fn(Request<Bytes>, AppState, AccessClaims) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse>> + Send + 'static,
    {
        self.push(
            Method::POST,
            path,
            RouteKind::Permitted(
                permission.to_string(),
                Box::new(move |req, state, claims| Box::pin(handler(req, state, claims))),
            ),
        );
        self
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub async fn route(&self, req: Request<Bytes>, state: AppState) -> Result<HttpResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        for route in &self.routes {
            if route.method != method || !Self::path_matches(&route.path, &path) {
                continue;
            }

            return match &route.kind {
                RouteKind::Open(h) => h(req, state).await,

                RouteKind::Light(h) => match authenticate(&req, &state) {
                    Some(claims) => h(req, state, claims).await,
                    None => {
                        warn!("Auth rejected {} {}", method, path);
                        unauthorized()
                    }
                },

                RouteKind::Permitted(permission, h) => match authenticate(&req, &state) {
                    Some(claims) if claims.principal.has_permission(permission) => {
                        h(req, state, claims).await
                    }
                    Some(claims) => {
                        warn!(
                            "User {} lacks {} for {} {}",
                            claims.principal.user_id, permission, method, path
                        );
                        forbidden()
                    }
                    None => {
                        warn!("Auth rejected {} {}", method, path);
                        unauthorized()
                    }
                },
            };
        }

        debug!("No route for {} {}", method, path);
        deliver_error_json(codes::NOT_FOUND, "Endpoint not found", StatusCode::NOT_FOUND)
            .context("Failed to deliver 404 response")
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        // e.g.  "/api/users/:id/sessions/revoke"  matches  "/api/users/42/sessions/revoke"
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| (r.starts_with(':') && !p.is_empty()) || r == p)
    }

    /// Value of the `:name` segment of `route_path` in `request_path`.
    pub fn path_param<'a>(route_path: &str, request_path: &'a str, name: &str) -> Option<&'a str> {
        let clean = request_path.split('?').next().unwrap_or(request_path);
        route_path
            .split('/')
            .zip(clean.split('/'))
            .find(|(r, _)| r.strip_prefix(':') == Some(name))
            .map(|(_, p)| p)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn authenticate(req: &Request<Bytes>, state: &AppState) -> Option<AccessClaims> {
    let token = get_bearer_token(req.headers())?;
    match state.sessions.verify_access(&token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            debug!("Access token rejected: {}", e);
            None
        }
    }
}

fn unauthorized() -> Result<HttpResponse> {
    deliver_error_json(
        codes::UNAUTHORIZED,
        "Authentication required",
        StatusCode::UNAUTHORIZED,
    )
    .context("Failed to deliver 401 response")
}

fn forbidden() -> Result<HttpResponse> {
    deliver_error_json(
        codes::FORBIDDEN,
        "Insufficient privileges",
        StatusCode::FORBIDDEN,
    )
    .context("Failed to deliver 403 response")
}

// ---------------------------------------------------------------------------
// API router
//
// Auth tier is enforced here at the routing level; handlers MUST NOT repeat
// the auth call.
//
//   .get / .post            → Open       — handler gets (req, state)
//   .get_light / .post_light → Light     — handler gets (req, state, claims)
//   .post_permitted          → Permitted — same, plus a permission check
// ---------------------------------------------------------------------------

pub const REVOKE_SESSIONS_PATH: &str = "/users/:id/sessions/revoke";

pub fn build_api_router(prefix: &str, admin_permission: &str) -> Router {
    let revoke_path = format!("{}{}", prefix.trim_end_matches('/'), REVOKE_SESSIONS_PATH);

    Router::new()
        .with_prefix(prefix)
        // ── Public ───────────────────────────────────────────────────────────
        .get("/health", |_req, _state| async move {
            crate::handlers::http::utils::deliver_serialized_json(
                &serde_json::json!({ "ok": true }),
                StatusCode::OK,
            )
        })
        .post("/auth/login", |req, state| async move {
            auth::handle_login(req, state).await.context("Login failed")
        })
        .get("/auth/refresh", |req, state| async move {
            auth::handle_refresh(req, state).await.context("Refresh failed")
        })
        .post("/auth/refresh", |req, state| async move {
            auth::handle_refresh(req, state).await.context("Refresh failed")
        })
        .post("/auth/logout", |req, state| async move {
            auth::handle_logout(req, state).await.context("Logout failed")
        })
        // ── Access token required ────────────────────────────────────────────
        .get_light("/me", |req, state, claims| async move {
            profile::handle_get_profile(req, state, claims)
                .await
                .context("Profile get failed")
        })
        .post_light("/auth/logout-all", |req, state, claims| async move {
            auth::handle_logout_all(req, state, claims)
                .await
                .context("Logout-all failed")
        })
        // ── Access token + admin permission ──────────────────────────────────
        .post_permitted(
            REVOKE_SESSIONS_PATH,
            admin_permission,
            move |req, state, claims| {
                let user_id = Router::path_param(&revoke_path, req.uri().path(), "id")
                    .and_then(|s| s.parse::<i64>().ok());
                async move {
                    match user_id {
                        Some(id) => admin::handle_revoke_sessions(req, state, claims, id)
                            .await
                            .context("Revoke sessions failed"),
                        None => deliver_error_json(
                            codes::BAD_REQUEST,
                            "Invalid user id",
                            StatusCode::BAD_REQUEST,
                        ),
                    }
                }
            },
        )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

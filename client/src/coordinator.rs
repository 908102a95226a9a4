use std::sync::{Mutex, MutexGuard, PoisonError};

use http::StatusCode;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use shared::types::{LoginData, LogoutResponse, MeResponse, Principal, SessionResponse};

use crate::error::ClientError;
use crate::session::{SessionEvent, SessionStore};
use crate::transport::{ApiRequest, ApiResponse, Transport};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const LOGOUT_ALL_PATH: &str = "/auth/logout-all";
pub const ME_PATH: &str = "/me";

type RefreshOutcome = Result<String, ClientError>;

/// Never held across an `.await`.
#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    /// Bumped every time a refresh settles.
    generation: u64,
    pending: Vec<oneshot::Sender<RefreshOutcome>>,
}

fn lock_state(state: &Mutex<RefreshState>) -> MutexGuard<'_, RefreshState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Role {
    /// A refresh settled after the request was sent.
    Settled,
    Wait(oneshot::Receiver<RefreshOutcome>),
    Lead,
}

/// Owned by the caller running the refresh. If that caller is dropped
/// before `settle` (timeout, `select!`, aborted task) the flag is reset and
/// every waiter fails with `SessionExpired`, so the next 401 starts over.
struct RefreshGuard<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl RefreshGuard<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        let pending = {
            let mut state = lock_state(self.state);
            state.refreshing = false;
            state.generation += 1;
            std::mem::take(&mut state.pending)
        };
        debug!("Refresh settled, releasing {} waiter(s)", pending.len());
        for tx in pending {
            let _ = tx.send(outcome.clone());
        }
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let pending = {
            let mut state = lock_state(self.state);
            state.refreshing = false;
            std::mem::take(&mut state.pending)
        };
        warn!(
            "Refresh abandoned before completing, failing {} waiter(s)",
            pending.len()
        );
        for tx in pending {
            let _ = tx.send(Err(ClientError::SessionExpired));
        }
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------
//
// Every request carries the current access token. A 401 on a non-login
// request is retried exactly once after a refresh; concurrent 401s share a
// single refresh call. A failed refresh is terminal: every waiter fails with
// `SessionExpired` and the session is cleared.

pub struct ApiClient<T: Transport> {
    transport: T,
    session: SessionStore,
    refresh: Mutex<RefreshState>,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: SessionStore::new(),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Send `req` with the current access token, refreshing once on 401.
    ///
    /// A response that is still 401 after the retry is returned as-is.
    pub async fn send(&self, req: ApiRequest) -> Result<ApiResponse, ClientError> {
        let generation = lock_state(&self.refresh).generation;
        let carried = self.session.token().await;
        let res = self
            .transport
            .send(req.clone().with_bearer(carried.clone()))
            .await?;

        if res.status != StatusCode::UNAUTHORIZED || req.path == LOGIN_PATH {
            return Ok(res);
        }

        debug!("401 on {}, refreshing access token", req.path);
        let token = self.fresh_token(carried.as_deref(), generation).await?;
        self.transport.send(req.with_bearer(Some(token))).await
    }

    /// A token newer than `stale`: the current one if a refresh already
    /// replaced it, the result of an in-flight refresh, or a new refresh.
    /// `sent_at` is the refresh generation observed before the request went
    /// out.
    async fn fresh_token(&self, stale: Option<&str>, sent_at: u64) -> RefreshOutcome {
        match self.session.token().await {
            Some(current) if Some(current.as_str()) != stale => {
                debug!("Access token changed while in flight, replaying");
                return Ok(current);
            }
            None if stale.is_some() => return Err(ClientError::SessionExpired),
            _ => {}
        }

        let role = {
            let mut state = lock_state(&self.refresh);
            if state.generation != sent_at {
                Role::Settled
            } else if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.pending.push(tx);
                Role::Wait(rx)
            } else {
                state.refreshing = true;
                Role::Lead
            }
        };

        match role {
            Role::Settled => self.session.token().await.ok_or(ClientError::SessionExpired),
            Role::Wait(rx) => rx.await.unwrap_or(Err(ClientError::SessionExpired)),
            Role::Lead => {
                let guard = RefreshGuard {
                    state: &self.refresh,
                    settled: false,
                };
                let outcome = self.run_refresh().await;
                if outcome.is_err() {
                    self.session.expire().await;
                }
                guard.settle(&outcome);
                outcome
            }
        }
    }

    // Talks to the transport directly so it can never re-enter `send`.
    async fn run_refresh(&self) -> RefreshOutcome {
        let res = match self.transport.send(ApiRequest::get(REFRESH_PATH)).await {
            Ok(res) => res,
            Err(e) => {
                warn!("Refresh request failed: {}", e);
                return Err(ClientError::SessionExpired);
            }
        };

        if let Err(e) = res.clone().error_for_status() {
            warn!("Refresh rejected: {}", e);
            return Err(ClientError::SessionExpired);
        }

        let body: SessionResponse = res.json().map_err(|e| {
            warn!("Refresh response unreadable: {}", e);
            ClientError::SessionExpired
        })?;

        self.session
            .set(body.token.clone(), body.user, SessionEvent::Refreshed)
            .await;
        Ok(body.token)
    }

    // ── Convenience calls ────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<Principal, ClientError> {
        let req = ApiRequest::post(LOGIN_PATH).json(&LoginData::new(email, password))?;
        let body: SessionResponse = self.send(req).await?.error_for_status()?.json()?;

        info!("Signed in as user {}", body.user.user_id);
        self.session
            .set(
                body.token,
                body.user.clone(),
                SessionEvent::SignedIn(body.user.clone()),
            )
            .await;
        Ok(body.user)
    }

    /// Best effort. Local state is cleared whatever the server says.
    pub async fn logout(&self) {
        if let Err(e) = self.transport.send(ApiRequest::post(LOGOUT_PATH)).await {
            warn!("Logout request failed: {}", e);
        }
        self.session.clear().await;
    }

    /// Revoke every session of the signed-in user, this one included.
    pub async fn logout_all(&self) -> Result<u64, ClientError> {
        let body: LogoutResponse = self
            .send(ApiRequest::post(LOGOUT_ALL_PATH))
            .await?
            .error_for_status()?
            .json()?;
        self.session.clear().await;
        Ok(body.revoked.unwrap_or(0))
    }

    pub async fn me(&self) -> Result<Principal, ClientError> {
        let body: MeResponse = self
            .send(ApiRequest::get(ME_PATH))
            .await?
            .error_for_status()?
            .json()?;
        Ok(body.user)
    }
}

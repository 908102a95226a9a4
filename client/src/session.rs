use tokio::sync::{RwLock, watch};

use shared::types::Principal;

/// Published on every change of the local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedOut,
    SignedIn(Principal),
    Refreshed,
    /// Refresh failed. The UI should send the user back to login.
    Expired,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    user: Option<Principal>,
    expired_notice: bool,
}

/// Current access token and user, plus a watch channel of `SessionEvent`s.
#[derive(Debug)]
pub struct SessionStore {
    state: RwLock<SessionState>,
    events: watch::Sender<SessionEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = watch::channel(SessionEvent::SignedOut);
        Self {
            state: RwLock::new(SessionState::default()),
            events,
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    pub async fn user(&self) -> Option<Principal> {
        self.state.read().await.user.clone()
    }

    pub async fn set(&self, token: String, user: Principal, event: SessionEvent) {
        {
            let mut state = self.state.write().await;
            state.token = Some(token);
            state.user = Some(user);
            state.expired_notice = false;
        }
        self.events.send_replace(event);
    }

    pub async fn clear(&self) {
        {
            let mut state = self.state.write().await;
            state.token = None;
            state.user = None;
        }
        self.events.send_replace(SessionEvent::SignedOut);
    }

    /// Clear the session and leave a one-shot "session expired" notice.
    pub async fn expire(&self) {
        {
            let mut state = self.state.write().await;
            state.token = None;
            state.user = None;
            state.expired_notice = true;
        }
        self.events.send_replace(SessionEvent::Expired);
    }

    /// Returns the pending expiry notice once, then `false`.
    pub async fn take_expired_notice(&self) -> bool {
        std::mem::take(&mut self.state.write().await.expired_notice)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

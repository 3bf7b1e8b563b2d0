//! Authenticated session: in-memory state mirrored to [`ClientStorage`].
//!
//! Only [`SessionStore`] mutates the session (login, logout, restore). Views
//! receive a [`SessionHandle`], a read-only projection with change
//! notifications. The transport's 401 interceptor is the one other writer:
//! it expires the session through [`SessionState::expire`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{ApiError, Result};
use crate::storage::ClientStorage;
use crate::transport::{Auth, Transport};
use crate::types::{Credentials, Session, User};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(User),
    Restored(User),
    LoggedOut,
    /// The backend rejected the token. Views should return to the login
    /// entry point.
    Expired,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub user: Option<User>,
    pub loading: bool,
}

pub(crate) struct SessionState {
    storage: Mutex<ClientStorage>,
    current: RwLock<Option<Session>>,
    view: watch::Sender<SessionView>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    pub(crate) fn new(storage: ClientStorage) -> Result<Arc<Self>> {
        let current = storage.session()?;
        let (view, _) = watch::channel(SessionView {
            user: current.as_ref().map(|s| s.user.clone()),
            loading: true,
        });
        let (events, _) = broadcast::channel(32);
        Ok(Arc::new(Self {
            storage: Mutex::new(storage),
            current: RwLock::new(current),
            view,
            events,
        }))
    }

    fn storage(&self) -> MutexGuard<'_, ClientStorage> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn token(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.token.clone())
    }

    fn user(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.user.clone())
    }

    fn stored_token(&self) -> Result<Option<String>> {
        Ok(self.storage().token()?.filter(|t| !t.is_empty()))
    }

    fn establish(&self, session: Session, event: SessionEvent) -> Result<()> {
        let mut storage = self.storage();
        storage.save_session(&session)?;
        let user = session.user.clone();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        drop(storage);

        self.view.send_modify(|v| v.user = Some(user));
        let _ = self.events.send(event);
        Ok(())
    }

    /// Drops the session from memory and storage. Returns whether anything
    /// was present.
    fn clear(&self) -> bool {
        self.clear_if(|_| true)
    }

    /// Clears only when `matches` accepts the current session. The check and
    /// the removal happen under the same locks `establish` takes.
    fn clear_if(&self, matches: impl FnOnce(Option<&Session>) -> bool) -> bool {
        let mut storage = self.storage();
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if !matches(current.as_ref()) {
            return false;
        }
        let had_memory = current.take().is_some();
        drop(current);
        let had_stored = match storage.clear_session() {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Failed to clear stored session");
                false
            }
        };
        drop(storage);

        self.view.send_modify(|v| v.user = None);
        had_memory || had_stored
    }

    /// Called by the transport when a request sent with `token` gets a 401.
    /// A late rejection of a token that has since been replaced is ignored.
    pub(crate) fn expire(&self, token: &str) {
        if self.clear_if(|current| current.is_some_and(|s| s.token == token)) {
            warn!("Session rejected by backend; cleared local session");
            let _ = self.events.send(SessionEvent::Expired);
        } else {
            debug!("Ignoring 401 for a session that is no longer current");
        }
    }

    fn set_loading(&self, loading: bool) {
        self.view.send_modify(|v| v.loading = loading);
    }
}

/// Read-only view of the session for embedding views.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<SessionState>,
}

impl SessionHandle {
    pub fn user(&self) -> Option<User> {
        self.state.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.token().is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.state.view.borrow().loading
    }

    pub fn snapshot(&self) -> SessionView {
        self.state.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.state.view.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.state.events.subscribe()
    }
}

pub struct SessionStore {
    state: Arc<SessionState>,
    transport: Arc<Transport>,
}

impl SessionStore {
    pub(crate) fn new(state: Arc<SessionState>, transport: Arc<Transport>) -> Self {
        Self { state, transport }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            state: self.state.clone(),
        }
    }

    /// Posts credentials and stores the resulting session. A rejected login
    /// leaves any existing session in place.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        info!(email = %credentials.email, "Logging in");
        let response: serde_json::Value = match self
            .transport
            .post_as("/auth/login", credentials, Auth::Anonymous)
            .await
        {
            Ok(body) => body,
            Err(ApiError::Http { status, message }) => {
                warn!(%status, "Login rejected");
                return Err(ApiError::Auth(message));
            }
            Err(e) => return Err(e),
        };

        let token = response
            .get("token")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Auth("invalid login response".into()))?;
        let user: User = serde_json::from_value(response)
            .map_err(|e| ApiError::Auth(format!("invalid login response: {e}")))?;

        self.state.establish(
            Session {
                token,
                user: user.clone(),
            },
            SessionEvent::LoggedIn(user.clone()),
        )?;
        info!(username = %user.username, role = ?user.role, "Logged in");
        Ok(user)
    }

    /// Validates a stored token against `/auth/me`. Never fails: any problem
    /// leaves the client logged out with storage cleared.
    pub async fn restore_session(&self) -> Option<User> {
        self.state.set_loading(true);
        let restored = self.try_restore().await;
        self.state.set_loading(false);
        restored
    }

    async fn try_restore(&self) -> Option<User> {
        let token = match self.state.stored_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No stored token; starting unauthenticated");
                self.state.clear();
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored token");
                self.state.clear();
                return None;
            }
        };

        let user: User = match self
            .transport
            .get_as("/auth/me", Auth::Bearer(token.clone()))
            .await
        {
            Ok(user) => user,
            Err(e) => {
                info!(error = %e, "Stored session is no longer valid");
                self.state.clear();
                return None;
            }
        };

        let session = Session {
            token,
            user: user.clone(),
        };
        if let Err(e) = self
            .state
            .establish(session, SessionEvent::Restored(user.clone()))
        {
            warn!(error = %e, "Failed to persist restored session");
            self.state.clear();
            return None;
        }
        info!(username = %user.username, "Session restored");
        Some(user)
    }

    /// Notifies the backend (best effort) and always clears local state.
    pub async fn logout(&self) {
        if let Some(token) = self.state.token() {
            let result: Result<serde_json::Value> = self
                .transport
                .post_as("/auth/logout", &serde_json::json!({}), Auth::Bearer(token))
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Logout request failed; clearing local session anyway");
            }
        }
        self.state.clear();
        let _ = self.state.events.send(SessionEvent::LoggedOut);
        info!("Logged out");
    }
}

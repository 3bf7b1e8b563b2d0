//! Client for the AMAN device-management backend: HTTP transport with a
//! session-expiring 401 interceptor, a persisted session store, typed
//! endpoint wrappers and cancellable pollers for views.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod poll;
pub mod retry;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

pub use api::Api;
pub use config::Config;
pub use error::{ApiError, Result};
pub use poll::{spawn_poller, PollHandle, PollSnapshot};
pub use retry::RetryPolicy;
pub use session::{SessionEvent, SessionHandle, SessionStore, SessionView};
pub use storage::ClientStorage;
pub use types::*;

use session::SessionState;
use transport::Transport;

/// Composition root. Owns the session and hands views the API plus a
/// read-only session projection.
pub struct AmanClient {
    config: Config,
    session: SessionStore,
    api: Api,
}

impl AmanClient {
    pub fn new(config: Config) -> Result<Self> {
        let storage = ClientStorage::open(&config.session_db)?;
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: Config, storage: ClientStorage) -> Result<Self> {
        let state = SessionState::new(storage)?;
        let transport = Arc::new(Transport::new(&config, state.clone())?);
        let retry = RetryPolicy::from_config(&config);
        Ok(Self {
            session: SessionStore::new(state, transport.clone()),
            api: Api::new(transport, retry),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.session.handle()
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn poll_registered_devices(&self) -> PollHandle<Vec<Device>> {
        let api = self.api.clone();
        spawn_poller(
            "registered_devices",
            Duration::from_secs(self.config.device_poll_secs),
            move || {
                let api = api.clone();
                async move { api.fetch_registered_devices().await }
            },
        )
    }

    pub fn poll_available_devices(&self) -> PollHandle<AvailableDevices> {
        let api = self.api.clone();
        spawn_poller(
            "available_devices",
            Duration::from_secs(self.config.device_poll_secs),
            move || {
                let api = api.clone();
                async move { api.fetch_available_devices().await }
            },
        )
    }

    pub fn poll_device_jobs(&self, device_id: &str, query: JobQuery) -> PollHandle<Vec<Job>> {
        let api = self.api.clone();
        let device_id = device_id.to_string();
        spawn_poller(
            "device_jobs",
            Duration::from_secs(self.config.job_poll_secs),
            move || {
                let api = api.clone();
                let device_id = device_id.clone();
                async move { api.fetch_device_jobs(&device_id, query).await }
            },
        )
    }

    pub fn poll_unread_notifications(&self, start: u32, limit: u32) -> PollHandle<NotificationPage> {
        let api = self.api.clone();
        spawn_poller(
            "unread_notifications",
            Duration::from_secs(self.config.notification_poll_secs),
            move || {
                let api = api.clone();
                async move { api.fetch_unread_notifications(start, limit).await }
            },
        )
    }

    pub fn poll_water_parameters(&self, n: u32) -> PollHandle<Vec<WaterParameterSample>> {
        let api = self.api.clone();
        spawn_poller(
            "water_parameters",
            Duration::from_secs(self.config.water_poll_secs),
            move || {
                let api = api.clone();
                async move { api.get_nth_water_parameters(n).await }
            },
        )
    }
}

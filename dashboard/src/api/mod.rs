//! One function per backend endpoint. Reads go through the retry policy;
//! mutations are sent exactly once.

mod devices;
mod feeding;
mod inference;
mod jobs;
mod notifications;
mod users;
mod water;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

#[derive(Clone)]
pub struct Api {
    transport: Arc<Transport>,
    retry: RetryPolicy,
}

impl Api {
    pub(crate) fn new(transport: Arc<Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// `/device/{id}/{leaf}` with the id encoded as a single segment.
    fn device_path(&self, device_id: &str, leaf: &str) -> String {
        self.transport.path(&["device", device_id, leaf])
    }

    async fn read<T: DeserializeOwned>(&self, operation: &str, path: &str) -> Result<T> {
        let transport = &self.transport;
        self.retry.run(operation, move || transport.get(path)).await
    }

    async fn read_with_query<T, Q>(&self, operation: &str, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let transport = &self.transport;
        self.retry
            .run(operation, move || transport.get_with_query(path, query))
            .await
    }
}

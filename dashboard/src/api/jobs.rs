use tracing::info;

use super::Api;
use crate::error::{ApiError, Result};
use crate::types::{CommandRequest, DeviceCommand, Job, JobQuery};

impl Api {
    /// Queues a command on the device. Completion is observed by polling
    /// [`Api::fetch_device_jobs`]; the call is never retried.
    pub async fn send_device_command(&self, device_id: &str, command: &str) -> Result<Job> {
        let command = DeviceCommand::new(command)?;
        let path = self.device_path(device_id, "jobs");
        let reply: serde_json::Value = self
            .transport
            .post(&path, &CommandRequest { command: &command })
            .await?;
        let job = Job::from_command_reply(reply).map_err(|e| {
            ApiError::Decode(format!(
                "command {} was accepted by {device_id} but the reply has no job: {e}",
                command.as_str()
            ))
        })?;
        info!(device_id, command = command.as_str(), job_id = %job.id, "Command queued");
        Ok(job)
    }

    pub async fn fetch_device_jobs(&self, device_id: &str, query: JobQuery) -> Result<Vec<Job>> {
        let path = self.device_path(device_id, "jobs");
        self.read_with_query("fetch_device_jobs", &path, &query)
            .await
    }
}

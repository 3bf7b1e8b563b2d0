use tracing::{debug, info};

use super::Api;
use crate::error::Result;
use crate::types::{Ack, FeedingSchedule, FeedingScheduleEnvelope};

impl Api {
    /// Falls back to [`FeedingSchedule::default`] when the device has none.
    pub async fn get_device_feeding_schedule(&self, device_id: &str) -> Result<FeedingSchedule> {
        let path = self.device_path(device_id, "feeding-schedule");
        let envelope: Option<FeedingScheduleEnvelope> =
            self.read("get_device_feeding_schedule", &path).await?;
        match envelope.and_then(|e| e.response).and_then(|r| r.schedule) {
            Some(schedule) => Ok(schedule),
            None => {
                debug!(device_id, "No feeding schedule stored; using default");
                Ok(FeedingSchedule::default())
            }
        }
    }

    /// Replaces the device's schedule wholesale.
    pub async fn set_device_feeding_schedule(&self, device_id: &str, schedule: &FeedingSchedule) -> Result<Ack> {
        let path = self.device_path(device_id, "feeding-schedule");
        let ack = self.transport.put(&path, schedule).await?;
        info!(
            device_id,
            minute_interval = schedule.habit.minute_interval,
            start = %schedule.start_time,
            end = %schedule.end_time,
            "Feeding schedule saved"
        );
        Ok(ack)
    }
}

use tracing::info;

use super::Api;
use crate::error::Result;
use crate::types::{Ack, AvailableDevices, Device, DeviceIdBody};

impl Api {
    pub async fn fetch_registered_devices(&self) -> Result<Vec<Device>> {
        self.read("fetch_registered_devices", "/devices").await
    }

    pub async fn fetch_available_devices(&self) -> Result<AvailableDevices> {
        self.read("fetch_available_devices", "/get_available_devices")
            .await
    }

    /// Pairs an available device. The server's reason is surfaced when the
    /// device cannot be claimed.
    pub async fn confirm_device(&self, device_id: &str) -> Result<Ack> {
        let ack = self
            .transport
            .post("/confirm_device", &DeviceIdBody { device_id })
            .await?;
        info!(device_id, "Device confirmed");
        Ok(ack)
    }

    pub async fn remove_device(&self, device_id: &str) -> Result<Ack> {
        let ack = self
            .transport
            .delete_with_body("/remove_device", &DeviceIdBody { device_id })
            .await?;
        info!(device_id, "Device removed");
        Ok(ack)
    }

    /// Stream URL for an image/video element. No request is made.
    pub fn fetch_device_camera_url(&self, device_id: &str) -> String {
        self.transport.url(&self.device_path(device_id, "camera"))
    }
}

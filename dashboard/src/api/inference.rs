use super::Api;
use crate::error::Result;
use crate::types::ProcessedImage;

pub const FRAME_CONTENT_TYPE: &str = "image/jpeg";

impl Api {
    /// Uploads one captured JPEG frame and returns the annotated image.
    pub async fn process_current_frame(&self, frame: Vec<u8>) -> Result<ProcessedImage> {
        self.transport
            .post_bytes("/model/process-frame", FRAME_CONTENT_TYPE, frame)
            .await
    }

    pub async fn fetch_model_inference(&self, device_id: &str) -> Result<ProcessedImage> {
        let path = self.device_path(device_id, "model-inference");
        self.transport.get_bytes(&path).await
    }
}

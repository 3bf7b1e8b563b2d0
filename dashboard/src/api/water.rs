use super::Api;
use crate::error::Result;
use crate::types::WaterParameterSample;

impl Api {
    pub async fn fetch_latest_water_parameters(&self) -> Result<Option<WaterParameterSample>> {
        self.read("fetch_latest_water_parameters", "/water-parameters/latest")
            .await
    }

    /// The `n` most recent samples, in the order the server sends them.
    pub async fn get_nth_water_parameters(&self, n: u32) -> Result<Vec<WaterParameterSample>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let path = format!("/water-parameters/latest/{n}");
        self.read("get_nth_water_parameters", &path).await
    }
}

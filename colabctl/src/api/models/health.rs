use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GpuAvailability {
    pub available: usize,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since the service started
    pub uptime_seconds: u64,
    pub gpus: GpuAvailability,
}

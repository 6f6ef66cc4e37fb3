use crate::rate_limit::types::Algorithm;
use serde::{Deserialize, Serialize};

/// Body of `POST /rate-limit/check`; omitted fields take configured defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub identifier: String,
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub window_seconds: Option<f64>,
}

/// Query of `GET /rate-limit/status/{identifier}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusQuery {
    pub algorithm: Option<Algorithm>,
    pub limit: Option<u64>,
    pub window_seconds: Option<f64>,
}

/// Query of `DELETE /rate-limit/reset/{identifier}`; no algorithm resets all
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResetQuery {
    pub algorithm: Option<Algorithm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub message: String,
    pub cleared: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub store_connected: bool,
    pub version: String,
}

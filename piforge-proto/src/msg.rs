use serde::{Deserialize, Serialize};

use crate::StatusPayload;

/// Messages pushed from server to websocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum ServerMessage {
    Status(StatusPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResp {
    pub ok: bool,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsResp {
    pub uptime_ms: u64,
    pub request_count: u64,
    pub endpoints: EndpointCounts,
}

/// Per-route hit counts, keyed by route path on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCounts {
    #[serde(rename = "/api/status")]
    pub api_status: u64,
    #[serde(rename = "/healthz")]
    pub healthz: u64,
    #[serde(rename = "/api/metrics")]
    pub api_metrics: u64,
    #[serde(rename = "/")]
    pub dashboard: u64,
}

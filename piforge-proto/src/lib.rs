use serde::{Deserialize, Serialize};

pub mod msg;
pub mod ws;

pub const STATUS_ONLINE: &str = "online";

pub const DEFAULT_SERVICE: &str = "Quantum Pi Forge";
pub const DEFAULT_ENGINE: &str = "Gargoura Active";
pub const DEFAULT_NETWORK: &str = "Pi Mainnet";

/// Identity part of a status report. Served as-is by `/api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub service: String,
    pub engine: String,
    pub network: String,
}

impl ServiceStatus {
    pub fn online(
        service: impl Into<String>,
        engine: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        ServiceStatus {
            status: STATUS_ONLINE.to_owned(),
            service: service.into(),
            engine: engine.into(),
            network: network.into(),
        }
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        ServiceStatus::online(DEFAULT_SERVICE, DEFAULT_ENGINE, DEFAULT_NETWORK)
    }
}

/// Status report pushed over the websocket, stamped with Unix epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(flatten)]
    pub service: ServiceStatus,
    pub ts: i64,
}

#[cfg(feature = "time")]
impl StatusPayload {
    pub fn now(service: ServiceStatus) -> Self {
        let ts = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;

        StatusPayload {
            service,
            ts: ts as i64,
        }
    }
}

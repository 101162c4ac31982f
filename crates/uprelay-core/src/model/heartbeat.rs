// ── Heartbeat domain type ──

use serde::Serialize;
use strum::Display;

use super::{Entity, MonitorId};

/// Upstream status codes 0..=3. Anything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HeartbeatStatus {
    Down,
    Up,
    Pending,
    Maintenance,
    Unknown,
}

impl From<u8> for HeartbeatStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Down,
            1 => Self::Up,
            2 => Self::Pending,
            3 => Self::Maintenance,
            _ => Self::Unknown,
        }
    }
}

/// Last known liveness sample of one monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub monitor_id: MonitorId,
    pub status: HeartbeatStatus,
    /// Milliseconds, when the check measured one.
    #[serde(rename = "responseTime", skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Upstream timestamp, as sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Status changed with this sample.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub important: bool,
}

impl Entity for Heartbeat {
    fn entity_id(&self) -> &MonitorId {
        &self.monitor_id
    }
}

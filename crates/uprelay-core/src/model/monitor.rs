// ── Monitor domain type ──

use serde::Serialize;
use strum::Display;

use super::{Entity, MonitorId};

/// Whether the upstream is running checks for a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MonitorStatus {
    Active,
    Paused,
}

impl From<bool> for MonitorStatus {
    fn from(active: bool) -> Self {
        if active { Self::Active } else { Self::Paused }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A monitor as subscribers see it: flat, with a derived `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: MonitorId,
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub url: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    /// Seconds between checks.
    pub interval: Option<u32>,
    /// Seconds.
    pub timeout: Option<f64>,
    pub max_retries: Option<u32>,
    pub retry_interval: Option<u32>,
    pub accepted_status_codes: Vec<String>,
    pub active: bool,
    pub status: MonitorStatus,
    pub tags: Vec<Tag>,
}

impl Entity for Monitor {
    fn entity_id(&self) -> &MonitorId {
        &self.id
    }
}

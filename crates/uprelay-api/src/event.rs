//! Typed upstream events.
//!
//! Every event name the relay understands gets its own variant; anything
//! else decodes to [`UpstreamEvent::Unknown`] so new upstream event kinds
//! flow through without breaking dispatch.

use std::fmt;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{EnumString, IntoStaticStr};

use crate::codec::DecodedEvent;
use crate::error::Error;

// ── EntityId ─────────────────────────────────────────────────────────

/// Identifier of an upstream entity (monitor, status page, incident, ...).
///
/// The backend uses integer row ids, but ids arrive as strings often
/// enough that both forms are accepted. The original form is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Numeric(u64),
    Text(String),
}

impl EntityId {
    /// Key used by the in-memory mirror; `1` and `"1"` collapse to the same key.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// JSON form to put on the wire when addressing this entity.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Numeric(n) => Value::from(*n),
            Self::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for EntityId {
    fn from(n: u64) -> Self {
        Self::Numeric(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Monitors are the entity most callers address by id.
pub type MonitorId = EntityId;

// ── Wire payloads ────────────────────────────────────────────────────

/// A monitor as the backend broadcasts it in `monitorList`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMonitor {
    pub id: MonitorId,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub monitor_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(rename = "maxretries", default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_interval: Option<u32>,
    #[serde(
        rename = "accepted_statuscodes",
        default,
        deserialize_with = "nullable"
    )]
    pub accepted_status_codes: Vec<String>,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub active: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<RawTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTag {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A single liveness sample.
///
/// `status`: 0 down, 1 up, 2 pending, 3 maintenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHeartbeat {
    #[serde(rename = "monitorID", alias = "monitorId", alias = "monitor_id")]
    pub monitor_id: MonitorId,
    pub status: u8,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "millis")]
    pub ping: Option<u64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStatusPage {
    pub id: EntityId,
    #[serde(default, deserialize_with = "nullable")]
    pub slug: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub published: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub domain_name_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIncident {
    pub id: EntityId,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub pin: bool,
    #[serde(default)]
    pub status_page_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMaintenance {
    pub id: EntityId,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default = "default_true", deserialize_with = "lenient_bool")]
    pub active: bool,
    #[serde(default)]
    pub status: Option<String>,
}

// ── UpstreamEvent ────────────────────────────────────────────────────

/// Event names the relay understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum EventName {
    LoginRequired,
    AutoLogin,
    Info,
    MonitorList,
    UpdateMonitorIntoList,
    DeleteMonitorFromList,
    Heartbeat,
    HeartbeatList,
    AvgPing,
    Uptime,
    CertInfo,
    StatusPageList,
    MaintenanceList,
    IncidentList,
    NotificationList,
}

/// A decoded, typed upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    LoginRequired,
    AutoLogin,
    Info(Value),
    MonitorList(Vec<RawMonitor>),
    UpdateMonitorIntoList(Vec<RawMonitor>),
    DeleteMonitorFromList(MonitorId),
    Heartbeat(RawHeartbeat),
    HeartbeatList {
        monitor_id: MonitorId,
        heartbeats: Vec<RawHeartbeat>,
        overwrite: bool,
    },
    AvgPing {
        monitor_id: MonitorId,
        avg_ping: Option<f64>,
    },
    Uptime {
        monitor_id: MonitorId,
        period: Value,
        uptime: Option<f64>,
    },
    CertInfo {
        monitor_id: MonitorId,
        cert_info: Value,
    },
    StatusPageList(Vec<RawStatusPage>),
    MaintenanceList(Vec<RawMaintenance>),
    IncidentList(Vec<RawIncident>),
    NotificationList(Vec<Value>),
    /// Any event name not listed above.
    Unknown { name: String },
}

impl UpstreamEvent {
    /// Type a decoded frame.
    ///
    /// Unknown names are not an error. A known name with a payload of the
    /// wrong shape is, and the caller drops the frame.
    pub fn from_decoded(decoded: DecodedEvent) -> Result<Self, Error> {
        let DecodedEvent {
            name,
            payload,
            extra,
        } = decoded;

        let Ok(kind) = name.parse::<EventName>() else {
            return Ok(Self::Unknown { name });
        };

        let mut extra = extra.into_iter();
        let mut next_arg = move || extra.next().unwrap_or(Value::Null);

        let event = match kind {
            EventName::LoginRequired => Ok(Self::LoginRequired),
            EventName::AutoLogin => Ok(Self::AutoLogin),
            EventName::Info => Ok(Self::Info(payload)),
            EventName::MonitorList => keyed_list(payload).map(Self::MonitorList),
            EventName::UpdateMonitorIntoList => {
                keyed_list(payload).map(Self::UpdateMonitorIntoList)
            }
            EventName::DeleteMonitorFromList => {
                serde_json::from_value(payload).map(Self::DeleteMonitorFromList)
            }
            EventName::Heartbeat => serde_json::from_value(payload).map(Self::Heartbeat),
            EventName::HeartbeatList => {
                serde_json::from_value(payload).and_then(|monitor_id| {
                    let heartbeats = keyed_list(next_arg())?;
                    let overwrite = next_arg().as_bool().unwrap_or(false);
                    Ok(Self::HeartbeatList {
                        monitor_id,
                        heartbeats,
                        overwrite,
                    })
                })
            }
            EventName::AvgPing => serde_json::from_value(payload).map(|monitor_id| Self::AvgPing {
                monitor_id,
                avg_ping: next_arg().as_f64(),
            }),
            EventName::Uptime => serde_json::from_value(payload).map(|monitor_id| Self::Uptime {
                monitor_id,
                period: next_arg(),
                uptime: next_arg().as_f64(),
            }),
            EventName::CertInfo => {
                serde_json::from_value(payload).map(|monitor_id| Self::CertInfo {
                    monitor_id,
                    cert_info: cert_info_value(next_arg()),
                })
            }
            EventName::StatusPageList => keyed_list(payload).map(Self::StatusPageList),
            EventName::MaintenanceList => keyed_list(payload).map(Self::MaintenanceList),
            EventName::IncidentList => keyed_list(payload).map(Self::IncidentList),
            EventName::NotificationList => keyed_list(payload).map(Self::NotificationList),
        };

        event.map_err(|e| Error::Deserialization {
            event: name,
            message: e.to_string(),
        })
    }

    /// Wire name of this event.
    pub fn name(&self) -> &str {
        let kind = match self {
            Self::Unknown { name } => return name,
            Self::LoginRequired => EventName::LoginRequired,
            Self::AutoLogin => EventName::AutoLogin,
            Self::Info(_) => EventName::Info,
            Self::MonitorList(_) => EventName::MonitorList,
            Self::UpdateMonitorIntoList(_) => EventName::UpdateMonitorIntoList,
            Self::DeleteMonitorFromList(_) => EventName::DeleteMonitorFromList,
            Self::Heartbeat(_) => EventName::Heartbeat,
            Self::HeartbeatList { .. } => EventName::HeartbeatList,
            Self::AvgPing { .. } => EventName::AvgPing,
            Self::Uptime { .. } => EventName::Uptime,
            Self::CertInfo { .. } => EventName::CertInfo,
            Self::StatusPageList(_) => EventName::StatusPageList,
            Self::MaintenanceList(_) => EventName::MaintenanceList,
            Self::IncidentList(_) => EventName::IncidentList,
            Self::NotificationList(_) => EventName::NotificationList,
        };
        let name: &'static str = kind.into();
        name
    }
}

// ── Serde helpers ────────────────────────────────────────────────────

/// Lists arrive either as `{"<id>": {...}}` maps or as plain arrays.
fn keyed_list<T: DeserializeOwned>(payload: Value) -> Result<Vec<T>, serde_json::Error> {
    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => map.into_values().map(serde_json::from_value).collect(),
        other => serde_json::from_value(other),
    }
}

/// The backend sends certificate info as a JSON-encoded string.
fn cert_info_value(raw: Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

fn default_true() -> bool {
    true
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// SQLite-backed flags come through as `0`/`1` as often as `true`/`false`.
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u64))
}

// ── Tests ────────────────────────────────────────────────────────────

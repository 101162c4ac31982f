// ── Outbound envelopes ──
//
// The only shape subscribers ever see: `{type, data, timestamp}`, one JSON
// object per message. `transform` maps each upstream event kind to exactly
// one envelope type and reads list views back from the mirror so
// subscribers always get the merged state, not the raw delta.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use strum::{Display, IntoStaticStr};
use tracing::debug;

use uprelay_api::UpstreamEvent;

use crate::model::{Heartbeat, HeartbeatStatus};
use crate::store::StateMirror;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EnvelopeType {
    MonitorUp,
    MonitorDown,
    MonitorPending,
    MonitorMaintenance,
    MonitorsUpdated,
    MonitorDeleted,
    HeartbeatHistory,
    MonitorAvgPing,
    MonitorUptime,
    MonitorCertInfo,
    StatusPagesUpdated,
    MaintenanceUpdated,
    IncidentsUpdated,
    NotificationsUpdated,
    ServerInfo,
    ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl OutboundEnvelope {
    pub fn new(kind: EnvelopeType, data: Value) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }

    /// `connected`: authenticated upstream. `upstream_connected`: transport up.
    pub fn connection_status(connected: bool, upstream_connected: bool) -> Self {
        Self::new(
            EnvelopeType::ConnectionStatus,
            json!({ "connected": connected, "upstreamConnected": upstream_connected }),
        )
    }

    /// Serialize once; every subscriber gets the same `Arc<str>`.
    pub fn to_text(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

// ── Transformation ──────────────────────────────────────────────────

/// Map one upstream event to its envelope. Call after the mirror has
/// applied the event. `None` for events subscribers never see.
pub fn transform(event: &UpstreamEvent, mirror: &StateMirror) -> Option<OutboundEnvelope> {
    let (kind, data) = match event {
        UpstreamEvent::Heartbeat(raw) => {
            let beat = Heartbeat::from(raw.clone());
            let kind = match beat.status {
                HeartbeatStatus::Down => EnvelopeType::MonitorDown,
                HeartbeatStatus::Up => EnvelopeType::MonitorUp,
                HeartbeatStatus::Pending => EnvelopeType::MonitorPending,
                HeartbeatStatus::Maintenance => EnvelopeType::MonitorMaintenance,
                HeartbeatStatus::Unknown => {
                    debug!(monitor = %beat.monitor_id, code = raw.status, "heartbeat with unknown status code");
                    return None;
                }
            };
            (kind, to_value(&beat))
        }
        UpstreamEvent::MonitorList(_) | UpstreamEvent::UpdateMonitorIntoList(_) => {
            (EnvelopeType::MonitorsUpdated, to_value(&*mirror.monitors()))
        }
        UpstreamEvent::DeleteMonitorFromList(id) => {
            (EnvelopeType::MonitorDeleted, json!({ "monitorId": id }))
        }
        UpstreamEvent::HeartbeatList {
            monitor_id,
            heartbeats,
            ..
        } => {
            let latest = heartbeats
                .iter()
                .max_by(|a, b| a.time.cmp(&b.time))
                .map(|raw| Heartbeat::from(raw.clone()));
            (
                EnvelopeType::HeartbeatHistory,
                json!({ "monitorId": monitor_id, "count": heartbeats.len(), "latest": latest }),
            )
        }
        UpstreamEvent::AvgPing {
            monitor_id,
            avg_ping,
        } => (
            EnvelopeType::MonitorAvgPing,
            json!({ "monitorId": monitor_id, "avgPing": avg_ping }),
        ),
        UpstreamEvent::Uptime {
            monitor_id,
            period,
            uptime,
        } => (
            EnvelopeType::MonitorUptime,
            json!({ "monitorId": monitor_id, "period": period, "uptime": uptime }),
        ),
        UpstreamEvent::CertInfo {
            monitor_id,
            cert_info,
        } => (
            EnvelopeType::MonitorCertInfo,
            json!({ "monitorId": monitor_id, "certInfo": cert_info }),
        ),
        UpstreamEvent::StatusPageList(_) => (
            EnvelopeType::StatusPagesUpdated,
            to_value(&*mirror.status_pages()),
        ),
        UpstreamEvent::MaintenanceList(_) => (
            EnvelopeType::MaintenanceUpdated,
            to_value(&*mirror.maintenance()),
        ),
        UpstreamEvent::IncidentList(_) => {
            (EnvelopeType::IncidentsUpdated, to_value(&*mirror.incidents()))
        }
        UpstreamEvent::NotificationList(list) => (
            EnvelopeType::NotificationsUpdated,
            Value::Array(list.iter().map(notification_summary).collect()),
        ),
        UpstreamEvent::Info(info) => (EnvelopeType::ServerInfo, info.clone()),
        UpstreamEvent::LoginRequired | UpstreamEvent::AutoLogin => return None,
        UpstreamEvent::Unknown { name } => {
            debug!(event = %name, "dropping unknown upstream event");
            return None;
        }
    };
    Some(OutboundEnvelope::new(kind, data))
}

/// Notification configs carry provider secrets; only the identity goes out.
fn notification_summary(raw: &Value) -> Value {
    json!({
        "id": raw.get("id"),
        "name": raw.get("name"),
        "active": raw.get("active").is_none_or(is_truthy),
        "isDefault": raw.get("isDefault").is_some_and(is_truthy),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ── Wire-to-domain conversions ──
//
// Bridges the raw `uprelay_api` payloads into the canonical model. Each
// `From` impl renames fields, derives computed ones (monitor `status`,
// heartbeat status names) and fills defaults for missing data.

use uprelay_api::event::{
    RawHeartbeat, RawIncident, RawMaintenance, RawMonitor, RawStatusPage, RawTag,
};

use crate::model::{
    Heartbeat, HeartbeatStatus, Incident, Maintenance, Monitor, MonitorStatus, StatusPage, Tag,
};

impl From<RawTag> for Tag {
    fn from(raw: RawTag) -> Self {
        Self {
            name: raw.name,
            color: raw.color,
            value: raw.value.filter(|v| !v.is_empty()),
        }
    }
}

impl From<RawMonitor> for Monitor {
    fn from(raw: RawMonitor) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            monitor_type: raw.monitor_type,
            url: raw.url.filter(|u| !u.is_empty() && u != "https://"),
            hostname: raw.hostname.filter(|h| !h.is_empty()),
            port: raw.port,
            interval: raw.interval,
            timeout: raw.timeout,
            max_retries: raw.max_retries,
            retry_interval: raw.retry_interval,
            accepted_status_codes: raw.accepted_status_codes,
            active: raw.active,
            status: MonitorStatus::from(raw.active),
            tags: raw.tags.into_iter().map(Tag::from).collect(),
        }
    }
}

impl From<RawHeartbeat> for Heartbeat {
    fn from(raw: RawHeartbeat) -> Self {
        Self {
            monitor_id: raw.monitor_id,
            status: HeartbeatStatus::from(raw.status),
            response_time_ms: raw.ping,
            message: raw.msg.filter(|m| !m.is_empty()),
            time: raw.time,
            important: raw.important,
        }
    }
}

impl From<RawStatusPage> for StatusPage {
    fn from(raw: RawStatusPage) -> Self {
        Self {
            id: raw.id,
            slug: raw.slug,
            title: raw.title,
            description: raw.description,
            theme: raw.theme,
            published: raw.published,
            domain_names: raw.domain_name_list,
        }
    }
}

impl From<RawIncident> for Incident {
    fn from(raw: RawIncident) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            content: raw.content,
            style: raw.style.unwrap_or_else(|| "primary".into()),
            pinned: raw.pin,
            status_page_id: raw.status_page_id,
        }
    }
}

impl From<RawMaintenance> for Maintenance {
    fn from(raw: RawMaintenance) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            description: raw.description.filter(|d| !d.is_empty()),
            strategy: raw.strategy.unwrap_or_else(|| "manual".into()),
            active: raw.active,
            status: raw.status,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn paused_monitor_gets_paused_status() {
        let raw: RawMonitor = serde_json::from_value(json!({
            "id": 4,
            "name": "api",
            "type": "http",
            "url": "https://api.example.com/health",
            "active": 0,
            "accepted_statuscodes": ["200-299"],
            "tags": [{ "name": "prod", "color": "#f00", "value": "" }],
        }))
        .unwrap();

        let monitor = Monitor::from(raw);
        assert!(!monitor.active);
        assert_eq!(monitor.status, MonitorStatus::Paused);
        assert_eq!(monitor.tags[0].value, None);
        assert_eq!(
            serde_json::to_value(&monitor).unwrap()["status"],
            json!("paused")
        );
    }

    #[test]
    fn placeholder_url_is_dropped() {
        let raw: RawMonitor =
            serde_json::from_value(json!({ "id": 1, "type": "ping", "url": "https://", "hostname": "10.0.0.1" }))
                .unwrap();
        let monitor = Monitor::from(raw);
        assert_eq!(monitor.url, None);
        assert_eq!(monitor.hostname.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn heartbeat_serializes_compactly() {
        let raw: RawHeartbeat =
            serde_json::from_value(json!({ "monitorID": "m1", "status": 1, "ping": 42, "msg": "" }))
                .unwrap();
        assert_eq!(
            serde_json::to_value(Heartbeat::from(raw)).unwrap(),
            json!({ "monitorId": "m1", "status": "up", "responseTime": 42 })
        );
    }
}

// ── Upstream commands ──
//
// Every write the relay can issue against the backend. Each variant knows
// its wire event name and builds its payload with all optional fields
// resolved to concrete defaults; the backend never sees a missing field
// it expects a value for.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::codec;
use crate::event::{EntityId, MonitorId};

pub const DEFAULT_INTERVAL_SECS: u32 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 0;
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;
pub const DEFAULT_ACCEPTED_STATUS_CODES: &str = "200-299";
pub const DEFAULT_TAG_COLOR: &str = "#4B5563";

// ── Monitor ────────────────────────────────────────────────────────

/// Monitor definition for create/update. Unset fields get backend defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorRequest {
    pub name: String,
    /// `http`, `keyword`, `port`, `ping`, `dns`, ... Default: `http`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Seconds between checks. Default: 60.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Request timeout in seconds. Default: 80% of the interval (48s at 60s).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    /// Default: 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Default: the check interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<u32>,
    /// Default: `["200-299"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_status_codes: Option<Vec<String>>,
    /// Default: `GET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_ids: Option<Vec<u64>>,
}

/// The monitor exactly as the backend's `add` / `editMonitor` handlers expect it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMonitor<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    name: &'a str,
    #[serde(rename = "type")]
    monitor_type: &'a str,
    url: &'a str,
    hostname: Option<&'a str>,
    port: Option<u16>,
    interval: u32,
    timeout: f64,
    #[serde(rename = "maxretries")]
    max_retries: u32,
    retry_interval: u32,
    resend_interval: u32,
    #[serde(rename = "accepted_statuscodes")]
    accepted_status_codes: Vec<String>,
    method: &'a str,
    keyword: Option<&'a str>,
    #[serde(rename = "notificationIDList")]
    notification_id_list: Map<String, Value>,
    ignore_tls: bool,
    upside_down: bool,
    #[serde(rename = "maxredirects")]
    max_redirects: u32,
    active: bool,
}

impl MonitorRequest {
    /// Resolve defaults and build the wire payload.
    pub fn to_wire(&self, id: Option<&MonitorId>) -> Value {
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL_SECS);
        let wire = WireMonitor {
            id: id.map(EntityId::to_value),
            name: &self.name,
            monitor_type: self.monitor_type.as_deref().unwrap_or("http"),
            url: self.url.as_deref().unwrap_or("https://"),
            hostname: self.hostname.as_deref(),
            port: self.port,
            interval,
            timeout: self.timeout.unwrap_or_else(|| default_timeout(interval)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_interval: self.retry_interval.unwrap_or(interval),
            resend_interval: 0,
            accepted_status_codes: self
                .accepted_status_codes
                .clone()
                .unwrap_or_else(|| vec![DEFAULT_ACCEPTED_STATUS_CODES.to_owned()]),
            method: self.method.as_deref().unwrap_or("GET"),
            keyword: self.keyword.as_deref(),
            notification_id_list: self
                .notification_ids
                .iter()
                .flatten()
                .map(|id| (id.to_string(), Value::Bool(true)))
                .collect(),
            ignore_tls: false,
            upside_down: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            active: true,
        };
        serde_json::to_value(wire).unwrap_or(Value::Null)
    }
}

/// The backend's own rule: timeout is 80% of the interval.
fn default_timeout(interval: u32) -> f64 {
    f64::from(interval) * 4.0 / 5.0
}

// ── Status page ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPageRequest {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `light`, `dark` or `auto`. Default: `auto`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Default: true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_names: Option<Vec<String>>,
    /// Monitor groups shown on the page, passed through as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_groups: Option<Vec<Value>>,
}

impl StatusPageRequest {
    fn to_wire(&self) -> Value {
        json!({
            "slug": self.slug,
            "config": {
                "slug": self.slug,
                "title": self.title,
                "description": self.description,
                "theme": self.theme.as_deref().unwrap_or("auto"),
                "published": self.published.unwrap_or(true),
                "showTags": false,
                "domainNameList": self.domain_names.clone().unwrap_or_default(),
                "footerText": null,
                "customCSS": "",
            },
            "imgDataUrl": "/icon.svg",
            "publicGroupList": self.public_groups.clone().unwrap_or_default(),
        })
    }
}

// ── Notification ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub name: String,
    /// Provider key, e.g. `slack`, `webhook`, `smtp`.
    pub provider: String,
    /// Default: false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    /// Default: false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_existing: Option<bool>,
    /// Provider-specific settings, merged into the payload.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl NotificationRequest {
    fn notification(&self) -> Value {
        let mut body = self.settings.clone();
        body.insert("name".into(), Value::from(self.name.as_str()));
        body.insert("type".into(), Value::from(self.provider.as_str()));
        body.insert("isDefault".into(), Value::Bool(self.is_default.unwrap_or(false)));
        body.insert(
            "applyExisting".into(),
            Value::Bool(self.apply_existing.unwrap_or(false)),
        );
        Value::Object(body)
    }
}

// ── Maintenance ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `manual`, `single`, `recurring-interval`, `cron`, ... Default: `manual`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// `[start, end]` ISO timestamps for `single`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Minutes. Default: 60.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl MaintenanceRequest {
    fn to_wire(&self, id: Option<&EntityId>) -> Value {
        let mut wire = json!({
            "title": self.title,
            "description": self.description.as_deref().unwrap_or(""),
            "strategy": self.strategy.as_deref().unwrap_or("manual"),
            "active": true,
            "intervalDay": 1,
            "dateRange": self.date_range.clone().unwrap_or_default(),
            "cron": self.cron.as_deref().unwrap_or("30 3 * * *"),
            "durationMinutes": self.duration_minutes.unwrap_or(60),
            "timeRange": [{ "hours": 2, "minutes": 0 }, { "hours": 3, "minutes": 0 }],
            "weekdays": [],
            "daysOfMonth": [],
            "timezoneOption": self.timezone.as_deref().unwrap_or("SAME_AS_SERVER"),
        });
        if let (Some(id), Some(obj)) = (id, wire.as_object_mut()) {
            obj.insert("id".into(), id.to_value());
        }
        wire
    }
}

// ── Incident ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentRequest {
    pub title: String,
    pub content: String,
    /// `info`, `warning`, `danger`, `primary`, ... Default: `primary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

// ── Tag / proxy / API key ──────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagRequest {
    pub name: String,
    /// Default: `#4B5563`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    pub host: String,
    pub port: u16,
    /// `http`, `https`, `socks`, `socks5`, ... Default: `http`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Default: false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    /// Default: false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_existing: Option<bool>,
}

impl ProxyRequest {
    fn proxy(&self) -> Value {
        json!({
            "protocol": self.protocol.as_deref().unwrap_or("http"),
            "host": self.host,
            "port": self.port,
            "auth": self.username.is_some(),
            "username": self.username,
            "password": self.password,
            "active": true,
            "default": self.is_default.unwrap_or(false),
            "applyExisting": self.apply_existing.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRequest {
    pub name: String,
    /// ISO timestamp; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

// ── UpstreamCommand ────────────────────────────────────────────────

/// All write operations the relay forwards to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCommand {
    // ── Resync ───────────────────────────────────────────────────────
    GetMonitorList,
    GetStatusPageList,
    GetIncidentList,
    GetMaintenanceList,

    // ── Monitors ─────────────────────────────────────────────────────
    CreateMonitor(MonitorRequest),
    UpdateMonitor {
        id: MonitorId,
        monitor: MonitorRequest,
    },
    DeleteMonitor {
        id: MonitorId,
    },
    PauseMonitor {
        id: MonitorId,
    },
    ResumeMonitor {
        id: MonitorId,
    },

    // ── Status pages ─────────────────────────────────────────────────
    SaveStatusPage(StatusPageRequest),
    DeleteStatusPage {
        slug: String,
    },

    // ── Notifications ────────────────────────────────────────────────
    AddNotification(NotificationRequest),
    EditNotification {
        id: EntityId,
        notification: NotificationRequest,
    },
    DeleteNotification {
        id: EntityId,
    },
    TestNotification(NotificationRequest),

    // ── Maintenance ──────────────────────────────────────────────────
    AddMaintenance(MaintenanceRequest),
    EditMaintenance {
        id: EntityId,
        maintenance: MaintenanceRequest,
    },
    DeleteMaintenance {
        id: EntityId,
    },
    PauseMaintenance {
        id: EntityId,
    },
    ResumeMaintenance {
        id: EntityId,
    },

    // ── Incidents ────────────────────────────────────────────────────
    PostIncident {
        slug: String,
        incident: IncidentRequest,
    },
    EditIncident {
        slug: String,
        id: EntityId,
        incident: IncidentRequest,
    },
    DeleteIncident {
        slug: String,
    },

    // ── Tags ─────────────────────────────────────────────────────────
    AddTag(TagRequest),
    EditTag {
        id: EntityId,
        tag: TagRequest,
    },
    DeleteTag {
        id: EntityId,
    },

    // ── Proxies ──────────────────────────────────────────────────────
    AddProxy(ProxyRequest),
    EditProxy {
        id: EntityId,
        proxy: ProxyRequest,
    },
    DeleteProxy {
        id: EntityId,
    },

    // ── API keys ─────────────────────────────────────────────────────
    AddApiKey(ApiKeyRequest),
    DeleteApiKey {
        id: EntityId,
    },

    // ── Settings ─────────────────────────────────────────────────────
    GetSettings,
    SetSettings {
        settings: Map<String, Value>,
        current_password: Option<String>,
    },
}

impl UpstreamCommand {
    /// The batch issued right after authentication to repopulate the mirror.
    pub fn resync_batch() -> [Self; 4] {
        [
            Self::GetMonitorList,
            Self::GetStatusPageList,
            Self::GetIncidentList,
            Self::GetMaintenanceList,
        ]
    }

    /// Wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::GetMonitorList => "getMonitorList",
            Self::GetStatusPageList => "getStatusPageList",
            Self::GetIncidentList => "getIncidentList",
            Self::GetMaintenanceList => "getMaintenanceList",
            Self::CreateMonitor(_) => "add",
            Self::UpdateMonitor { .. } => "editMonitor",
            Self::DeleteMonitor { .. } => "deleteMonitor",
            Self::PauseMonitor { .. } => "pauseMonitor",
            Self::ResumeMonitor { .. } => "resumeMonitor",
            Self::SaveStatusPage(_) => "saveStatusPage",
            Self::DeleteStatusPage { .. } => "deleteStatusPage",
            Self::AddNotification(_) | Self::EditNotification { .. } => "addNotification",
            Self::DeleteNotification { .. } => "deleteNotification",
            Self::TestNotification(_) => "testNotification",
            Self::AddMaintenance(_) => "addMaintenance",
            Self::EditMaintenance { .. } => "editMaintenance",
            Self::DeleteMaintenance { .. } => "deleteMaintenance",
            Self::PauseMaintenance { .. } => "pauseMaintenance",
            Self::ResumeMaintenance { .. } => "resumeMaintenance",
            Self::PostIncident { .. } | Self::EditIncident { .. } => "postIncident",
            Self::DeleteIncident { .. } => "unpinIncident",
            Self::AddTag(_) => "addTag",
            Self::EditTag { .. } => "editTag",
            Self::DeleteTag { .. } => "deleteTag",
            Self::AddProxy(_) | Self::EditProxy { .. } => "addProxy",
            Self::DeleteProxy { .. } => "deleteProxy",
            Self::AddApiKey(_) => "addAPIKey",
            Self::DeleteApiKey { .. } => "deleteAPIKey",
            Self::GetSettings => "getSettings",
            Self::SetSettings { .. } => "setSettings",
        }
    }

    /// Wire payload, with every default resolved.
    pub fn payload(&self) -> Value {
        match self {
            Self::GetMonitorList
            | Self::GetStatusPageList
            | Self::GetIncidentList
            | Self::GetMaintenanceList
            | Self::GetSettings => json!({}),

            Self::CreateMonitor(monitor) => monitor.to_wire(None),
            Self::UpdateMonitor { id, monitor } => monitor.to_wire(Some(id)),
            Self::DeleteMonitor { id }
            | Self::PauseMonitor { id }
            | Self::ResumeMonitor { id }
            | Self::DeleteNotification { id }
            | Self::DeleteMaintenance { id }
            | Self::PauseMaintenance { id }
            | Self::ResumeMaintenance { id }
            | Self::DeleteTag { id }
            | Self::DeleteProxy { id }
            | Self::DeleteApiKey { id } => id.to_value(),

            Self::SaveStatusPage(page) => page.to_wire(),
            Self::DeleteStatusPage { slug } | Self::DeleteIncident { slug } => {
                json!({ "slug": slug })
            }

            Self::AddNotification(n) => json!({ "notification": n.notification(), "id": null }),
            Self::EditNotification { id, notification } => json!({
                "notification": notification.notification(),
                "id": id.to_value(),
            }),
            Self::TestNotification(n) => n.notification(),

            Self::AddMaintenance(m) => m.to_wire(None),
            Self::EditMaintenance { id, maintenance } => maintenance.to_wire(Some(id)),

            Self::PostIncident { slug, incident } => incident_payload(slug, None, incident),
            Self::EditIncident { slug, id, incident } => {
                incident_payload(slug, Some(id), incident)
            }

            Self::AddTag(tag) => tag_payload(None, tag),
            Self::EditTag { id, tag } => tag_payload(Some(id), tag),

            Self::AddProxy(proxy) => json!({ "proxy": proxy.proxy(), "id": null }),
            Self::EditProxy { id, proxy } => json!({
                "proxy": proxy.proxy(),
                "id": id.to_value(),
            }),

            Self::AddApiKey(key) => json!({
                "name": key.name,
                "expires": key.expires,
                "active": true,
            }),

            Self::SetSettings {
                settings,
                current_password,
            } => json!({
                "data": settings,
                "currentPassword": current_password.as_deref().unwrap_or(""),
            }),
        }
    }

    /// Encode as an event frame (no ack id; commands are fire-and-forget).
    pub fn encode(&self) -> String {
        codec::encode(self.event_name(), &self.payload())
    }
}

fn incident_payload(slug: &str, id: Option<&EntityId>, incident: &IncidentRequest) -> Value {
    json!({
        "slug": slug,
        "incident": {
            "id": id.map(EntityId::to_value),
            "title": incident.title,
            "content": incident.content,
            "style": incident.style.as_deref().unwrap_or("primary"),
        },
    })
}

fn tag_payload(id: Option<&EntityId>, tag: &TagRequest) -> Value {
    json!({
        "id": id.map(EntityId::to_value),
        "name": tag.name,
        "color": tag.color.as_deref().unwrap_or(DEFAULT_TAG_COLOR),
    })
}

// ── Tests ──────────────────────────────────────────────────────────

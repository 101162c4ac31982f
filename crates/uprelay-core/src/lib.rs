// uprelay-core: State mirror, subscriber fan-out and command facade between
// uprelay-api and the downstream listener.

pub mod command;
pub mod config;
mod convert;
pub mod envelope;
pub mod error;
pub mod hub;
pub mod model;
pub mod relay;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::CommandFacade;
pub use config::RelayConfig;
pub use envelope::{EnvelopeType, OutboundEnvelope};
pub use error::CoreError;
pub use hub::{ChannelSubscriber, Delivery, RelayHub, SendError, Subscriber, SubscriberId};
pub use relay::{Health, Relay};
pub use store::{MirrorCounts, Snapshot, StateMirror};

// Protocol types callers need alongside the relay.
pub use uprelay_api::command::{
    ApiKeyRequest, IncidentRequest, MaintenanceRequest, MonitorRequest, NotificationRequest,
    ProxyRequest, StatusPageRequest, TagRequest,
};
pub use uprelay_api::{ConnectionState, Credentials, LinkStatus, ReconnectPolicy, UpstreamCommand};

pub use model::{
    EntityId, Heartbeat, HeartbeatStatus, Incident, Maintenance, Monitor, MonitorId,
    MonitorStatus, StatusPage, Tag,
};

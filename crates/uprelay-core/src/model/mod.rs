// ── Relay domain model ──
//
// Canonical types held by the state mirror and exposed to subscribers.
// Built from the raw `uprelay_api` payloads in `crate::convert`; nothing
// else constructs them.

pub mod heartbeat;
pub mod maintenance;
pub mod monitor;
pub mod status_page;

pub use heartbeat::{Heartbeat, HeartbeatStatus};
pub use maintenance::Maintenance;
pub use monitor::{Monitor, MonitorStatus, Tag};
pub use status_page::{Incident, StatusPage};
pub use uprelay_api::{EntityId, MonitorId};

/// Anything the mirror stores: one entry per id.
pub trait Entity: Clone + Send + Sync + 'static {
    fn entity_id(&self) -> &EntityId;
}

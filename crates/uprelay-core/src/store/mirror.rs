// ── State mirror ──
//
// Local copy of upstream state. Written only by `apply`, i.e. only from
// decoded upstream events; command echoes never land here.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use uprelay_api::UpstreamEvent;

use super::collection::{EntityCollection, Snapshot};
use crate::model::{EntityId, Heartbeat, Incident, Maintenance, Monitor, StatusPage};

/// Entry counts, for health output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorCounts {
    pub monitors: usize,
    pub heartbeats: usize,
    pub status_pages: usize,
    pub incidents: usize,
    pub maintenance: usize,
}

pub struct StateMirror {
    monitors: EntityCollection<Monitor>,
    heartbeats: EntityCollection<Heartbeat>,
    status_pages: EntityCollection<StatusPage>,
    incidents: EntityCollection<Incident>,
    maintenance: EntityCollection<Maintenance>,
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMirror {
    pub fn new() -> Self {
        Self {
            monitors: EntityCollection::new(),
            heartbeats: EntityCollection::new(),
            status_pages: EntityCollection::new(),
            incidents: EntityCollection::new(),
            maintenance: EntityCollection::new(),
        }
    }

    /// Fold one upstream event into the mirror.
    ///
    /// Lists replace their collection wholesale, `updateMonitorIntoList`
    /// patches, deletes remove the monitor and its heartbeat. Returns
    /// `false` for events that carry no mirrored state.
    pub fn apply(&self, event: &UpstreamEvent) -> bool {
        match event {
            UpstreamEvent::MonitorList(list) => {
                self.monitors
                    .replace_all(list.iter().cloned().map(Monitor::from));
                // Heartbeats of monitors that no longer exist are stale.
                let live: HashSet<String> = list.iter().map(|m| m.id.key()).collect();
                let stale: Vec<EntityId> = self
                    .heartbeats
                    .snapshot()
                    .iter()
                    .filter(|h| !live.contains(&h.monitor_id.key()))
                    .map(|h| h.monitor_id.clone())
                    .collect();
                for id in &stale {
                    self.heartbeats.remove(id);
                }
            }
            UpstreamEvent::UpdateMonitorIntoList(list) => {
                self.monitors
                    .upsert_many(list.iter().cloned().map(Monitor::from));
            }
            UpstreamEvent::DeleteMonitorFromList(id) => {
                self.monitors.remove(id);
                self.heartbeats.remove(id);
            }
            UpstreamEvent::Heartbeat(raw) => {
                self.heartbeats.upsert(Heartbeat::from(raw.clone()));
            }
            UpstreamEvent::HeartbeatList { heartbeats, .. } => {
                let Some(latest) = heartbeats.iter().max_by(|a, b| a.time.cmp(&b.time)) else {
                    return false;
                };
                // History may trail the live feed; never step back in time.
                if self
                    .heartbeats
                    .get(&latest.monitor_id)
                    .is_some_and(|stored| stored.time > latest.time)
                {
                    return false;
                }
                self.heartbeats.upsert(Heartbeat::from(latest.clone()));
            }
            UpstreamEvent::StatusPageList(list) => {
                self.status_pages
                    .replace_all(list.iter().cloned().map(StatusPage::from));
            }
            UpstreamEvent::IncidentList(list) => {
                self.incidents
                    .replace_all(list.iter().cloned().map(Incident::from));
            }
            UpstreamEvent::MaintenanceList(list) => {
                self.maintenance
                    .replace_all(list.iter().cloned().map(Maintenance::from));
            }
            _ => return false,
        }
        trace!(event = event.name(), "mirror updated");
        true
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn monitors(&self) -> Snapshot<Monitor> {
        self.monitors.snapshot()
    }

    pub fn monitor(&self, id: &EntityId) -> Option<Arc<Monitor>> {
        self.monitors.get(id)
    }

    pub fn heartbeats(&self) -> Snapshot<Heartbeat> {
        self.heartbeats.snapshot()
    }

    /// Last heartbeat of a monitor.
    pub fn heartbeat(&self, monitor_id: &EntityId) -> Option<Arc<Heartbeat>> {
        self.heartbeats.get(monitor_id)
    }

    pub fn status_pages(&self) -> Snapshot<StatusPage> {
        self.status_pages.snapshot()
    }

    pub fn incidents(&self) -> Snapshot<Incident> {
        self.incidents.snapshot()
    }

    pub fn maintenance(&self) -> Snapshot<Maintenance> {
        self.maintenance.snapshot()
    }

    pub fn counts(&self) -> MirrorCounts {
        MirrorCounts {
            monitors: self.monitors.len(),
            heartbeats: self.heartbeats.len(),
            status_pages: self.status_pages.len(),
            incidents: self.incidents.len(),
            maintenance: self.maintenance.len(),
        }
    }
}

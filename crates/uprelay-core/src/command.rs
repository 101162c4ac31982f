// ── Command facade ──
//
// Typed, fire-and-forget writes to the upstream. Each call checks that the
// session is authenticated and queues the command without waiting: the
// effect becomes visible when the upstream re-broadcasts the changed list.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use uprelay_api::command::{
    ApiKeyRequest, IncidentRequest, MaintenanceRequest, MonitorRequest, NotificationRequest,
    ProxyRequest, StatusPageRequest, TagRequest,
};
use uprelay_api::{ConnectionState, LinkStatus, UpstreamCommand};

use crate::error::CoreError;
use crate::model::{EntityId, MonitorId};

/// Cloneable entry point for upstream writes.
#[derive(Clone)]
pub struct CommandFacade {
    inner: Arc<FacadeInner>,
}

struct FacadeInner {
    /// Present only while an upstream task is running.
    sender: ArcSwapOption<mpsc::Sender<UpstreamCommand>>,
    status: watch::Receiver<LinkStatus>,
}

impl CommandFacade {
    pub(crate) fn new(status: watch::Receiver<LinkStatus>) -> Self {
        Self {
            inner: Arc::new(FacadeInner {
                sender: ArcSwapOption::empty(),
                status,
            }),
        }
    }

    pub(crate) fn attach(&self, sender: mpsc::Sender<UpstreamCommand>) {
        self.inner.sender.store(Some(Arc::new(sender)));
    }

    pub(crate) fn detach(&self) {
        self.inner.sender.store(None);
    }

    /// Queue a raw command. Fails without sending unless authenticated.
    pub fn send(&self, command: UpstreamCommand) -> Result<(), CoreError> {
        let state = self.inner.status.borrow().state;
        if state != ConnectionState::Authenticated {
            return Err(CoreError::NotAuthenticated { state });
        }

        let guard = self.inner.sender.load();
        let Some(sender) = guard.as_ref() else {
            return Err(CoreError::RelayStopped);
        };

        let name = command.event_name();
        sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CoreError::CommandQueueFull,
            mpsc::error::TrySendError::Closed(_) => CoreError::RelayStopped,
        })?;
        debug!(command = name, "command queued");
        Ok(())
    }

    /// Re-request every mirrored list.
    pub fn resync(&self) -> Result<(), CoreError> {
        for command in UpstreamCommand::resync_batch() {
            self.send(command)?;
        }
        Ok(())
    }

    // ── Monitors ─────────────────────────────────────────────────────

    pub fn create_monitor(&self, monitor: MonitorRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::CreateMonitor(monitor))
    }

    pub fn update_monitor(&self, id: MonitorId, monitor: MonitorRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::UpdateMonitor { id, monitor })
    }

    pub fn delete_monitor(&self, id: MonitorId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteMonitor { id })
    }

    pub fn pause_monitor(&self, id: MonitorId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::PauseMonitor { id })
    }

    pub fn resume_monitor(&self, id: MonitorId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::ResumeMonitor { id })
    }

    // ── Status pages ─────────────────────────────────────────────────

    pub fn save_status_page(&self, page: StatusPageRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::SaveStatusPage(page))
    }

    pub fn delete_status_page(&self, slug: impl Into<String>) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteStatusPage { slug: slug.into() })
    }

    // ── Notifications ────────────────────────────────────────────────

    pub fn add_notification(&self, notification: NotificationRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::AddNotification(notification))
    }

    pub fn edit_notification(
        &self,
        id: EntityId,
        notification: NotificationRequest,
    ) -> Result<(), CoreError> {
        self.send(UpstreamCommand::EditNotification { id, notification })
    }

    pub fn delete_notification(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteNotification { id })
    }

    /// Ask the upstream to fire a test message through this configuration.
    pub fn test_notification(&self, notification: NotificationRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::TestNotification(notification))
    }

    // ── Maintenance ──────────────────────────────────────────────────

    pub fn add_maintenance(&self, maintenance: MaintenanceRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::AddMaintenance(maintenance))
    }

    pub fn edit_maintenance(
        &self,
        id: EntityId,
        maintenance: MaintenanceRequest,
    ) -> Result<(), CoreError> {
        self.send(UpstreamCommand::EditMaintenance { id, maintenance })
    }

    pub fn delete_maintenance(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteMaintenance { id })
    }

    pub fn pause_maintenance(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::PauseMaintenance { id })
    }

    pub fn resume_maintenance(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::ResumeMaintenance { id })
    }

    // ── Incidents ────────────────────────────────────────────────────

    pub fn post_incident(
        &self,
        slug: impl Into<String>,
        incident: IncidentRequest,
    ) -> Result<(), CoreError> {
        self.send(UpstreamCommand::PostIncident {
            slug: slug.into(),
            incident,
        })
    }

    pub fn edit_incident(
        &self,
        slug: impl Into<String>,
        id: EntityId,
        incident: IncidentRequest,
    ) -> Result<(), CoreError> {
        self.send(UpstreamCommand::EditIncident {
            slug: slug.into(),
            id,
            incident,
        })
    }

    /// Unpin the status page's current incident.
    pub fn delete_incident(&self, slug: impl Into<String>) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteIncident { slug: slug.into() })
    }

    // ── Tags ─────────────────────────────────────────────────────────

    pub fn add_tag(&self, tag: TagRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::AddTag(tag))
    }

    pub fn edit_tag(&self, id: EntityId, tag: TagRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::EditTag { id, tag })
    }

    pub fn delete_tag(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteTag { id })
    }

    // ── Proxies ──────────────────────────────────────────────────────

    pub fn add_proxy(&self, proxy: ProxyRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::AddProxy(proxy))
    }

    pub fn edit_proxy(&self, id: EntityId, proxy: ProxyRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::EditProxy { id, proxy })
    }

    pub fn delete_proxy(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteProxy { id })
    }

    // ── API keys ─────────────────────────────────────────────────────

    pub fn add_api_key(&self, key: ApiKeyRequest) -> Result<(), CoreError> {
        self.send(UpstreamCommand::AddApiKey(key))
    }

    pub fn delete_api_key(&self, id: EntityId) -> Result<(), CoreError> {
        self.send(UpstreamCommand::DeleteApiKey { id })
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn get_settings(&self) -> Result<(), CoreError> {
        self.send(UpstreamCommand::GetSettings)
    }

    /// `current_password` is required by the upstream when auth settings change.
    pub fn set_settings(
        &self,
        settings: Map<String, Value>,
        current_password: Option<String>,
    ) -> Result<(), CoreError> {
        self.send(UpstreamCommand::SetSettings {
            settings,
            current_password,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn facade(state: ConnectionState) -> (CommandFacade, watch::Sender<LinkStatus>) {
        let (tx, rx) = watch::channel(LinkStatus {
            state,
            ..LinkStatus::default()
        });
        (CommandFacade::new(rx), tx)
    }

    #[test]
    fn rejects_commands_until_authenticated() {
        let (facade, _status) = facade(ConnectionState::AwaitingAuth);
        let (tx, mut rx) = mpsc::channel(4);
        facade.attach(tx);

        let err = facade.pause_monitor(1_u64.into()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotAuthenticated {
                state: ConnectionState::AwaitingAuth
            }
        ));
        assert!(rx.try_recv().is_err(), "nothing was queued");
    }

    #[test]
    fn queues_typed_commands_when_authenticated() {
        let (facade, _status) = facade(ConnectionState::Authenticated);
        let (tx, mut rx) = mpsc::channel(4);
        facade.attach(tx);

        facade.delete_status_page("main").unwrap();
        facade.resume_maintenance(4_u64.into()).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            UpstreamCommand::DeleteStatusPage {
                slug: "main".into()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap().encode(),
            r#"42["resumeMaintenance",4]"#
        );
    }

    #[test]
    fn full_queue_and_detached_sender_are_reported() {
        let (facade, _status) = facade(ConnectionState::Authenticated);
        assert!(matches!(
            facade.get_settings().unwrap_err(),
            CoreError::RelayStopped
        ));

        let (tx, _rx) = mpsc::channel(1);
        facade.attach(tx);
        facade.get_settings().unwrap();
        assert!(matches!(
            facade.get_settings().unwrap_err(),
            CoreError::CommandQueueFull
        ));

        facade.detach();
        assert!(matches!(
            facade.get_settings().unwrap_err(),
            CoreError::RelayStopped
        ));
    }

    #[test]
    fn resync_queues_the_four_list_requests() {
        let (facade, _status) = facade(ConnectionState::Authenticated);
        let (tx, mut rx) = mpsc::channel(8);
        facade.attach(tx);

        facade.resync().unwrap();
        let mut names = Vec::new();
        while let Ok(command) = rx.try_recv() {
            names.push(command.event_name());
        }
        assert_eq!(
            names,
            [
                "getMonitorList",
                "getStatusPageList",
                "getIncidentList",
                "getMaintenanceList"
            ]
        );
    }

    #[test]
    fn state_changes_are_seen_immediately() {
        let (facade, status) = facade(ConnectionState::Authenticated);
        let (tx, _rx) = mpsc::channel(4);
        facade.attach(tx);
        facade.get_settings().unwrap();

        status.send_modify(|s| s.state = ConnectionState::Reconnecting);
        assert!(matches!(
            facade.get_settings().unwrap_err(),
            CoreError::NotAuthenticated { .. }
        ));
    }
}

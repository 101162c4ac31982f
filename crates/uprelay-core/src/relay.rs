// ── Relay abstraction ──
//
// Composes the upstream link, the state mirror and the subscriber hub.
// Upstream events are handled inline on the connection task, so mirror
// writes and broadcasts happen in arrival order without extra locking.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use uprelay_api::{ConnectionState, LinkStatus, UpstreamEvent, UpstreamHandle, UpstreamHandler};

use crate::command::CommandFacade;
use crate::config::RelayConfig;
use crate::envelope::{OutboundEnvelope, transform};
use crate::error::CoreError;
use crate::hub::{RelayHub, Subscriber, SubscriberId};
use crate::store::StateMirror;

// ── Health ───────────────────────────────────────────────────────────

/// Snapshot for external health checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    /// Authenticated upstream session.
    pub connected: bool,
    /// Upstream transport open, authenticated or not.
    pub upstream_connected: bool,
    pub subscriber_count: usize,
    pub reconnect_attempts: u32,
    pub state: ConnectionState,
    pub ready: bool,
}

// ── Relay ────────────────────────────────────────────────────────────

/// The relay. Cheaply cloneable; clones share one upstream link.
///
/// Constructing a relay does not connect: call [`start`](Self::start).
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    config: RelayConfig,
    shared: Arc<Shared>,
    commands: CommandFacade,
    upstream: Mutex<Option<UpstreamHandle>>,
}

/// The part the upstream task calls back into.
struct Shared {
    mirror: StateMirror,
    hub: RelayHub,
    status: watch::Sender<LinkStatus>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        let (status, status_rx) = watch::channel(LinkStatus::default());
        let hub = RelayHub::new();
        hub.publish_status(&OutboundEnvelope::connection_status(false, false));

        Self {
            inner: Arc::new(RelayInner {
                config,
                shared: Arc::new(Shared {
                    mirror: StateMirror::new(),
                    hub,
                    status,
                }),
                commands: CommandFacade::new(status_rx),
                upstream: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the upstream link.
    ///
    /// Also the re-initialise call after retries were exhausted or after
    /// [`shutdown`](Self::shutdown): the attempt counter starts over.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut slot = self.inner.upstream.lock().await;
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(CoreError::AlreadyRunning);
        }
        if let Some(finished) = slot.take() {
            finished.shutdown().await;
        }

        let upstream = self.inner.config.upstream();
        let url = upstream.socket_url()?;

        self.inner.shared.status.send_replace(LinkStatus::default());
        self.inner.shared.hub.reopen();
        let handler: Arc<dyn UpstreamHandler> = self.inner.shared.clone();
        let handle = UpstreamHandle::spawn(upstream, handler);
        self.inner.commands.attach(handle.commands());
        *slot = Some(handle);

        info!(url = %url, "relay started");
        Ok(())
    }

    /// Stop the upstream link and drop every subscriber. Idempotent.
    ///
    /// The pending reconnect timer is cancelled and the transport closed
    /// before subscribers are closed, so no reconnect or broadcast can
    /// follow.
    pub async fn shutdown(&self) {
        let handle = self.inner.upstream.lock().await.take();
        self.inner.commands.detach();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("relay shut down");
        }
        self.inner.shared.hub.close_all();
    }

    // ── Subscribers ──────────────────────────────────────────────────

    /// Attach a downstream subscriber. It immediately receives the current
    /// `connection_status`.
    ///
    /// After [`shutdown`](Self::shutdown) the subscriber is closed at once
    /// instead, until the next [`start`](Self::start).
    pub fn attach(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        self.inner.shared.hub.attach(subscriber)
    }

    pub fn on_close(&self, id: SubscriberId) {
        self.inner.shared.hub.on_close(id);
    }

    pub fn on_error(&self, id: SubscriberId, error: &dyn std::fmt::Display) {
        self.inner.shared.hub.on_error(id, error);
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn commands(&self) -> &CommandFacade {
        &self.inner.commands
    }

    /// Read-only view of mirrored upstream state.
    pub fn mirror(&self) -> &StateMirror {
        &self.inner.shared.mirror
    }

    pub fn status(&self) -> LinkStatus {
        self.inner.shared.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.inner.shared.status.subscribe()
    }

    pub fn health(&self) -> Health {
        let status = self.status();
        Health {
            connected: status.state == ConnectionState::Authenticated,
            upstream_connected: status.state.is_transport_open(),
            subscriber_count: self.inner.shared.hub.len(),
            reconnect_attempts: status.reconnect_attempts,
            state: status.state,
            ready: status.ready,
        }
    }
}

// ── Upstream callbacks ───────────────────────────────────────────────

impl UpstreamHandler for Shared {
    fn on_event(&self, event: UpstreamEvent) {
        debug!(event = event.name(), "upstream event");
        self.mirror.apply(&event);
        if let Some(envelope) = transform(&event, &self.mirror) {
            self.hub.broadcast(&envelope);
        }
    }

    fn on_status(&self, status: &LinkStatus) {
        let previous = self.status.send_replace(status.clone());
        if previous.state != status.state {
            self.hub.publish_status(&OutboundEnvelope::connection_status(
                status.state == ConnectionState::Authenticated,
                status.state.is_transport_open(),
            ));
        }
    }
}

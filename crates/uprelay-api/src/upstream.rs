//! Upstream connection with auto-reconnect.
//!
//! [`UpstreamHandle::spawn`] starts a background task that connects to the
//! monitoring backend, drives a [`Session`] through the handshake, forwards
//! typed events to an [`UpstreamHandler`] and writes queued commands. When
//! the connection drops it backs off per [`ReconnectPolicy`] and tries
//! again, until the policy gives up or the handle is shut down.
//!
//! ```rust,ignore
//! let handle = UpstreamHandle::spawn(UpstreamConfig::new(url), handler);
//! handle.commands().try_send(UpstreamCommand::PauseMonitor { id: 3_u64.into() })?;
//! handle.shutdown().await;
//! ```

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::command::UpstreamCommand;
use crate::error::Error;
use crate::event::UpstreamEvent;
use crate::session::{ConnectionState, Credentials, Session, SessionAction};

const COMMAND_CHANNEL_SIZE: usize = 256;

/// Parked timers sleep this long; they are always guarded by a flag too.
const IDLE_TIMER: Duration = Duration::from_secs(86_400);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

// ── UpstreamConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Backend base URL (`http(s)://`) or full socket URL (`ws(s)://`).
    pub url: Url,
    /// `None` means the backend is expected to run without auth.
    pub credentials: Option<Credentials>,
    pub reconnect: ReconnectPolicy,
    /// Bound on transport connect through authentication.
    pub connect_timeout: Duration,
    /// Quiet period after authentication before the link reports ready.
    pub settle_delay: Duration,
}

impl UpstreamConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            credentials: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(2),
        }
    }

    /// The Socket.IO websocket endpoint for the configured URL.
    ///
    /// `http`/`https` become `ws`/`wss`; a bare host gets the default
    /// `/socket.io/` path; the Engine.IO query is added unless present.
    pub fn socket_url(&self) -> Result<Url, Error> {
        let scheme = match self.url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(Error::UnsupportedScheme(other.to_owned())),
        };

        let mut url = self.url.clone();
        url.set_scheme(scheme)
            .map_err(|()| Error::UnsupportedScheme(self.url.scheme().to_owned()))?;
        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/socket.io/");
        }
        if !url.query_pairs().any(|(key, _)| key == "EIO") {
            url.query_pairs_mut()
                .append_pair("EIO", "4")
                .append_pair("transport", "websocket");
        }
        Ok(url)
    }
}

// ── LinkStatus / UpstreamHandler ─────────────────────────────────────

/// Observable state of the upstream link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    /// Consecutive failed attempts; reset on authentication.
    pub reconnect_attempts: u32,
    /// Authenticated and the initial resync has had time to land.
    pub ready: bool,
}

/// Receiver side of the upstream task.
///
/// Called inline from the connection task, so implementations must not
/// block.
pub trait UpstreamHandler: Send + Sync + 'static {
    fn on_event(&self, event: UpstreamEvent);

    /// Called once per distinct [`LinkStatus`] change.
    fn on_status(&self, status: &LinkStatus) {
        let _ = status;
    }
}

/// Status tracker that only notifies the handler on real changes.
struct Link {
    status: LinkStatus,
    handler: Arc<dyn UpstreamHandler>,
}

impl Link {
    fn new(handler: Arc<dyn UpstreamHandler>) -> Self {
        Self {
            status: LinkStatus::default(),
            handler,
        }
    }

    fn update(&mut self, change: impl FnOnce(&mut LinkStatus)) {
        let before = self.status.clone();
        change(&mut self.status);
        if self.status != before {
            self.handler.on_status(&self.status);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.update(|status| {
            status.state = state;
            if state != ConnectionState::Authenticated {
                status.ready = false;
            }
        });
    }
}

// ── UpstreamHandle ───────────────────────────────────────────────────

/// Handle to the running upstream task.
pub struct UpstreamHandle {
    commands: mpsc::Sender<UpstreamCommand>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl UpstreamHandle {
    /// Spawn the connection loop. The first attempt starts immediately.
    pub fn spawn(config: UpstreamConfig, handler: Arc<dyn UpstreamHandler>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            upstream_loop(config, handler, command_rx, task_cancel).await;
        });

        Self {
            commands: command_tx,
            cancel,
            task,
        }
    }

    /// Sender for outbound commands. Commands are only written while
    /// authenticated; anything queued before that is discarded on connect.
    pub fn commands(&self) -> mpsc::Sender<UpstreamCommand> {
        self.commands.clone()
    }

    /// The loop exited on its own (retries exhausted or bad URL).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to close the transport.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "upstream task did not exit cleanly");
        }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

enum Outcome {
    Cancelled,
    Closed,
}

/// connect → handshake → relay; on drop, back off and reconnect.
async fn upstream_loop(
    config: UpstreamConfig,
    handler: Arc<dyn UpstreamHandler>,
    mut command_rx: mpsc::Receiver<UpstreamCommand>,
    cancel: CancellationToken,
) {
    let mut link = Link::new(handler);
    let url = match config.socket_url() {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "cannot derive upstream socket URL");
            link.set_state(ConnectionState::Failed);
            return;
        }
    };
    let mut session = Session::new(config.credentials.clone());

    loop {
        link.set_state(ConnectionState::Connecting);
        match run_connection(&url, &config, &mut session, &mut link, &mut command_rx, &cancel).await
        {
            Ok(Outcome::Cancelled) => break,
            Ok(Outcome::Closed) => info!("upstream closed the connection"),
            Err(e) => warn!(error = %e, attempt = link.status.reconnect_attempts, "upstream connection lost"),
        }
        if cancel.is_cancelled() {
            break;
        }

        let attempts = link.status.reconnect_attempts;
        if !config.reconnect.should_retry(attempts) {
            error!(
                max_attempts = config.reconnect.max_attempts,
                "upstream reconnection limit reached, giving up"
            );
            link.set_state(ConnectionState::Failed);
            return;
        }

        let attempt = attempts + 1;
        let delay = config.reconnect.next_delay(attempt);
        link.update(|status| {
            status.state = ConnectionState::Reconnecting;
            status.reconnect_attempts = attempt;
            status.ready = false;
        });
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt, "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    link.set_state(ConnectionState::ShuttingDown);
    link.set_state(ConnectionState::Disconnected);
    debug!("upstream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn run_connection(
    url: &Url,
    config: &UpstreamConfig,
    session: &mut Session,
    link: &mut Link,
    command_rx: &mut mpsc::Receiver<UpstreamCommand>,
    cancel: &CancellationToken,
) -> Result<Outcome, Error> {
    info!(url = %url, "connecting to upstream");
    session.begin();

    let deadline = Instant::now() + config.connect_timeout;
    let timed_out = || Error::Timeout {
        timeout_secs: config.connect_timeout.as_secs(),
    };

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Outcome::Cancelled),
        result = tokio::time::timeout_at(deadline, tokio_tungstenite::connect_async(url.as_str())) => {
            result
                .map_err(|_| timed_out())?
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?
        }
    };
    debug!("upstream transport connected");

    // Commands issued while the link was down are stale.
    let mut discarded = 0_usize;
    while command_rx.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        debug!(discarded, "dropped commands queued while disconnected");
    }

    let (mut write, mut read) = ws_stream.split();

    let mut handshake = pin!(tokio::time::sleep_until(deadline));
    let mut liveness = pin!(tokio::time::sleep(IDLE_TIMER));
    let mut ping_window: Option<Duration> = None;
    let mut settle = pin!(tokio::time::sleep(IDLE_TIMER));
    let mut settling = false;

    loop {
        let authenticated = session.state() == ConnectionState::Authenticated;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "close frame not delivered");
                }
                return Ok(Outcome::Cancelled);
            }
            () = &mut handshake, if !authenticated => return Err(timed_out()),
            () = &mut liveness, if ping_window.is_some() => return Err(Error::HeartbeatTimeout),
            () = &mut settle, if settling => {
                settling = false;
                link.update(|status| status.ready = true);
                info!("upstream state settled");
            }
            command = command_rx.recv(), if authenticated => {
                let Some(command) = command else {
                    // Every sender is gone; nobody can observe us any more.
                    return Ok(Outcome::Cancelled);
                };
                debug!(event = command.event_name(), "sending command upstream");
                send_text(&mut write, command.encode()).await?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(window) = ping_window {
                            liveness.as_mut().reset(deadline_in(window));
                        }
                        for action in session.handle_frame(text.as_str()) {
                            match action {
                                SessionAction::Send(raw) => send_text(&mut write, raw).await?,
                                SessionAction::Opened { ping_window_ms } => {
                                    let window = Duration::from_millis(ping_window_ms);
                                    ping_window = Some(window);
                                    liveness.as_mut().reset(deadline_in(window));
                                    link.set_state(ConnectionState::AwaitingAuth);
                                }
                                SessionAction::Authenticated => {
                                    info!("authenticated with upstream");
                                    link.update(|status| {
                                        status.state = ConnectionState::Authenticated;
                                        status.reconnect_attempts = 0;
                                        status.ready = false;
                                    });
                                    settle.as_mut().reset(Instant::now() + config.settle_delay);
                                    settling = true;
                                }
                                SessionAction::Event(event) => link.handler.on_event(event),
                                SessionAction::Fail(e) => return Err(e),
                            }
                        }
                        // A repeated login prompt drops us out of Authenticated.
                        if session.state() != link.status.state
                            && session.state() == ConnectionState::AwaitingAuth
                        {
                            link.set_state(ConnectionState::AwaitingAuth);
                            handshake.as_mut().reset(Instant::now() + config.connect_timeout);
                            settling = false;
                        }
                    }
                    Some(Ok(Message::Ping(_))) => trace!("websocket ping"),
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "upstream close frame received");
                        }
                        return Ok(Outcome::Closed);
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => return Ok(Outcome::Closed),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// `now + after`, parked instead of overflowing for absurd windows.
fn deadline_in(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or(now + IDLE_TIMER)
}

async fn send_text(write: &mut WsSink, raw: String) -> Result<(), Error> {
    // Frames are not logged verbatim: the login frame carries the password.
    trace!(len = raw.len(), "frame sent upstream");
    write
        .send(Message::text(raw))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

// ── Tests ────────────────────────────────────────────────────────────

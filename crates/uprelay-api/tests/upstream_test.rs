// Integration tests for `UpstreamHandle` against an in-process fake backend.
#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use uprelay_api::{
    ConnectionState, Credentials, LinkStatus, ReconnectPolicy, UpstreamCommand, UpstreamConfig,
    UpstreamEvent, UpstreamHandle, UpstreamHandler,
};

const OPEN: &str = r#"0{"sid":"fake","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
const WAIT: Duration = Duration::from_secs(5);

type Statuses = mpsc::UnboundedReceiver<(Instant, LinkStatus)>;

// ── Helpers ─────────────────────────────────────────────────────────

struct Channels {
    events: mpsc::UnboundedSender<UpstreamEvent>,
    statuses: mpsc::UnboundedSender<(Instant, LinkStatus)>,
}

impl UpstreamHandler for Channels {
    fn on_event(&self, event: UpstreamEvent) {
        let _ = self.events.send(event);
    }

    fn on_status(&self, status: &LinkStatus) {
        let _ = self.statuses.send((Instant::now(), status.clone()));
    }
}

struct Harness {
    handle: UpstreamHandle,
    events: mpsc::UnboundedReceiver<UpstreamEvent>,
    statuses: Statuses,
}

impl Harness {
    fn spawn(config: UpstreamConfig) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (statuses_tx, statuses) = mpsc::unbounded_channel();
        let handler = Arc::new(Channels {
            events: events_tx,
            statuses: statuses_tx,
        });
        Self {
            handle: UpstreamHandle::spawn(config, handler),
            events,
            statuses,
        }
    }

    async fn wait_for_state(&mut self, state: ConnectionState) -> LinkStatus {
        wait_for(&mut self.statuses, state).await.1
    }
}

/// Next status in `state`, with the instant the loop reported it.
async fn wait_for(statuses: &mut Statuses, state: ConnectionState) -> (Instant, LinkStatus) {
    tokio::time::timeout(WAIT, async {
        loop {
            let (at, status) = statuses.recv().await.unwrap();
            if status.state == state {
                return (at, status);
            }
        }
    })
    .await
    .unwrap()
}

async fn listener() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
    (listener, url)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn send(ws: &mut WebSocketStream<TcpStream>, raw: &str) {
    ws.send(Message::text(raw)).await.unwrap();
}

async fn recv(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
        if let Message::Text(text) = frame.unwrap().unwrap() {
            return text.as_str().to_owned();
        }
    }
}

/// Open, prompt for login, accept it and swallow the resync batch.
async fn login(ws: &mut WebSocketStream<TcpStream>) -> Vec<String> {
    login_with(ws, OPEN).await
}

async fn login_with(ws: &mut WebSocketStream<TcpStream>, open: &str) -> Vec<String> {
    send(ws, open).await;
    assert_eq!(recv(ws).await, "40");
    send(ws, "40").await;
    send(ws, r#"42["loginRequired"]"#).await;

    let login = recv(ws).await;
    assert!(login.starts_with(r#"420["login","#), "got {login}");
    send(ws, r#"430[{"ok":true}]"#).await;

    let mut resync = Vec::new();
    for _ in 0..4 {
        resync.push(recv(ws).await);
    }
    resync
}

fn config(url: Url) -> UpstreamConfig {
    UpstreamConfig {
        credentials: Some(Credentials::new("admin", "secret")),
        reconnect: ReconnectPolicy::new(Duration::from_millis(20), 3),
        settle_delay: Duration::from_millis(50),
        ..UpstreamConfig::new(url)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn login_resyncs_and_forwards_events() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(config(url));

    let mut ws = accept(&listener).await;
    let mut resync = login(&mut ws).await;
    resync.sort();
    assert_eq!(
        resync,
        vec![
            r#"42["getIncidentList",{}]"#,
            r#"42["getMaintenanceList",{}]"#,
            r#"42["getMonitorList",{}]"#,
            r#"42["getStatusPageList",{}]"#,
        ]
    );

    let status = harness.wait_for_state(ConnectionState::Authenticated).await;
    assert_eq!(status.reconnect_attempts, 0);

    send(&mut ws, r#"42["heartbeat",{"monitorID":1,"status":1,"ping":42}]"#).await;
    let event = tokio::time::timeout(WAIT, harness.events.recv())
        .await
        .unwrap()
        .unwrap();
    let UpstreamEvent::Heartbeat(beat) = event else {
        panic!("expected heartbeat, got {event:?}");
    };
    assert_eq!(beat.monitor_id, 1_u64.into());
    assert_eq!(beat.ping, Some(42));

    // Settle delay flips `ready`.
    let ready = tokio::time::timeout(WAIT, async {
        loop {
            let (_, status) = harness.statuses.recv().await.unwrap();
            if status.ready {
                return status;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(ready.state, ConnectionState::Authenticated);

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn commands_are_written_once_authenticated() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(config(url));

    let mut ws = accept(&listener).await;
    login(&mut ws).await;
    harness.wait_for_state(ConnectionState::Authenticated).await;

    harness
        .handle
        .commands()
        .try_send(UpstreamCommand::PauseMonitor { id: 3_u64.into() })
        .unwrap();
    assert_eq!(recv(&mut ws).await, r#"42["pauseMonitor",3]"#);

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn rejected_login_schedules_a_reconnect() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(config(url));

    let mut ws = accept(&listener).await;
    send(&mut ws, OPEN).await;
    recv(&mut ws).await;
    send(&mut ws, r#"42["loginRequired"]"#).await;
    recv(&mut ws).await;
    send(&mut ws, r#"430[{"ok":false,"msg":"Incorrect username or password."}]"#).await;

    let status = harness.wait_for_state(ConnectionState::Reconnecting).await;
    assert_eq!(status.reconnect_attempts, 1);

    // The second attempt reaches us again.
    let mut ws = accept(&listener).await;
    let resync = login(&mut ws).await;
    assert_eq!(resync.len(), 4);
    let status = harness.wait_for_state(ConnectionState::Authenticated).await;
    assert_eq!(status.reconnect_attempts, 0);

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn unreachable_upstream_ends_in_failed() {
    let (listener, url) = listener().await;
    drop(listener);

    let mut harness = Harness::spawn(config(url));
    let failed = harness.wait_for_state(ConnectionState::Failed).await;
    assert_eq!(failed.reconnect_attempts, 3);

    tokio::time::timeout(WAIT, async {
        while !harness.handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn shutdown_closes_the_transport() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(config(url));

    let mut ws = accept(&listener).await;
    login(&mut ws).await;
    harness.wait_for_state(ConnectionState::Authenticated).await;

    harness.handle.shutdown().await;

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn silent_upstream_hits_the_connect_timeout() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(UpstreamConfig {
        connect_timeout: Duration::from_millis(300),
        ..config(url)
    });

    // Transport up, but no open frame ever arrives.
    let _ws = accept(&listener).await;
    let (connecting, _) = wait_for(&mut harness.statuses, ConnectionState::Connecting).await;
    let (lost, status) = wait_for(&mut harness.statuses, ConnectionState::Reconnecting).await;

    assert_eq!(status.reconnect_attempts, 1);
    assert!(lost - connecting >= Duration::from_millis(300));

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn missing_login_prompt_hits_the_connect_timeout() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(UpstreamConfig {
        connect_timeout: Duration::from_millis(300),
        ..config(url)
    });

    // Opened and connected, but the login prompt never comes.
    let mut ws = accept(&listener).await;
    send(&mut ws, OPEN).await;
    assert_eq!(recv(&mut ws).await, "40");
    send(&mut ws, "40").await;
    let (connecting, _) = wait_for(&mut harness.statuses, ConnectionState::Connecting).await;
    wait_for(&mut harness.statuses, ConnectionState::AwaitingAuth).await;

    let (lost, status) = wait_for(&mut harness.statuses, ConnectionState::Reconnecting).await;
    assert_eq!(status.reconnect_attempts, 1);
    assert!(lost - connecting >= Duration::from_millis(300));

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn quiet_session_hits_the_liveness_timeout() {
    let (listener, url) = listener().await;
    let mut harness = Harness::spawn(config(url));

    // 200ms ping interval + 200ms ping timeout, then nothing after login.
    let mut ws = accept(&listener).await;
    login_with(
        &mut ws,
        r#"0{"sid":"fake","upgrades":[],"pingInterval":200,"pingTimeout":200}"#,
    )
    .await;
    let (authenticated, _) =
        wait_for(&mut harness.statuses, ConnectionState::Authenticated).await;

    let (lost, status) = wait_for(&mut harness.statuses, ConnectionState::Reconnecting).await;
    assert_eq!(status.reconnect_attempts, 1);
    assert!(lost - authenticated >= Duration::from_millis(300));

    harness.handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_interrupts_a_pending_backoff() {
    let (listener, url) = listener().await;
    drop(listener);

    let mut harness = Harness::spawn(UpstreamConfig {
        reconnect: ReconnectPolicy::new(Duration::from_secs(60), 3),
        ..config(url)
    });
    let status = harness.wait_for_state(ConnectionState::Reconnecting).await;
    assert_eq!(status.reconnect_attempts, 1);

    tokio::time::timeout(Duration::from_secs(1), harness.handle.shutdown())
        .await
        .unwrap();
    wait_for(&mut harness.statuses, ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn reconnect_delays_double_per_attempt() {
    let base = Duration::from_millis(30);
    let (listener, url) = listener().await;
    drop(listener);

    let mut harness = Harness::spawn(UpstreamConfig {
        reconnect: ReconnectPolicy::new(base, 4),
        ..config(url)
    });

    // Each backoff runs from a Reconnecting report to the next Connecting.
    for attempt in 1..=4_u32 {
        let (waiting, status) =
            wait_for(&mut harness.statuses, ConnectionState::Reconnecting).await;
        assert_eq!(status.reconnect_attempts, attempt);

        let (retrying, _) = wait_for(&mut harness.statuses, ConnectionState::Connecting).await;
        let expected = base * 2_u32.pow(attempt - 1);
        assert!(
            retrying - waiting >= expected,
            "attempt {attempt}: waited {:?}, expected at least {expected:?}",
            retrying - waiting
        );
    }

    let (_, failed) = wait_for(&mut harness.statuses, ConnectionState::Failed).await;
    assert_eq!(failed.reconnect_attempts, 4);
}

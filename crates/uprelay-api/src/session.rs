//! Authentication state machine.
//!
//! Sans-IO: [`Session::handle_frame`] takes one raw upstream frame and
//! returns the actions the connection loop must carry out (frames to write,
//! events to dispatch, state changes, failures). No sockets, no timers, so
//! every handshake path is testable as plain data.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::Display;
use tracing::{debug, info, warn};

use crate::codec::{self, Frame};
use crate::command::UpstreamCommand;
use crate::error::Error;
use crate::event::UpstreamEvent;

// ── ConnectionState ──────────────────────────────────────────────

/// Lifecycle of the upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingAuth,
    Authenticated,
    Reconnecting,
    ShuttingDown,
    /// Retries exhausted; only an explicit restart leaves this state.
    Failed,
}

impl ConnectionState {
    /// The transport is up (handshake received), authenticated or not.
    pub fn is_transport_open(self) -> bool {
        matches!(self, Self::AwaitingAuth | Self::Authenticated)
    }
}

// ── Credentials ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Callback payload of the `login` event.
#[derive(Debug, Deserialize)]
struct LoginAck {
    ok: bool,
    #[serde(default)]
    msg: Option<String>,
}

// ── Session ──────────────────────────────────────────────────────

/// What the connection loop has to do after a frame.
#[derive(Debug)]
pub enum SessionAction {
    /// Write this text frame upstream.
    Send(String),
    /// Transport handshake received; no frame for `ping_window_ms` means dead.
    Opened { ping_window_ms: u64 },
    /// Login (or auto-login) completed. The resync batch follows as `Send`s.
    Authenticated,
    /// Hand to the mirror and the relay hub.
    Event(UpstreamEvent),
    /// Drop this connection and let the reconnect policy decide.
    Fail(Error),
}

/// Per-connection protocol state.
#[derive(Debug)]
pub struct Session {
    credentials: Option<Credentials>,
    state: ConnectionState,
    next_ack_id: u64,
    pending_login: Option<u64>,
}

impl Session {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            state: ConnectionState::Disconnected,
            next_ack_id: 0,
            pending_login: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reset for a fresh transport.
    pub fn begin(&mut self) {
        self.state = ConnectionState::Connecting;
        self.next_ack_id = 0;
        self.pending_login = None;
    }

    /// Feed one raw text frame.
    pub fn handle_frame(&mut self, raw: &str) -> Vec<SessionAction> {
        let frame = match codec::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return Vec::new();
            }
        };

        let mut actions = Vec::new();
        match frame {
            Frame::Open(handshake) => {
                self.state = ConnectionState::AwaitingAuth;
                actions.push(SessionAction::Opened {
                    ping_window_ms: handshake.ping_interval.saturating_add(handshake.ping_timeout),
                });
                actions.push(SessionAction::Send(codec::CONNECT.to_owned()));
            }
            Frame::Ping => actions.push(SessionAction::Send(codec::PONG.to_owned())),
            Frame::Pong | Frame::Noop => {}
            Frame::Connect => {
                if self.credentials.is_none() {
                    debug!("namespace connected without credentials, assuming open access");
                    self.authenticate(&mut actions);
                } else {
                    debug!("namespace connected, waiting for login prompt");
                }
            }
            Frame::ConnectError(detail) => actions.push(SessionAction::Fail(Error::ConnectError {
                message: detail.to_string(),
            })),
            Frame::Close | Frame::Disconnect => {
                actions.push(SessionAction::Fail(Error::WebSocketClosed {
                    code: 1000,
                    reason: "upstream ended the session".into(),
                }));
            }
            Frame::Ack { id, args } => {
                if self.pending_login == Some(id) {
                    self.pending_login = None;
                    self.handle_login_ack(args, &mut actions);
                } else {
                    debug!(ack_id = id, "ignoring unsolicited ack");
                }
            }
            Frame::Event { event, .. } => match UpstreamEvent::from_decoded(event) {
                Ok(UpstreamEvent::LoginRequired) => self.login(&mut actions),
                Ok(UpstreamEvent::AutoLogin) => self.authenticate(&mut actions),
                Ok(event) => actions.push(SessionAction::Event(event)),
                Err(e) => warn!(error = %e, "dropping event with malformed payload"),
            },
        }
        actions
    }

    fn login(&mut self, actions: &mut Vec<SessionAction>) {
        let Some(credentials) = &self.credentials else {
            actions.push(SessionAction::Fail(Error::LoginRequired));
            return;
        };

        let ack_id = self.next_ack_id;
        self.next_ack_id += 1;
        self.pending_login = Some(ack_id);
        // A second prompt (session expired) drops us back to waiting.
        self.state = ConnectionState::AwaitingAuth;

        info!(username = %credentials.username, "upstream requested login");
        let payload = json!({
            "username": credentials.username,
            "password": credentials.password.expose_secret(),
            "token": "",
        });
        actions.push(SessionAction::Send(codec::encode_with_ack(
            ack_id, "login", &payload,
        )));
    }

    fn handle_login_ack(&mut self, args: Vec<Value>, actions: &mut Vec<SessionAction>) {
        let ack = args
            .into_iter()
            .next()
            .and_then(|v| serde_json::from_value::<LoginAck>(v).ok());

        match ack {
            Some(LoginAck { ok: true, .. }) => self.authenticate(actions),
            Some(LoginAck { ok: false, msg }) => {
                actions.push(SessionAction::Fail(Error::Authentication {
                    message: msg.unwrap_or_else(|| "login rejected".into()),
                }));
            }
            None => actions.push(SessionAction::Fail(Error::Authentication {
                message: "malformed login response".into(),
            })),
        }
    }

    fn authenticate(&mut self, actions: &mut Vec<SessionAction>) {
        if self.state == ConnectionState::Authenticated {
            return;
        }
        self.state = ConnectionState::Authenticated;
        actions.push(SessionAction::Authenticated);
        actions.extend(
            UpstreamCommand::resync_batch()
                .iter()
                .map(|cmd| SessionAction::Send(cmd.encode())),
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const OPEN: &str = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

    fn sends(actions: &[SessionAction]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send(raw) => Some(raw.as_str()),
                _ => None,
            })
            .collect()
    }

    fn opened(credentials: Option<Credentials>) -> Session {
        let mut session = Session::new(credentials);
        session.begin();
        let actions = session.handle_frame(OPEN);
        assert_eq!(sends(&actions), vec!["40"]);
        assert!(matches!(
            actions[0],
            SessionAction::Opened {
                ping_window_ms: 45_000
            }
        ));
        session
    }

    #[test]
    fn huge_ping_window_saturates() {
        let mut session = Session::new(None);
        session.begin();
        let open = format!(
            r#"0{{"sid":"x","upgrades":[],"pingInterval":{},"pingTimeout":{}}}"#,
            u64::MAX,
            u64::MAX
        );
        let actions = session.handle_frame(&open);
        assert!(matches!(
            actions[0],
            SessionAction::Opened {
                ping_window_ms: u64::MAX
            }
        ));
    }

    #[test]
    fn open_frame_moves_to_awaiting_auth() {
        let session = opened(None);
        assert_eq!(session.state(), ConnectionState::AwaitingAuth);
    }

    #[test]
    fn login_required_then_ok_authenticates_and_resyncs() {
        let mut session = opened(Some(Credentials::new("admin", "hunter2")));
        assert!(session.handle_frame("40").is_empty());

        let actions = session.handle_frame(r#"42["loginRequired"]"#);
        let login = sends(&actions);
        assert_eq!(login.len(), 1);
        assert!(login[0].starts_with(r#"420["login","#));
        assert!(login[0].contains(r#""username":"admin""#));
        assert!(login[0].contains(r#""password":"hunter2""#));
        assert_eq!(session.state(), ConnectionState::AwaitingAuth);

        let actions = session.handle_frame(r#"430[{"ok":true,"token":"jwt"}]"#);
        assert_eq!(session.state(), ConnectionState::Authenticated);
        assert!(matches!(actions[0], SessionAction::Authenticated));

        let resync = sends(&actions);
        assert_eq!(resync.len(), 4);
        let mut distinct = resync.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 4);
        assert!(resync.contains(&r#"42["getMonitorList",{}]"#));
    }

    #[test]
    fn rejected_login_fails_the_attempt() {
        let mut session = opened(Some(Credentials::new("admin", "wrong")));
        session.handle_frame(r#"42["loginRequired"]"#);

        let actions = session.handle_frame(r#"430[{"ok":false,"msg":"Incorrect username or password."}]"#);
        assert_eq!(actions.len(), 1);
        let SessionAction::Fail(err) = &actions[0] else {
            panic!("expected failure");
        };
        assert!(err.is_auth_failure());
        assert_eq!(
            err.to_string(),
            "Authentication failed: Incorrect username or password."
        );
        assert_ne!(session.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn login_prompt_without_credentials_fails() {
        let mut session = opened(None);
        let actions = session.handle_frame(r#"42["loginRequired"]"#);
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Fail(Error::LoginRequired)]
        ));
    }

    #[test]
    fn namespace_connect_without_credentials_authenticates() {
        let mut session = opened(None);
        let actions = session.handle_frame(r#"40{"sid":"n1"}"#);
        assert_eq!(session.state(), ConnectionState::Authenticated);
        assert_eq!(sends(&actions).len(), 4);
    }

    #[test]
    fn auto_login_authenticates_once() {
        let mut session = opened(Some(Credentials::new("admin", "pw")));
        assert_eq!(sends(&session.handle_frame(r#"42["autoLogin"]"#)).len(), 4);
        assert!(session.handle_frame(r#"42["autoLogin"]"#).is_empty());
    }

    #[test]
    fn unrelated_acks_are_ignored() {
        let mut session = opened(Some(Credentials::new("admin", "pw")));
        assert!(session.handle_frame(r#"437[{"ok":true}]"#).is_empty());
        assert_eq!(session.state(), ConnectionState::AwaitingAuth);
    }

    #[test]
    fn ping_is_answered_with_pong() {
        let mut session = opened(None);
        assert_eq!(sends(&session.handle_frame("2")), vec!["3"]);
    }

    #[test]
    fn garbage_produces_no_actions() {
        let mut session = opened(None);
        assert!(session.handle_frame("42[oops").is_empty());
        assert!(session.handle_frame(r#"42["heartbeat",42]"#).is_empty());
    }

    #[test]
    fn domain_events_pass_through() {
        let mut session = opened(None);
        let actions = session.handle_frame(r#"42["deleteMonitorFromList",3]"#);
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Event(UpstreamEvent::DeleteMonitorFromList(_))]
        ));
    }

    #[test]
    fn upstream_close_fails_the_connection() {
        let mut session = opened(None);
        assert!(matches!(
            session.handle_frame("41").as_slice(),
            [SessionAction::Fail(Error::WebSocketClosed { .. })]
        ));
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(ConnectionState::AwaitingAuth.to_string(), "awaiting_auth");
    }
}

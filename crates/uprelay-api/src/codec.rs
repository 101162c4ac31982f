//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Pure functions, no I/O. Every upstream text frame starts with an
//! Engine.IO packet code; Socket.IO packets ride inside the Engine.IO
//! `message` code (`4`), so an event frame reads `42["name", payload]`
//! and an acknowledgement reads `43<id>[args...]`.
//!
//! Decoding never panics: anything that is not a well-formed packet comes
//! back as [`Error::Frame`], and [`decode`] turns that into "no event".

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Error;

/// Namespace connect request sent right after the transport opens.
pub const CONNECT: &str = "40";

/// Reply to an Engine.IO ping.
pub const PONG: &str = "3";

const EVENT_PREFIX: &str = "42";

// ── Frame ────────────────────────────────────────────────────────────

/// Handshake carried by the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    #[serde(default)]
    pub sid: String,

    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,

    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// A decoded application event: `[name, payload, extra...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    /// Second array element; `Null` when the event carries no arguments.
    pub payload: Value,
    /// Any arguments after the payload (e.g. `avgPing`'s value).
    pub extra: Vec<Value>,
}

/// One parsed upstream text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.IO open: the transport is up.
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    /// Socket.IO namespace connect acknowledged.
    Connect,
    Disconnect,
    ConnectError(Value),
    Event {
        ack_id: Option<u64>,
        event: DecodedEvent,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Parse a raw text frame.
pub fn parse(raw: &str) -> Result<Frame, Error> {
    let mut chars = raw.chars();
    let code = chars.next().ok_or_else(|| Error::frame("empty frame"))?;
    let body = chars.as_str();

    match code {
        '0' => serde_json::from_str(body)
            .map(Frame::Open)
            .map_err(|e| Error::frame(format!("bad open handshake: {e}"))),
        '1' => Ok(Frame::Close),
        // Upgrade checks ("2probe") are irrelevant on a pure websocket transport.
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '6' => Ok(Frame::Noop),
        '4' => parse_socket_packet(body),
        other => Err(Error::frame(format!("unknown packet type '{other}'"))),
    }
}

/// Decode a raw frame into an application event, if it carries one.
///
/// Malformed frames are logged and dropped; control frames yield `None`.
pub fn decode(raw: &str) -> Option<DecodedEvent> {
    match parse(raw) {
        Ok(Frame::Event { event, .. }) => Some(event),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "dropping undecodable frame");
            None
        }
    }
}

fn parse_socket_packet(body: &str) -> Result<Frame, Error> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| Error::frame("empty socket packet"))?;
    let rest = skip_namespace(chars.as_str());

    match kind {
        '0' => Ok(Frame::Connect),
        '1' => Ok(Frame::Disconnect),
        '2' => {
            let (ack_id, json) = split_ack_id(rest)?;
            let event = parse_event_array(json)?;
            Ok(Frame::Event { ack_id, event })
        }
        '3' => {
            let (id, json) = split_ack_id(rest)?;
            let id = id.ok_or_else(|| Error::frame("ack without id"))?;
            let args: Vec<Value> = serde_json::from_str(json)
                .map_err(|e| Error::frame(format!("bad ack arguments: {e}")))?;
            Ok(Frame::Ack { id, args })
        }
        '4' => Ok(Frame::ConnectError(
            serde_json::from_str(rest).unwrap_or(Value::Null),
        )),
        other => Err(Error::frame(format!("unknown socket packet type '{other}'"))),
    }
}

/// Strip an optional `/namespace,` prefix.
fn skip_namespace(rest: &str) -> &str {
    if rest.starts_with('/') {
        rest.split_once(',').map_or("", |(_, tail)| tail)
    } else {
        rest
    }
}

fn split_ack_id(rest: &str) -> Result<(Option<u64>, &str), Error> {
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok((None, rest));
    }
    let (id, json) = rest.split_at(digits);
    let id = id
        .parse::<u64>()
        .map_err(|e| Error::frame(format!("bad ack id: {e}")))?;
    Ok((Some(id), json))
}

fn parse_event_array(json: &str) -> Result<DecodedEvent, Error> {
    let values: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| Error::frame(format!("event body is not a JSON array: {e}")))?;

    let mut values = values.into_iter();
    let name = match values.next() {
        Some(Value::String(name)) => name,
        Some(other) => {
            return Err(Error::frame(format!("event name is not a string: {other}")));
        }
        None => return Err(Error::frame("event array is empty")),
    };

    Ok(DecodedEvent {
        name,
        payload: values.next().unwrap_or(Value::Null),
        extra: values.collect(),
    })
}

// ── Encoding ─────────────────────────────────────────────────────────

/// Encode an event frame: `42["event", payload]`. No ack id.
pub fn encode(event: &str, payload: &Value) -> String {
    format!("{EVENT_PREFIX}{}", json!([event, payload]))
}

/// Encode an event frame that requests a callback: `42<id>["event", payload]`.
pub fn encode_with_ack(ack_id: u64, event: &str, payload: &Value) -> String {
    format!("{EVENT_PREFIX}{ack_id}{}", json!([event, payload]))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decode_rejects_malformed_frames() {
        let inputs = [
            "",
            "4",
            "42",
            "42{}",
            "42[]",
            "42[1, 2]",
            "42[\"unterminated",
            "42not json",
            "9[\"heartbeat\", {}]",
            "47[\"x\"]",
            "43[{\"ok\": true}]",
            "é",
            "0not-json",
        ];
        for raw in inputs {
            assert!(decode(raw).is_none(), "expected no event for {raw:?}");
        }
    }

    #[test]
    fn decode_event_with_payload() {
        let event = decode(r#"42["heartbeat",{"monitorID":1,"status":1}]"#).unwrap();
        assert_eq!(event.name, "heartbeat");
        assert_eq!(event.payload, json!({ "monitorID": 1, "status": 1 }));
        assert!(event.extra.is_empty());
    }

    #[test]
    fn decode_event_without_payload() {
        let event = decode(r#"42["loginRequired"]"#).unwrap();
        assert_eq!(event.name, "loginRequired");
        assert_eq!(event.payload, Value::Null);
    }

    #[test]
    fn decode_keeps_trailing_arguments() {
        let event = decode(r#"42["uptime",7,24,0.99]"#).unwrap();
        assert_eq!(event.payload, json!(7));
        assert_eq!(event.extra, vec![json!(24), json!(0.99)]);
    }

    #[test]
    fn control_frames_carry_no_event() {
        assert!(decode("2").is_none());
        assert!(decode("40").is_none());
        assert!(decode(r#"0{"sid":"abc","pingInterval":25000,"pingTimeout":20000}"#).is_none());
    }

    #[test]
    fn parse_open_handshake() {
        let frame = parse(r#"0{"sid":"abc","upgrades":[],"pingInterval":1000,"pingTimeout":500}"#)
            .unwrap();
        assert_eq!(
            frame,
            Frame::Open(Handshake {
                sid: "abc".into(),
                ping_interval: 1000,
                ping_timeout: 500,
            })
        );
    }

    #[test]
    fn parse_connect_with_sid_payload() {
        assert_eq!(parse(r#"40{"sid":"xyz"}"#).unwrap(), Frame::Connect);
    }

    #[test]
    fn parse_event_with_ack_id() {
        let frame = parse(r#"4212["login",{"username":"a"}]"#).unwrap();
        let Frame::Event { ack_id, event } = frame else {
            panic!("expected event frame");
        };
        assert_eq!(ack_id, Some(12));
        assert_eq!(event.name, "login");
    }

    #[test]
    fn parse_ack_frame() {
        let frame = parse(r#"430[{"ok":false,"msg":"Incorrect username or password."}]"#).unwrap();
        assert_eq!(
            frame,
            Frame::Ack {
                id: 0,
                args: vec![json!({ "ok": false, "msg": "Incorrect username or password." })],
            }
        );
    }

    #[test]
    fn parse_namespaced_event() {
        let frame = parse(r#"42/admin,["info",{}]"#).unwrap();
        assert!(matches!(frame, Frame::Event { ack_id: None, .. }));
    }

    #[test]
    fn encode_event_frame() {
        assert_eq!(
            encode("pauseMonitor", &json!(3)),
            r#"42["pauseMonitor",3]"#
        );
    }

    #[test]
    fn encode_frame_with_ack_id() {
        let raw = encode_with_ack(0, "login", &json!({ "username": "u" }));
        assert_eq!(raw, r#"420["login",{"username":"u"}]"#);
        let Frame::Event { ack_id, event } = parse(&raw).unwrap() else {
            panic!("expected event frame");
        };
        assert_eq!(ack_id, Some(0));
        assert_eq!(event.payload, json!({ "username": "u" }));
    }
}

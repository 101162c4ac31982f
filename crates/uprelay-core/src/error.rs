// ── Core error types ──
//
// Errors surfaced by the relay to the process that owns it. Protocol
// detail from `uprelay-api` is folded into a handful of relay-level
// variants by the `From` impl below.

use thiserror::Error;
use uprelay_api::ConnectionState;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Command errors ───────────────────────────────────────────────
    /// Commands are only accepted while the upstream session is live.
    #[error("Upstream is not authenticated (state: {state})")]
    NotAuthenticated { state: ConnectionState },

    #[error("Command queue is full, try again shortly")]
    CommandQueueFull,

    #[error("Relay is not running")]
    RelayStopped,

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Relay is already running")]
    AlreadyRunning,

    // ── Connection errors ────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot connect to upstream: {reason}")]
    ConnectionFailed { reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from protocol-layer errors ────────────────────────────

impl From<uprelay_api::Error> for CoreError {
    fn from(err: uprelay_api::Error) -> Self {
        use uprelay_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::LoginRequired => CoreError::AuthenticationFailed {
                message: "upstream requires login but no credentials are configured".into(),
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid upstream URL: {e}"),
            },
            Api::UnsupportedScheme(scheme) => CoreError::Config {
                message: format!("unsupported upstream URL scheme '{scheme}'"),
            },
            err @ (Api::WebSocketConnect(_)
            | Api::WebSocketClosed { .. }
            | Api::Timeout { .. }
            | Api::HeartbeatTimeout
            | Api::ConnectError { .. }) => CoreError::ConnectionFailed {
                reason: err.to_string(),
            },
            err @ (Api::Frame { .. } | Api::Deserialization { .. }) => {
                CoreError::Internal(err.to_string())
            }
        }
    }
}

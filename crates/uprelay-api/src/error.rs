use thiserror::Error;

/// Top-level error type for the `uprelay-api` crate.
///
/// Covers every failure mode of the upstream link: framing, authentication,
/// transport and payload decoding. `uprelay-core` maps these into relay-level
/// errors; none of them are fatal to the process on their own.
#[derive(Debug, Error)]
pub enum Error {
    // ── Framing ─────────────────────────────────────────────────────
    /// A text frame that is not a well-formed Engine.IO / Socket.IO packet.
    #[error("Malformed frame: {reason}")]
    Frame { reason: String },

    // ── Authentication ──────────────────────────────────────────────
    /// Login was answered with `ok: false`.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Upstream demands a login but no credentials are configured.
    #[error("Upstream requires login but no credentials are configured")]
    LoginRequired,

    /// The Socket.IO namespace connect was refused.
    #[error("Namespace connect refused: {message}")]
    ConnectError { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// URL parsing or scheme conversion error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported upstream URL scheme '{0}' (expected http, https, ws or wss)")]
    UnsupportedScheme(String),

    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the peer.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Connect + authenticate did not finish in time.
    #[error("Connect timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// No frame (not even a ping) arrived within the negotiated window.
    #[error("Upstream stopped sending pings")]
    HeartbeatTimeout,

    // ── Data ────────────────────────────────────────────────────────
    /// A known event carried a payload we could not deserialize.
    #[error("Could not decode '{event}' payload: {message}")]
    Deserialization { event: String, message: String },
}

impl Error {
    /// Returns `true` if the upstream rejected or demanded credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::LoginRequired)
    }

    pub(crate) fn frame(reason: impl Into<String>) -> Self {
        Self::Frame {
            reason: reason.into(),
        }
    }
}

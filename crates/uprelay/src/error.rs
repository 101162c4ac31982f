//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use uprelay_config::ConfigError;
use uprelay_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Upstream ─────────────────────────────────────────────────────
    #[error("Could not reach the upstream: {reason}")]
    #[diagnostic(
        code(uprelay::connection_failed),
        help("Check that the monitoring backend is running and upstream.url is correct.")
    )]
    ConnectionFailed { reason: String },

    #[error("Upstream rejected the login: {message}")]
    #[diagnostic(
        code(uprelay::auth_failed),
        help(
            "Verify upstream.username and the password source.\n\
             The password is read from password_env, UPRELAY_PASSWORD, the keyring or upstream.password."
        )
    )]
    AuthFailed { message: String },

    // ── Listener ─────────────────────────────────────────────────────
    #[error("Cannot listen on {addr}")]
    #[diagnostic(
        code(uprelay::bind_failed),
        help("Pick a free address with --listen or listen.addr.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(uprelay::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(
        code(uprelay::config),
        help("Run: uprelay config show  to inspect the effective configuration")
    )]
    Config(ConfigError),

    // ── Relay ────────────────────────────────────────────────────────
    #[error("Relay error: {0}")]
    #[diagnostic(code(uprelay::relay))]
    Relay(CoreError),

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Bind { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Relay(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Config { message } => Self::Validation {
                field: "upstream.url".into(),
                reason: message,
            },
            other => Self::Relay(other),
        }
    }
}

//! Configuration for the uprelay binary.
//!
//! TOML file + `UPRELAY_` environment overrides, credential resolution
//! (env + keyring + plaintext), and translation to
//! `uprelay_core::RelayConfig`. Library crates never read files; this is
//! the only place that does.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use uprelay_core::{Credentials, ReconnectPolicy, RelayConfig};

const KEYRING_SERVICE: &str = "uprelay";
const PASSWORD_ENV: &str = "UPRELAY_PASSWORD";
const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password found for upstream user '{username}'")]
    NoCredentials { username: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub upstream: UpstreamSection,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub timeouts: TimeoutSection,

    #[serde(default)]
    pub listen: ListenSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpstreamSection {
    /// `http(s)://` base URL or `ws(s)://` socket URL.
    #[serde(default = "default_upstream_url")]
    pub url: String,

    /// No username means the upstream runs without login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Name of an environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Plaintext password (prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            username: None,
            password_env: None,
            password: None,
        }
    }
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:3001".into()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectSection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    5_000
}
fn default_max_attempts() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutSection {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_subscriber_send_ms")]
    pub subscriber_send_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            settle_ms: default_settle_ms(),
            subscriber_send_ms: default_subscriber_send_ms(),
        }
    }
}

fn default_connect_secs() -> u64 {
    10
}
fn default_settle_ms() -> u64 {
    2_000
}
fn default_subscriber_send_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenSection {
    #[serde(default = "default_listen_addr")]
    pub addr: String,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8765".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "uprelay", "uprelay").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("uprelay");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load defaults, then the TOML file, then `UPRELAY_*` overrides
/// (`UPRELAY_UPSTREAM__URL` sets `upstream.url`).
///
/// An explicit `path` must exist; the platform default may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(explicit) => {
            if !explicit.exists() {
                return Err(ConfigError::NotFound {
                    path: explicit.to_path_buf(),
                });
            }
            explicit.to_path_buf()
        }
        None => config_path(),
    };

    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("UPRELAY_").split("__"))
        .extract()?;
    Ok(config)
}

impl Config {
    /// Copy safe to print: any plaintext password is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.upstream.password.is_some() {
            copy.upstream.password = Some(REDACTED.into());
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .addr
            .parse()
            .map_err(|e| ConfigError::Validation {
                field: "listen.addr".into(),
                reason: format!("{e}: {}", self.listen.addr),
            })
    }

    /// Build the relay's runtime config, resolving the password.
    pub fn to_relay_config(&self) -> Result<RelayConfig, ConfigError> {
        let url: url::Url =
            self.upstream
                .url
                .parse()
                .map_err(|e| ConfigError::Validation {
                    field: "upstream.url".into(),
                    reason: format!("{e}: {}", self.upstream.url),
                })?;

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Validation {
                field: "reconnect.max_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(RelayConfig {
            credentials: resolve_credentials(&self.upstream)?,
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(self.reconnect.base_delay_ms),
                self.reconnect.max_attempts,
            ),
            connect_timeout: Duration::from_secs(self.timeouts.connect_secs),
            settle_delay: Duration::from_millis(self.timeouts.settle_ms),
            subscriber_send_timeout: Duration::from_millis(self.timeouts.subscriber_send_ms),
            ..RelayConfig::new(url)
        })
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve upstream credentials: `password_env` → `UPRELAY_PASSWORD` →
/// system keyring → plaintext. `Ok(None)` when no username is set.
pub fn resolve_credentials(upstream: &UpstreamSection) -> Result<Option<Credentials>, ConfigError> {
    resolve_credentials_from(
        upstream,
        |name| std::env::var(name).ok(),
        |username| {
            keyring::Entry::new(KEYRING_SERVICE, username)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_credentials_from(
    upstream: &UpstreamSection,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = upstream.username.as_deref().filter(|u| !u.is_empty()) else {
        return Ok(None);
    };

    let password = upstream
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| env(PASSWORD_ENV))
        .or_else(|| keyring(username))
        .or_else(|| upstream.password.clone())
        .ok_or_else(|| ConfigError::NoCredentials {
            username: username.into(),
        })?;

    Ok(Some(Credentials {
        username: username.into(),
        password: SecretString::from(password),
    }))
}

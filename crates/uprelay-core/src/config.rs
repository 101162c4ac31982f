// ── Runtime relay configuration ──
//
// Describes how to reach the upstream backend and how patient to be with
// it. Carries credential data but never touches disk: the binary builds a
// `RelayConfig` from `uprelay-config` and hands it in.

use std::time::Duration;

use url::Url;

use uprelay_api::{Credentials, ReconnectPolicy, UpstreamConfig};

/// Configuration for a single relay instance.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream URL (`http(s)://` base or `ws(s)://` socket endpoint).
    pub upstream_url: Url,
    /// `None` relies on the upstream running without login.
    pub credentials: Option<Credentials>,
    pub reconnect: ReconnectPolicy,
    /// Transport connect through authentication.
    pub connect_timeout: Duration,
    /// Wait after authentication before reporting ready.
    pub settle_delay: Duration,
    /// Per-message bound for downstream writers.
    pub subscriber_send_timeout: Duration,
}

impl RelayConfig {
    pub fn new(upstream_url: Url) -> Self {
        Self {
            upstream_url,
            credentials: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(2),
            subscriber_send_timeout: Duration::from_secs(5),
        }
    }

    pub(crate) fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            url: self.upstream_url.clone(),
            credentials: self.credentials.clone(),
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
            settle_delay: self.settle_delay,
        }
    }
}

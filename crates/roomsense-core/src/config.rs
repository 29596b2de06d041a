// ── Engine configuration ──

use std::time::Duration;

use url::Url;

use roomsense_api::TransportConfig;

use crate::error::CoreError;

/// How often the engine re-fetches the full snapshot over HTTP.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

/// How long a device may stay silent before it is shown offline.
pub const DEFAULT_OFFLINE_THRESHOLD: Duration = Duration::from_secs(300);

/// Per-request HTTP timeout, shared with the transport layer so the
/// two defaults cannot drift apart.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = TransportConfig::DEFAULT_TIMEOUT;

/// Runtime configuration for an [`Engine`](crate::Engine).
///
/// Built either directly or from the file/env loader in
/// `roomsense-config`. The base URL is the only required field; all
/// timing knobs carry sane defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend base URL, e.g. `http://sensors.local:8000/api`.
    pub base_url: Url,
    /// Interval between HTTP snapshot refreshes. Zero disables polling
    /// after the bootstrap fetch.
    pub poll_interval: Duration,
    /// Readings older than this render as offline.
    pub offline_threshold: Duration,
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// First reconnect delay after a stream failure.
    pub reconnect_initial_delay: Duration,
    /// Upper bound on the exponential reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Whether to open the live stream at all. With this off the engine
    /// is poll-only.
    pub websocket_enabled: bool,
}

impl EngineConfig {
    /// Configuration with defaults for everything but the base URL.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            websocket_enabled: true,
        }
    }

    /// Derive the live stream URL from the base URL: same host and
    /// port, `ws`/`wss` scheme, fixed `/ws` path.
    pub fn ws_url(&self) -> Result<Url, CoreError> {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| CoreError::Config {
            message: format!("cannot derive stream URL from {}", self.base_url),
        })?;
        url.set_path("/ws");
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}

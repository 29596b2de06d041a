// Shared transport configuration for building reqwest::Client instances.
//
// The snapshot client and the health probe share timeout and user-agent
// settings through this module.

use std::time::Duration;

/// Transport configuration for the HTTP side of the backend.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout. The backend is a small telemetry service;
    /// anything slower than a few seconds is as good as down.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Default per-request timeout. Consumers that expose their own
    /// timeout setting should default to this.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);


    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("roomsense/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(crate::error::Error::Transport)
    }
}

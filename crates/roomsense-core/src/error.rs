// ── Core error types ──
//
// User-facing errors from roomsense-core. Consumers never see HTTP
// status codes or JSON parse failures directly; the
// `From<roomsense_api::Error>` impl collapses transport-layer failures
// into the coarse conditions the renderer actually distinguishes.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A snapshot fetch failed. Non-fatal: the registry keeps serving
    /// its last-known contents and the next scheduled fetch retries.
    #[error("Cannot reach telemetry backend: {reason}")]
    Backend { reason: String },

    /// The live stream could not be established.
    #[error("Live stream failed: {reason}")]
    Stream { reason: String },

    /// Invalid or missing configuration. Fatal at startup.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The engine has been shut down; the result of an in-flight
    /// operation was discarded.
    #[error("Engine is shut down")]
    EngineShutDown,
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<roomsense_api::Error> for CoreError {
    fn from(err: roomsense_api::Error) -> Self {
        match err {
            roomsense_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            roomsense_api::Error::WebSocketConnect(reason) => CoreError::Stream { reason },
            other => CoreError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

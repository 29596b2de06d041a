use thiserror::Error;

/// Top-level error type for the `roomsense-api` crate.
///
/// Covers every failure mode across both transports: the HTTP snapshot
/// endpoint and the WebSocket stream. `roomsense-core` maps these into
/// the coarse user-facing conditions (backend unreachable, stream down).
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Backend responded with a non-2xx status.
    #[error("Backend returned HTTP {status}")]
    Status { status: u16 },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection or handshake failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status } => *status >= 500,
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }
}

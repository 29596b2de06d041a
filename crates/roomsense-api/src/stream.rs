//! Live update stream with auto-reconnect.
//!
//! Connects to the backend's WebSocket endpoint and broadcasts parsed
//! [`StreamMessage`]s through a [`tokio::sync::broadcast`] channel.
//! Reconnection with exponential backoff + jitter is handled here;
//! what the messages *mean* for the registry is roomsense-core's
//! concern. Transport state is observable via a `watch` channel so the
//! engine never has to treat connection-open as data.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::reading::ReadingDto;

// ── Broadcast channel capacity ───────────────────────────────────────

const MESSAGE_CHANNEL_CAPACITY: usize = 256;

// ── StreamMessage ────────────────────────────────────────────────────

/// A parsed message from the live stream.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// In-band full resync: semantically a complete snapshot, replacing
    /// everything previously known. An empty list is authoritative too.
    Initial(Vec<ReadingDto>),
    /// A single device's latest reading.
    Update(ReadingDto),
}

// ── StreamStatus ─────────────────────────────────────────────────────

/// Transport-level state of the stream connection.
///
/// `Connected` means the socket handshake succeeded — it does not imply
/// any data has arrived yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// No connection attempt has completed yet.
    Idle,
    /// Socket is open.
    Connected,
    /// Connection lost; waiting out the backoff before attempt `attempt`.
    Reconnecting { attempt: u32 },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── StreamHandle ─────────────────────────────────────────────────────

/// Handle to a running live update stream.
///
/// Call [`subscribe`](Self::subscribe) for messages and
/// [`status`](Self::status) for transport state; [`shutdown`](Self::shutdown)
/// tears down the background task.
pub struct StreamHandle {
    message_rx: broadcast::Receiver<Arc<StreamMessage>>,
    status_rx: watch::Receiver<StreamStatus>,
    cancel: CancellationToken,
}

impl StreamHandle {
    /// Spawn the connect/read/reconnect loop against the given WebSocket URL.
    ///
    /// Returns immediately; the first connection attempt happens
    /// asynchronously. Subscribe before expecting messages.
    pub fn connect(ws_url: Url, reconnect: ReconnectConfig, cancel: CancellationToken) -> Self {
        let (message_tx, message_rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(StreamStatus::Idle);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            stream_loop(ws_url, message_tx, status_tx, reconnect, task_cancel).await;
        });

        Self {
            message_rx,
            status_rx,
            cancel,
        }
    }

    /// Get a new broadcast receiver for parsed stream messages.
    ///
    /// Multiple consumers can subscribe concurrently. A slow consumer
    /// receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamMessage>> {
        self.message_rx.resubscribe()
    }

    /// Observe transport-level connection state.
    pub fn status(&self) -> watch::Receiver<StreamStatus> {
        self.status_rx.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn stream_loop(
    ws_url: Url,
    message_tx: broadcast::Sender<Arc<StreamMessage>>,
    status_tx: watch::Sender<StreamStatus>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&ws_url, &message_tx, &status_tx, &cancel) => {
                match result {
                    // Clean disconnect (server close frame or stream ended).
                    // Reset the attempt counter, but still wait out the
                    // initial delay: a backend shedding load by closing
                    // right after accept must not see a connect storm.
                    Ok(()) => {
                        tracing::info!("stream disconnected cleanly, reconnecting");
                        attempt = 0;
                        let _ = status_tx.send(StreamStatus::Reconnecting { attempt });

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            () = tokio::time::sleep(reconnect.initial_delay) => {}
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "stream error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "stream reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        attempt += 1;
                        let _ = status_tx.send(StreamStatus::Reconnecting { attempt });

                        let delay = backoff_delay(attempt, &reconnect);
                        tracing::debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempt, "waiting before reconnect");

                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }
    }

    tracing::debug!("stream loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one WebSocket connection and read frames until it drops.
async fn connect_and_read(
    url: &Url,
    message_tx: &broadcast::Sender<Arc<StreamMessage>>,
    status_tx: &watch::Sender<StreamStatus>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::debug!(url = %url, "connecting to stream");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(uri)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("stream connected");
    let _ = status_tx.send(StreamStatus::Connected);

    let (_write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(msg) = parse_message(&text) {
                            // Send errors just mean no subscribers right now.
                            let _ = message_tx.send(Arc::new(msg));
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pings automatically
                        tracing::trace!("stream ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "stream close frame received");
                        } else {
                            tracing::info!("stream close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        // Stream ended without a close frame
                        tracing::info!("stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse one text frame into a [`StreamMessage`].
///
/// Two shapes are accepted: `{ "type": "initial", "data": [...] }` for a
/// full resync (the `data` array is what identifies it), and a bare
/// reading object for a single-device update. Anything else — bad JSON,
/// a resync without a usable `data` array, an update missing required
/// fields — is dropped with a diagnostic and must never tear down the
/// channel or touch the registry.
fn parse_message(text: &str) -> Option<StreamMessage> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable stream frame, dropping");
            return None;
        }
    };

    if let Some(data) = value.get("data") {
        return match serde_json::from_value::<Vec<ReadingDto>>(data.clone()) {
            Ok(readings) => Some(StreamMessage::Initial(readings)),
            Err(e) => {
                tracing::debug!(error = %e, "malformed resync payload, dropping");
                None
            }
        };
    }

    match serde_json::from_value::<ReadingDto>(value) {
        Ok(reading) => Some(StreamMessage::Update(reading)),
        Err(e) => {
            tracing::debug!(error = %e, "malformed update message, dropping");
            None
        }
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter, bounded by `max_delay`.
///
/// `delay = min(initial * 2^(attempt-1), max) * jitter`, jitter in
/// [0.75, 1.25], deterministically derived from the attempt number to
/// spread out reconnection storms without pulling in an RNG.
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exp = attempt.saturating_sub(1).min(24);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(i32::try_from(exp).unwrap_or(24));
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let config = ReconnectConfig::default();

        let d1 = backoff_delay(1, &config);
        let d3 = backoff_delay(3, &config);
        let d5 = backoff_delay(5, &config);

        assert!(d3 > d1, "d3 ({d3:?}) should exceed d1 ({d1:?})");
        assert!(d5 > d3, "d5 ({d5:?}) should exceed d3 ({d3:?})");
    }

    #[test]
    fn backoff_is_bounded_by_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d20 = backoff_delay(20, &config);
        // Jitter can push the capped value up by at most 25%
        assert!(
            d20 <= Duration::from_secs(13),
            "delay at attempt 20 ({d20:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn parse_initial_message() {
        let raw = serde_json::json!({
            "type": "initial",
            "data": [
                {
                    "device_id": "a",
                    "room": "Lab",
                    "temperature": 21.5,
                    "humidity": 40.0,
                    "pressure": 1012.0,
                    "timestamp": "2026-03-01T12:00:00Z"
                },
                {
                    "device_id": "b",
                    "room": "Kitchen",
                    "temperature": 19.0,
                    "humidity": 50.0,
                    "pressure": 1010.0,
                    "timestamp": "2026-03-01T12:00:05Z"
                }
            ]
        });

        match parse_message(&raw.to_string()) {
            Some(StreamMessage::Initial(readings)) => {
                assert_eq!(readings.len(), 2);
                assert_eq!(readings[0].device_id, "a");
            }
            other => panic!("expected Initial, got {other:?}"),
        }
    }

    #[test]
    fn parse_empty_initial_is_authoritative() {
        let raw = serde_json::json!({ "type": "initial", "data": [] });

        match parse_message(&raw.to_string()) {
            Some(StreamMessage::Initial(readings)) => assert!(readings.is_empty()),
            other => panic!("expected empty Initial, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_message() {
        let raw = serde_json::json!({
            "type": "update",
            "device_id": "a",
            "room": "Lab",
            "temperature": 22.0,
            "humidity": 41.0,
            "pressure": 1013.0,
            "timestamp": "2026-03-01T12:01:00Z"
        });

        match parse_message(&raw.to_string()) {
            Some(StreamMessage::Update(reading)) => {
                assert_eq!(reading.device_id, "a");
                assert!((reading.temperature - 22.0).abs() < f64::EPSILON);
            }
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn update_missing_device_id_is_dropped() {
        let raw = serde_json::json!({ "type": "update" });
        assert!(parse_message(&raw.to_string()).is_none());
    }

    #[test]
    fn resync_with_non_array_data_is_dropped() {
        let raw = serde_json::json!({ "type": "initial", "data": "oops" });
        assert!(parse_message(&raw.to_string()).is_none());
    }

    #[test]
    fn non_json_frame_is_dropped() {
        assert!(parse_message("not json at all").is_none());
    }
}

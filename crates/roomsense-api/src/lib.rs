// roomsense-api: wire layer for the telemetry backend.
//
// Two transports against the same backend: a request/response snapshot
// endpoint (HTTP) and a live update stream (WebSocket). Both produce
// `ReadingDto` values; merging them into a registry is roomsense-core's job.

pub mod client;
pub mod error;
pub mod reading;
pub mod stream;
pub mod transport;

pub use client::TelemetryClient;
pub use error::Error;
pub use reading::ReadingDto;
pub use stream::{ReconnectConfig, StreamHandle, StreamMessage, StreamStatus};
pub use transport::TransportConfig;

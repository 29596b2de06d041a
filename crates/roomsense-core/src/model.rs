// ── Domain model ──
//
// Canonical telemetry types shared by the store, the engine, and
// renderers. The wire DTO lives in roomsense-api; conversion happens at
// the boundary so the rest of the crate never touches serde details.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roomsense_api::ReadingDto;

/// Opaque stable identifier of a physical sensor device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One device's most recent telemetry. Immutable once constructed; a
/// newer reading replaces the whole value, never individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub device_id: DeviceId,
    /// Display label. Not unique — the model doesn't enforce one
    /// device per room.
    pub room: String,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Hectopascals.
    pub pressure: f64,
    /// When the device produced the reading. All staleness math is
    /// relative to this, never to receive time.
    pub timestamp: DateTime<Utc>,
}

impl From<ReadingDto> for DeviceReading {
    fn from(dto: ReadingDto) -> Self {
        Self {
            device_id: DeviceId::from(dto.device_id),
            room: dto.room,
            temperature: dto.temperature,
            humidity: dto.humidity,
            pressure: dto.pressure,
            timestamp: dto.timestamp,
        }
    }
}

/// Derived per-device view handed to renderers.
///
/// `online` is computed from the reading's timestamp at read time and
/// is deliberately not part of the stored state — caching it would let
/// a silently aging device stay "online" forever.
#[derive(Debug, Clone)]
pub struct DeviceView {
    pub reading: Arc<DeviceReading>,
    pub online: bool,
}

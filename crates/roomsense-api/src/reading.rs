// Wire representation of a single device reading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One device's latest telemetry as the backend serializes it.
///
/// Mirrors the JSON shape used by both the snapshot endpoint and the
/// live stream: `{ device_id, room, temperature, humidity, pressure,
/// timestamp }`. Unknown fields are ignored — in particular, a
/// server-computed `online` flag is dropped on the floor, because
/// online/offline is always derived locally from the timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingDto {
    pub device_id: String,
    pub room: String,
    /// Degrees Celsius. Advisory range only; not validated here.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Hectopascals.
    pub pressure: f64,
    /// When the device produced the reading (not when it was received).
    #[serde(with = "flexible_ts")]
    pub timestamp: DateTime<Utc>,
}

/// Timestamp (de)serialization that tolerates zone-less ISO strings.
///
/// The backend historically emitted `datetime.utcnow().isoformat()`,
/// which has no offset suffix; those are interpreted as UTC. Output is
/// always RFC 3339.
pub(crate) mod flexible_ts {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

// ── Staleness classification ──
//
// Pure time math: a device is online iff its last reading is no older
// than the configured threshold. No state, no caching — callers
// re-derive on every read so devices age out without needing a new
// message to trigger it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::{DeviceReading, DeviceView};

/// Whether a reading produced at `timestamp` still counts as online at
/// `now`, given the staleness threshold.
///
/// Defined as `now − timestamp ≤ threshold`. A negative elapsed time
/// (future-dated reading, clock skew between device and viewer) counts
/// as online: the inequality holds trivially, and treating skew as an
/// outage would flap devices whose clocks merely run ahead.
pub fn is_online(timestamp: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let limit = TimeDelta::from_std(threshold).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(timestamp) <= limit
}

/// Derive the render view for one reading at a given instant.
pub fn classify(reading: &Arc<DeviceReading>, now: DateTime<Utc>, threshold: Duration) -> DeviceView {
    DeviceView {
        reading: Arc::clone(reading),
        online: is_online(reading.timestamp, now, threshold),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceId;
    use chrono::TimeZone;

    const FIVE_MINUTES: Duration = Duration::from_secs(300);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn fresh_reading_is_online() {
        assert!(is_online(t0(), t0(), FIVE_MINUTES));
    }

    #[test]
    fn elapsed_equal_to_threshold_is_still_online() {
        let now = t0() + TimeDelta::seconds(300);
        assert!(is_online(t0(), now, FIVE_MINUTES));
    }

    #[test]
    fn elapsed_past_threshold_is_offline() {
        // 6 minutes old against a 5 minute threshold
        let now = t0() + TimeDelta::minutes(6);
        assert!(!is_online(t0(), now, FIVE_MINUTES));
    }

    #[test]
    fn future_dated_reading_is_online() {
        // Device clock runs 10 minutes ahead of the viewer.
        let timestamp = t0() + TimeDelta::minutes(10);
        assert!(is_online(timestamp, t0(), FIVE_MINUTES));
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let now = t0() + TimeDelta::seconds(299);
        for _ in 0..3 {
            assert!(is_online(t0(), now, FIVE_MINUTES));
        }
    }

    #[test]
    fn oversized_threshold_does_not_panic() {
        assert!(is_online(t0(), t0(), Duration::MAX));
    }

    #[test]
    fn classify_derives_view_without_mutating() {
        let reading = Arc::new(DeviceReading {
            device_id: DeviceId::from("a"),
            room: "Lab".into(),
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1012.0,
            timestamp: t0(),
        });

        let view = classify(&reading, t0() + TimeDelta::minutes(6), FIVE_MINUTES);
        assert!(!view.online);
        assert_eq!(view.reading.device_id, DeviceId::from("a"));

        let view = classify(&reading, t0(), FIVE_MINUTES);
        assert!(view.online);
    }
}

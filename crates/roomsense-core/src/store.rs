// ── Device registry ──
//
// Lock-free concurrent storage for the latest known reading per device,
// with push-based change notification via `watch` channels. Single
// logical writer (the engine), many readers (render calls).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::{DeviceId, DeviceReading, DeviceView};
use crate::presence;
use crate::stream::ReadingStream;

/// The single source of truth for current device state.
///
/// Holds at most one reading per device id; a newer reading replaces
/// the entry atomically. Every mutation bumps a version counter and
/// rebuilds the immutable snapshot that subscribers receive — readers
/// never observe a half-applied change.
pub struct ReadingStore {
    /// Primary storage: device id -> latest reading.
    readings: DashMap<DeviceId, Arc<DeviceReading>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<DeviceReading>>>>,

    /// When the last authoritative snapshot (HTTP or in-band resync)
    /// was applied. `None` until the first one lands.
    last_resync: watch::Sender<Option<DateTime<Utc>>>,
}

impl ReadingStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (last_resync, _) = watch::channel(None);

        Self {
            readings: DashMap::new(),
            version,
            snapshot,
            last_resync,
        }
    }

    /// Insert or replace the entry for the reading's device id.
    ///
    /// Tie-break for out-of-order delivery: if the stored entry carries
    /// a strictly newer timestamp, the incoming reading is discarded
    /// (a retried older message arriving after a newer one must not
    /// regress state). Equal timestamps: the incoming reading wins, so
    /// replaying the same message is idempotent.
    ///
    /// Returns `true` if the reading was applied.
    pub fn upsert(&self, reading: DeviceReading) -> bool {
        match self.readings.entry(reading.device_id.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().timestamp > reading.timestamp {
                    return false;
                }
                entry.insert(Arc::new(reading));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(reading));
            }
        }

        self.rebuild_snapshot();
        self.bump_version();
        true
    }

    /// Install a full authoritative snapshot, keyed by device id.
    ///
    /// Implemented as upsert-then-prune rather than clear-then-insert,
    /// so subscribers never observe a transient empty registry in the
    /// middle of a replace. No timestamp tie-break applies here: a
    /// resync is authoritative and may legitimately rewind a device —
    /// or, with an empty input, empty the whole registry.
    pub fn replace_all(&self, readings: Vec<DeviceReading>) {
        let incoming: HashSet<DeviceId> = readings.iter().map(|r| r.device_id.clone()).collect();

        for reading in readings {
            self.readings
                .insert(reading.device_id.clone(), Arc::new(reading));
        }
        self.readings.retain(|id, _| incoming.contains(id));

        self.rebuild_snapshot();
        self.bump_version();
        let _ = self.last_resync.send(Some(Utc::now()));
    }

    /// The current registry contents as an immutable shared view.
    /// No ordering guarantee; sorting by room is the renderer's call.
    pub fn snapshot(&self) -> Arc<Vec<Arc<DeviceReading>>> {
        self.snapshot.borrow().clone()
    }

    /// Look up one device's latest reading.
    pub fn get(&self, id: &DeviceId) -> Option<Arc<DeviceReading>> {
        self.readings.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Classify every known device at `now` against the threshold.
    pub fn view_at(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<DeviceView> {
        self.snapshot()
            .iter()
            .map(|reading| presence::classify(reading, now, threshold))
            .collect()
    }

    /// Subscribe to registry changes.
    pub fn subscribe(&self) -> ReadingStream {
        ReadingStream::new(self.snapshot.subscribe())
    }

    /// When the last authoritative snapshot was applied.
    pub fn last_resync(&self) -> Option<DateTime<Utc>> {
        *self.last_resync.borrow()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into a snapshot vec and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let values: Vec<Arc<DeviceReading>> =
            self.readings.iter().map(|r| Arc::clone(r.value())).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}

impl Default for ReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

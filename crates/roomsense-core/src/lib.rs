// roomsense-core: reconciliation layer between roomsense-api and renderers.
//
// Owns the device registry, merges snapshot and stream data into it,
// and derives per-device online/offline state at read time. Renderers
// consume snapshots or reactive subscriptions; they never mutate.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod presence;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::EngineConfig;
pub use engine::{ConnectionState, Engine};
pub use error::CoreError;
pub use model::{DeviceId, DeviceReading, DeviceView};
pub use presence::is_online;
pub use store::ReadingStore;
pub use stream::ReadingStream;

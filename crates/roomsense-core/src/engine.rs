// ── Engine ──
//
// Orchestrates the full reconciliation lifecycle: bootstrap snapshot
// fetch, periodic HTTP refresh, live stream consumption, and teardown.
// All mutation of the registry funnels through here; consumers only
// ever observe it.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{DeviceReading, DeviceView};
use crate::store::ReadingStore;

use roomsense_api::{
    ReconnectConfig, StreamHandle, StreamMessage, StreamStatus, TelemetryClient, TransportConfig,
};

// ── ConnectionState ──────────────────────────────────────────────

/// Stream connection state observable by consumers.
///
/// `Connected` is only entered once a message has actually arrived on
/// the live stream; a completed socket handshake with a silent server
/// stays in `Connecting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

// ── Engine ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Owns the registry, the
/// HTTP client, and the stream handle, and manages the background
/// tasks that keep the registry current.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<ReadingStore>,
    client: TelemetryClient,
    connection_state: watch::Sender<ConnectionState>,
    /// Whether the last snapshot fetch succeeded. Independent of the
    /// stream: a healthy stream with a dead HTTP endpoint still reports
    /// unreachable, and vice versa.
    backend_reachable: watch::Sender<bool>,
    cancel: CancellationToken,
    /// Child token for the current run — cancelled on shutdown,
    /// replaced on restart (avoids permanent cancellation).
    cancel_child: Mutex<CancellationToken>,
    /// Live stream handle (populated on start if enabled).
    stream_handle: Mutex<Option<StreamHandle>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create a new Engine from configuration. Does NOT fetch anything --
    /// call [`start()`](Self::start) to bootstrap and spawn background tasks.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.request_timeout,
        };
        let client = TelemetryClient::new(config.base_url.clone(), &transport)?;

        let store = Arc::new(ReadingStore::new());
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (backend_reachable, _) = watch::channel(false);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                client,
                connection_state,
                backend_reachable,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                stream_handle: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Access the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Access the underlying registry.
    pub fn store(&self) -> &Arc<ReadingStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Bootstrap the registry and spawn background tasks.
    ///
    /// The initial snapshot fetch is attempted inline; failure is
    /// non-fatal (the registry starts empty and the poll task retries).
    /// A bad stream URL is fatal, since it means the configuration is
    /// wrong rather than the backend being down.
    pub async fn start(&self) -> Result<(), CoreError> {
        // Fresh child token for this run (supports restart after shutdown).
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        // Initial snapshot load
        match self.refresh().await {
            Ok(count) => info!(devices = count, "bootstrap snapshot loaded"),
            Err(e) => warn!(error = %e, "bootstrap snapshot failed, starting empty"),
        }

        let mut handles = self.inner.task_handles.lock().await;

        // Periodic snapshot refresh. Runs regardless of stream health --
        // it is the self-healing fallback, not a degraded mode.
        if !self.inner.config.poll_interval.is_zero() {
            let engine = self.clone();
            let period = self.inner.config.poll_interval;
            let cancel = child.clone();
            handles.push(tokio::spawn(poll_task(engine, period, cancel)));
        }

        if self.inner.config.websocket_enabled {
            let _ = self
                .inner
                .connection_state
                .send(ConnectionState::Connecting);

            let ws_url = self.inner.config.ws_url()?;
            let reconnect = ReconnectConfig {
                initial_delay: self.inner.config.reconnect_initial_delay,
                max_delay: self.inner.config.reconnect_max_delay,
                max_retries: None,
            };
            let handle = StreamHandle::connect(ws_url, reconnect, child.child_token());

            let store = Arc::clone(&self.inner.store);
            let state_tx = self.inner.connection_state.clone();
            let messages = handle.subscribe();
            let status = handle.status();
            let bridge_cancel = child.clone();
            handles.push(tokio::spawn(stream_bridge_task(
                store,
                state_tx,
                messages,
                status,
                bridge_cancel,
            )));

            *self.inner.stream_handle.lock().await = Some(handle);
        }

        Ok(())
    }

    /// Fetch the current snapshot and install it in the registry.
    ///
    /// On success the snapshot replaces the registry wholesale. If the
    /// engine was shut down while the request was in flight, the result
    /// is discarded and the registry left untouched.
    pub async fn refresh(&self) -> Result<usize, CoreError> {
        match self.inner.client.fetch_latest().await {
            Ok(readings) => {
                if self.inner.cancel_child.lock().await.is_cancelled() {
                    debug!("refresh completed after shutdown, discarding");
                    return Err(CoreError::EngineShutDown);
                }

                let count = readings.len();
                self.inner
                    .store
                    .replace_all(readings.into_iter().map(DeviceReading::from).collect());
                let _ = self.inner.backend_reachable.send(true);
                Ok(count)
            }
            Err(e) => {
                let _ = self.inner.backend_reachable.send(false);
                Err(e.into())
            }
        }
    }

    /// Shut down background tasks and the live stream.
    ///
    /// Results of operations still in flight are discarded; the
    /// registry stops changing from the caller's perspective as soon as
    /// this returns.
    pub async fn shutdown(&self) {
        // Cancel the child token (not the parent — allows restart).
        self.inner.cancel_child.lock().await.cancel();

        if let Some(handle) = self.inner.stream_handle.lock().await.take() {
            handle.shutdown();
        }

        // Join all background tasks
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        let _ = self
            .inner
            .connection_state
            .send(ConnectionState::Disconnected);
        debug!("engine shut down");
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to backend reachability changes.
    pub fn backend_reachable(&self) -> watch::Receiver<bool> {
        self.inner.backend_reachable.subscribe()
    }

    /// Classify every known device against the staleness threshold,
    /// evaluated at the moment of the call.
    pub fn view(&self) -> Vec<DeviceView> {
        self.inner
            .store
            .view_at(Utc::now(), self.inner.config.offline_threshold)
    }

    /// One-shot backend health probe. `true` only if the endpoint
    /// responds and reports itself online.
    pub async fn probe_health(&self) -> bool {
        matches!(self.inner.client.check_health().await, Ok(true))
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Periodic snapshot refresh at a fixed cadence.
async fn poll_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = engine.refresh().await {
                    warn!(error = %e, "periodic refresh failed");
                }
            }
        }
    }
}

/// Bridge task: stream messages → registry mutations, transport status
/// → [`ConnectionState`].
///
/// Holds the `live` flag that gates the `Connected` transition: the
/// transport reporting an open socket is not enough, only an actual
/// message flips the engine to `Connected`.
async fn stream_bridge_task(
    store: Arc<ReadingStore>,
    state_tx: watch::Sender<ConnectionState>,
    mut messages: broadcast::Receiver<Arc<StreamMessage>>,
    mut status: watch::Receiver<StreamStatus>,
    cancel: CancellationToken,
) {
    let mut live = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                match current {
                    StreamStatus::Reconnecting { attempt } => {
                        live = false;
                        let _ = state_tx.send(ConnectionState::Reconnecting { attempt });
                    }
                    // Handshake alone doesn't make the stream live.
                    StreamStatus::Connected | StreamStatus::Idle => {}
                }
            }
            msg = messages.recv() => {
                match msg {
                    Ok(msg) => {
                        if !live {
                            live = true;
                            let _ = state_tx.send(ConnectionState::Connected);
                        }
                        apply_message(&store, &msg);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "stream consumer lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    debug!("stream bridge exiting");
}

/// Apply one parsed stream message to the registry.
fn apply_message(store: &ReadingStore, msg: &StreamMessage) {
    match msg {
        StreamMessage::Initial(readings) => {
            store.replace_all(readings.iter().cloned().map(DeviceReading::from).collect());
            debug!(devices = store.len(), "in-band resync applied");
        }
        StreamMessage::Update(reading) => {
            let applied = store.upsert(DeviceReading::from(reading.clone()));
            if !applied {
                debug!(device = %reading.device_id, "stale update ignored");
            }
        }
    }
}

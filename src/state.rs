use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::warn;

use crate::config::{Config, ConfigError};
use crate::pending::PendingResults;
use crate::port::SerialHandle;
use crate::wire::IdWidth;

/// A type alias for the shared bridge state.
pub type SharedBridge = Arc<BridgeState>;

/// Acks buffered between the reader and a chunk sender.
const ACK_CHANNEL_CAPACITY: usize = 16;

/// Timing and framing parameters, fixed for the lifetime of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Bound on one idle header poll.
    pub serial_timeout: Duration,
    /// Bound on a frame body once its header arrived.
    pub frame_timeout: Duration,
    /// Pause between header polls.
    pub poll_interval: Duration,
    /// Bound on one client transaction.
    pub network_timeout: Duration,
    /// Poll granularity while awaiting a result.
    pub wait_result: Duration,
    /// Largest body chunk per ack.
    pub chunk_size: usize,
    pub id_width: IdWidth,
    pub result_ttl: Duration,
    pub eviction_interval: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            serial_timeout: Duration::from_millis(100),
            frame_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(5),
            network_timeout: Duration::from_millis(10_000),
            wait_result: Duration::from_millis(50),
            chunk_size: 64,
            id_width: IdWidth::default(),
            result_ttl: Duration::from_millis(30_000),
            eviction_interval: Duration::from_millis(1000),
        }
    }
}

impl TryFrom<&Config> for BridgeSettings {
    type Error = ConfigError;

    fn try_from(config: &Config) -> Result<Self, Self::Error> {
        config.validate()?;
        let id_width = IdWidth::new(config.bridge.cmd_id_size)
            .ok_or_else(|| ConfigError::validation("bridge.cmd_id_size", "out of range"))?;

        Ok(Self {
            serial_timeout: config.serial.timeout(),
            frame_timeout: config.serial.frame_timeout(),
            poll_interval: config.serial.poll_interval(),
            network_timeout: config.server.network_timeout(),
            wait_result: config.server.wait_result(),
            chunk_size: config.bridge.chunk_size,
            id_width,
            result_ttl: config.bridge.result_ttl(),
            eviction_interval: config.bridge.eviction_interval(),
        })
    }
}

/// Everything the reader loop and the sessions share.
///
/// Two locks arbitrate the link. The bridge lock spans one whole client
/// transaction. The serial lock spans a single read or write on the
/// transport and is always taken inside the bridge lock by senders.
#[derive(Debug)]
pub struct BridgeState {
    serial: Mutex<SerialHandle>,
    bridge: Mutex<()>,
    pending: Arc<PendingResults>,
    ack_tx: mpsc::Sender<()>,
    ack_rx: Mutex<mpsc::Receiver<()>>,
    link_name: String,
    settings: BridgeSettings,
}

impl BridgeState {
    pub fn new(link: SerialHandle, settings: BridgeSettings) -> Self {
        let (ack_tx, ack_rx) = mpsc::channel(ACK_CHANNEL_CAPACITY);
        let link_name = link.name().to_string();
        Self {
            serial: Mutex::new(link),
            bridge: Mutex::new(()),
            pending: Arc::new(PendingResults::new()),
            ack_tx,
            ack_rx: Mutex::new(ack_rx),
            link_name,
            settings,
        }
    }

    /// Wrap into the shared handle passed to tasks.
    pub fn shared(self) -> SharedBridge {
        Arc::new(self)
    }

    /// Exclusive access to the transport for one read or write.
    pub async fn lock_serial(&self) -> MutexGuard<'_, SerialHandle> {
        self.serial.lock().await
    }

    /// Exclusive ownership of the bridge for one client transaction.
    pub async fn lock_bridge(&self) -> MutexGuard<'_, ()> {
        self.bridge.lock().await
    }

    /// Whether some session currently owns the bridge.
    pub fn bridge_busy(&self) -> bool {
        self.bridge.try_lock().is_err()
    }

    pub fn pending(&self) -> &Arc<PendingResults> {
        &self.pending
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// Relay one `Ack` frame to whoever is sending chunks.
    pub fn signal_ack(&self) {
        if let Err(mpsc::error::TrySendError::Full(())) = self.ack_tx.try_send(()) {
            warn!("Ack backlog full, dropping acknowledgement");
        }
    }

    /// The receiving end of the ack relay, held by the active sender.
    pub async fn ack_receiver(&self) -> MutexGuard<'_, mpsc::Receiver<()>> {
        self.ack_rx.lock().await
    }
}

//! Connection core of the Argus agent.
//!
//! Maintains an authenticated session with the hub over one of two
//! mutually exclusive transports (outbound WebSocket, inbound SSH),
//! dispatches hub requests to the handler registry, and buffers
//! snapshots while no hub is reachable.

pub mod auth;
pub mod buffer;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod manager;
pub mod ssh;
pub mod ws;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use argus_protocol::data::ConnectionType;
use argus_telemetry::{Aggregator, AggregatorConfig, Producers};

use crate::auth::TrustedKeys;
use crate::buffer::OfflineBuffer;
use crate::handlers::Registry;
use crate::manager::{ConnEvent, ConnectionManager};

pub use crate::config::AgentConfig;
pub use crate::error::AgentError;

/// Agent version reported to the hub.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state of one agent process.
///
/// Everything transports and handlers need hangs off this: identity,
/// trusted keys, the aggregation pipeline, the offline buffer, and the
/// event channel into the connection manager.
pub struct Agent {
    config: AgentConfig,
    fingerprint: String,
    hostname: String,
    keys: TrustedKeys,
    aggregator: Aggregator,
    buffer: OfflineBuffer,
    registry: Registry,
    verified: AtomicBool,
    connection: AtomicU8,
    events_tx: mpsc::Sender<ConnEvent>,
}

impl Agent {
    /// Builds the agent: parses the trusted keys, loads or derives the
    /// fingerprint, and wires the aggregation pipeline.
    ///
    /// Returns the receiving half of the capacity-1 event channel; hand
    /// it to [`run`](Self::run).
    pub fn new(
        config: AgentConfig,
        producers: Producers,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ConnEvent>), AgentError> {
        let keys = TrustedKeys::parse(&config.keys_raw)?;

        let aggregator = Aggregator::new(
            AggregatorConfig {
                agent_version: VERSION.to_string(),
                root_fs: config.root_fs.clone(),
                extra_fs: config.extra_fs.clone(),
                nic_filter: config.nic_filter.clone(),
                mem_calc: config.mem_calc,
                usage_cache_ttl: config.usage_cache_ttl,
                usage_cache_disabled: config.usage_cache_disabled,
            },
            producers,
        );

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default();
        let fingerprint =
            identity::load_or_create(&config.data_dir, &hostname, &aggregator.cpu_model())?;

        let (events_tx, events_rx) = mpsc::channel(1);

        let agent = Arc::new(Self {
            config,
            fingerprint,
            hostname,
            keys,
            aggregator,
            buffer: OfflineBuffer::default(),
            registry: Registry::new(),
            verified: AtomicBool::new(false),
            connection: AtomicU8::new(connection_code(ConnectionType::None)),
            events_tx,
        });
        Ok((agent, events_rx))
    }

    /// Runs the connection manager until `shutdown` fires.
    pub async fn run(
        self: &Arc<Self>,
        events: mpsc::Receiver<ConnEvent>,
        shutdown: CancellationToken,
    ) {
        let manager = ConnectionManager::new(Arc::clone(self));
        manager.run(events, shutdown).await;
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn keys(&self) -> &TrustedKeys {
        &self.keys
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn buffer(&self) -> &OfflineBuffer {
        &self.buffer
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether the hub has proven key possession on the WebSocket.
    pub fn is_verified(&self) -> bool {
        self.verified.load(Ordering::SeqCst)
    }

    pub(crate) fn set_verified(&self, verified: bool) {
        self.verified.store(verified, Ordering::SeqCst);
    }

    /// The transport tag stamped onto gathered snapshots.
    pub fn connection_type(&self) -> ConnectionType {
        match self.connection.load(Ordering::SeqCst) {
            1 => ConnectionType::WebSocket,
            2 => ConnectionType::Ssh,
            _ => ConnectionType::None,
        }
    }

    pub(crate) fn set_connection(&self, connection: ConnectionType) {
        self.connection
            .store(connection_code(connection), Ordering::SeqCst);
    }

    /// Posts an event to the connection manager. Blocks briefly when an
    /// event is already pending; the manager drains fast.
    pub(crate) async fn emit(&self, event: ConnEvent) {
        if self.events_tx.send(event).await.is_err() {
            tracing::warn!(?event, "event channel closed");
        }
    }
}

fn connection_code(connection: ConnectionType) -> u8 {
    match connection {
        ConnectionType::None => 0,
        ConnectionType::WebSocket => 1,
        ConnectionType::Ssh => 2,
    }
}

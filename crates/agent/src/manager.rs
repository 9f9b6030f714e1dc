//! Event-driven connection state machine.
//!
//! Transports post events into a capacity-1 channel; the manager owns
//! the state, starts and stops transports, paces reconnects, and drives
//! the liveness pulse. It never returns transport errors to callers —
//! every failure flows back through the event channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use argus_protocol::data::ConnectionType;
use argus_telemetry::CANONICAL_INTERVAL_MS;

use crate::Agent;
use crate::ssh::SshServer;
use crate::ws::{MIN_DIAL_INTERVAL, WsClient};

/// Transport lifecycle events feeding the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    /// The hub completed the fingerprint exchange over the WebSocket.
    WsConnect,
    /// The WebSocket read loop ended.
    WsDisconnect,
    /// A hub reached us over the inbound SSH transport.
    SshConnect,
    /// The SSH listener stopped.
    SshDisconnect,
}

/// Exactly one transport is active at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    WebSocketConnected,
    SshConnected,
}

/// Background WebSocket retry period while disconnected.
pub const RECONNECT_TICK: Duration = Duration::from_secs(10);

/// Liveness pulse period.
pub const HEALTH_TICK: Duration = Duration::from_secs(90);

/// Cadence of buffered gathers while no hub is reachable.
const OFFLINE_GATHER_TICK: Duration = Duration::from_secs(60);

/// Where the liveness file lives; external watchdogs check its mtime.
pub fn health_path() -> PathBuf {
    std::env::temp_dir().join("argus-agent.health")
}

/// Owns the connection state and both transports.
pub struct ConnectionManager {
    agent: Arc<Agent>,
    ws: Arc<WsClient>,
    ssh: Arc<SshServer>,
    state: StdMutex<ConnectionState>,
    connecting: AtomicBool,
    ticker: StdMutex<Option<CancellationToken>>,
}

impl ConnectionManager {
    pub fn new(agent: Arc<Agent>) -> Arc<Self> {
        Arc::new(Self {
            ws: WsClient::new(agent.clone()),
            ssh: SshServer::new(agent.clone()),
            agent,
            state: StdMutex::new(ConnectionState::Disconnected),
            connecting: AtomicBool::new(false),
            ticker: StdMutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.agent.set_connection(match state {
            ConnectionState::Disconnected => ConnectionType::None,
            ConnectionState::WebSocketConnected => ConnectionType::WebSocket,
            ConnectionState::SshConnected => ConnectionType::Ssh,
        });
    }

    /// Runs the select loop until shutdown.
    pub async fn run(self: &Arc<Self>, mut events: mpsc::Receiver<ConnEvent>, shutdown: CancellationToken) {
        let mut health = tokio::time::interval(HEALTH_TICK);
        let offline_start = tokio::time::Instant::now() + OFFLINE_GATHER_TICK;
        let mut offline = tokio::time::interval_at(offline_start, OFFLINE_GATHER_TICK);
        offline.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        self.spawn_connect();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.shutdown().await;
                    break;
                }

                _ = health.tick() => touch_health_file(),

                _ = offline.tick() => {
                    if self.state() == ConnectionState::Disconnected {
                        let data = self
                            .agent
                            .aggregator()
                            .gather(CANONICAL_INTERVAL_MS, ConnectionType::None);
                        self.agent.buffer().push(data);
                        debug!(buffered = self.agent.buffer().len(), "buffered offline snapshot");
                    }
                }

                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
            }
        }
    }

    /// Applies one event to the state machine.
    pub(crate) async fn handle_event(self: &Arc<Self>, event: ConnEvent) {
        let state = self.state();
        match (state, event) {
            (_, ConnEvent::WsConnect) => {
                info!("hub verified over websocket");
                self.stop_ticker();
                self.ssh.stop().await;
                self.set_state(ConnectionState::WebSocketConnected);
            }
            (ConnectionState::Disconnected, ConnEvent::SshConnect) => {
                info!("hub connected over ssh");
                self.stop_ticker();
                self.set_state(ConnectionState::SshConnected);
            }
            (ConnectionState::WebSocketConnected, ConnEvent::WsDisconnect) => {
                warn!("websocket lost");
                self.ws.close().await;
                self.agent.set_verified(false);
                self.set_state(ConnectionState::Disconnected);
                self.spawn_connect();
                self.start_ticker();
            }
            (ConnectionState::SshConnected, ConnEvent::SshDisconnect) => {
                warn!("ssh listener lost");
                self.agent.set_verified(false);
                self.set_state(ConnectionState::Disconnected);
                self.spawn_connect();
                self.start_ticker();
            }
            (state, event) => debug!(?state, ?event, "event ignored in this state"),
        }
    }

    /// Runs one connect attempt in the background.
    fn spawn_connect(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.connect_flow().await });
    }

    /// The connect sequence: pace, dial, and on failure fall back to the
    /// inbound listener plus the retry ticker. Runs at most once
    /// concurrently.
    async fn connect_flow(self: Arc<Self>) {
        if self.connecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let backoff = remaining_backoff(self.ws.last_attempt());
        if !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }

        match self.ws.connect().await {
            Ok(()) => debug!("dial succeeded, waiting for fingerprint check"),
            Err(e) => {
                warn!("websocket dial failed: {e}");
                if self.state() == ConnectionState::Disconnected {
                    self.ssh.start().await;
                    self.start_ticker();
                }
            }
        }

        self.connecting.store(false, Ordering::SeqCst);
    }

    fn start_ticker(self: &Arc<Self>) {
        let mut guard = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        *guard = Some(cancel.clone());
        drop(guard);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + RECONNECT_TICK;
            let mut tick = tokio::time::interval_at(start, RECONNECT_TICK);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        if manager.state() == ConnectionState::Disconnected {
                            Arc::clone(&manager).connect_flow().await;
                        }
                    }
                }
            }
        });
    }

    fn stop_ticker(&self) {
        if let Some(cancel) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            cancel.cancel();
        }
    }

    async fn shutdown(&self) {
        info!("shutting down");
        self.stop_ticker();
        self.ssh.stop().await;
        self.ws.close().await;
        let _ = std::fs::remove_file(health_path());
    }

    #[cfg(test)]
    pub(crate) fn ssh(&self) -> &Arc<SshServer> {
        &self.ssh
    }
}

/// Time still to wait before the next dial is allowed.
fn remaining_backoff(last_attempt: Option<Instant>) -> Duration {
    match last_attempt {
        Some(last) => MIN_DIAL_INTERVAL.saturating_sub(last.elapsed()),
        None => Duration::ZERO,
    }
}

fn touch_health_file() {
    if let Err(e) = std::fs::write(health_path(), b"ok") {
        warn!("could not touch health file: {e}");
    }
}

//! Inbound SSH fallback transport.
//!
//! When the agent cannot dial out, the hub can reach it here instead.
//! Sessions carry the same CBOR frames as the WebSocket: one request per
//! session, answered on the channel, then closed. Public-key auth
//! against the trusted key set replaces the fingerprint exchange, so
//! every authenticated session dispatches as verified.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Config, Msg, Server, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodSet};
use russh_keys::key::{KeyPair, PublicKey};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use argus_protocol::data::ConnectionType;
use argus_protocol::envelope::{AgentResponse, HubRequest, ProtocolError};

use crate::Agent;
use crate::error::AgentError;
use crate::handlers::Responder;
use crate::manager::ConnEvent;

/// A single request frame may not grow beyond this.
const MAX_REQUEST_SIZE: usize = 64 * 1024;

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

/// The inbound SSH listener. Started while the WebSocket is impossible,
/// stopped as soon as it connects.
pub struct SshServer {
    agent: Arc<Agent>,
    running: Mutex<Option<CancellationToken>>,
}

impl SshServer {
    pub fn new(agent: Arc<Agent>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            running: Mutex::new(None),
        })
    }

    /// Starts the listener. A no-op while already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let Some(host_key) = KeyPair::generate_ed25519() else {
            warn!("could not generate ssh host key");
            return;
        };
        let config = Arc::new(Config {
            methods: MethodSet::PUBLICKEY,
            keys: vec![host_key],
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            auth_rejection_time: Duration::from_secs(1),
            ..Config::default()
        });

        let addr = listen_addr(&self.agent.config().listen);
        let cancel = CancellationToken::new();
        let agent = self.agent.clone();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            info!(%addr, "ssh listener starting");
            agent.emit(ConnEvent::SshConnect).await;
            let mut listener = Listener {
                agent: agent.clone(),
            };
            tokio::select! {
                _ = task_cancel.cancelled() => {}
                result = listener.run_on_address(config, addr.as_str()) => {
                    if let Err(e) = result {
                        warn!("ssh listener failed: {e}");
                    }
                }
            }
            info!("ssh listener stopped");
            agent.emit(ConnEvent::SshDisconnect).await;
        });

        *running = Some(cancel);
    }

    /// Stops the listener. A no-op while not running.
    pub async fn stop(&self) {
        if let Some(cancel) = self.running.lock().await.take() {
            cancel.cancel();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}

/// A `:port` listen value binds every interface.
fn listen_addr(listen: &str) -> String {
    if let Some(port) = listen.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        listen.to_string()
    }
}

struct Listener {
    agent: Arc<Agent>,
}

impl Server for Listener {
    type Handler = SshSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SshSession {
        debug!(?peer_addr, "inbound ssh connection");
        SshSession {
            agent: self.agent.clone(),
            buffer: Vec::new(),
        }
    }
}

struct SshSession {
    agent: Arc<Agent>,
    buffer: Vec<u8>,
}

#[async_trait]
impl russh::server::Handler for SshSession {
    type Error = AgentError;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        if self.agent.keys().contains(public_key) {
            Ok(Auth::Accept)
        } else {
            warn!(%user, "rejecting ssh session: key not trusted");
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_REQUEST_SIZE {
            return Err(AgentError::Protocol(ProtocolError::Decode(
                "request frame too large".into(),
            )));
        }

        // The frame may arrive split across data packets; keep buffering
        // until it decodes.
        let Ok(request) = HubRequest::decode(&self.buffer) else {
            return Ok(());
        };
        self.buffer.clear();

        let responder = BufferedResponder::default();
        self.agent
            .registry()
            .dispatch_and_reply(
                &self.agent,
                &request,
                ConnectionType::Ssh,
                true,
                &responder,
            )
            .await;

        for frame in responder.take() {
            session.data(channel, CryptoVec::from(frame));
        }
        session.eof(channel);
        session.close(channel);
        Ok(())
    }
}

/// Collects encoded response frames so they can be written to the
/// channel after the handler returns.
#[derive(Default)]
struct BufferedResponder {
    frames: std::sync::Mutex<Vec<Vec<u8>>>,
}

impl BufferedResponder {
    fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl Responder for BufferedResponder {
    async fn send(&self, resp: AgentResponse) -> Result<(), AgentError> {
        let bytes = resp.encode()?;
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(bytes);
        Ok(())
    }
}

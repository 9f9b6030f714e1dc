//! Outbound WebSocket client.
//!
//! Dials the hub, decodes binary request frames, and feeds the handler
//! registry. The TLS peer is deliberately not validated: the hub proves
//! its identity with a signature over the registration token, not a
//! certificate chain, so the configured URL may sit behind self-signed
//! or mismatched certificates.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message, WebSocketConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use argus_protocol::data::ConnectionType;
use argus_protocol::envelope::{AgentResponse, HubRequest};

use crate::Agent;
use crate::error::AgentError;
use crate::handlers::Responder;
use crate::manager::ConnEvent;

/// Hub-side handshake endpoint, appended to the configured URL.
const CONNECT_PATH: &str = "api/beszel/agent-connect";

/// Registration token header.
const TOKEN_HEADER: &str = "X-Token";

/// Agent version header.
const VERSION_HEADER: &str = "X-Beszel";

/// If nothing (frame or ping) arrives within this window, the
/// connection is considered dead.
pub const READ_TIMEOUT: Duration = Duration::from_secs(70);

/// Minimum spacing between two dials.
pub const MIN_DIAL_INTERVAL: Duration = Duration::from_secs(5);

const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;
const SEND_BUFFER_SIZE: usize = 64;

/// Two plausible browser strings; one is picked per dial so naive bot
/// filters in front of the hub do not key on a constant value.
const USER_AGENTS: [&str; 2] = [
    "Mozilla/5.0 (Windows NT 11.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0_0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

struct ActiveConn {
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

/// The outbound transport.
pub struct WsClient {
    agent: Arc<Agent>,
    active: Mutex<Option<ActiveConn>>,
    last_attempt: StdMutex<Option<Instant>>,
}

impl WsClient {
    pub fn new(agent: Arc<Agent>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            active: Mutex::new(None),
            last_attempt: StdMutex::new(None),
        })
    }

    /// When the previous dial started, for reconnect pacing.
    pub fn last_attempt(&self) -> Option<Instant> {
        *self.last_attempt.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Dials the hub, closing any previous connection first.
    ///
    /// A successful dial only establishes the socket; the session counts
    /// as connected once the hub completes the fingerprint exchange.
    pub async fn connect(&self) -> Result<(), AgentError> {
        self.close().await;
        *self.last_attempt.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());

        let hub_url = self
            .agent
            .config()
            .hub_url
            .clone()
            .ok_or_else(|| AgentError::Connect("HUB_URL is not configured".into()))?;
        let url = ws_url(&hub_url)?;

        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| AgentError::Connect(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            TOKEN_HEADER,
            HeaderValue::from_str(&self.agent.config().token)
                .map_err(|e| AgentError::Connect(e.to_string()))?,
        );
        headers.insert(VERSION_HEADER, HeaderValue::from_static(crate::VERSION));
        headers.insert(
            "User-Agent",
            HeaderValue::from_static(pick_user_agent()),
        );

        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| AgentError::Connect(e.to_string()))?;

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_SIZE);
        ws_config.max_frame_size = Some(MAX_FRAME_SIZE);

        let (stream, _) = tokio_tungstenite::connect_async_tls_with_config(
            request,
            Some(ws_config),
            false,
            Some(Connector::NativeTls(tls)),
        )
        .await
        .map_err(|e| AgentError::Connect(e.to_string()))?;
        info!(%url, "connected to hub, awaiting fingerprint check");

        let (sink, read) = stream.split();
        let (tx, rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);
        let cancel = CancellationToken::new();

        tokio::spawn(write_pump(sink, rx, cancel.clone()));
        tokio::spawn(read_pump(read, tx.clone(), cancel.clone(), self.agent.clone()));

        *self.active.lock().await = Some(ActiveConn { tx, cancel });
        Ok(())
    }

    /// Closes the connection with normal-closure code 1000. Safe to call
    /// repeatedly or when nothing is connected.
    pub async fn close(&self) {
        if let Some(conn) = self.active.lock().await.take() {
            let _ = conn.tx.try_send(close_frame());
            conn.cancel.cancel();
        }
    }

    /// Serializes and sends a response frame on the active connection.
    pub async fn send(&self, resp: AgentResponse) -> Result<(), AgentError> {
        let bytes = resp.encode()?;
        let guard = self.active.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| AgentError::Connect("not connected".into()))?;
        conn.tx
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|_| AgentError::Connect("send channel closed".into()))
    }
}

fn close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
}

/// Builds the handshake URL: `http` becomes `ws`, `https` becomes `wss`.
fn ws_url(hub_url: &str) -> Result<String, AgentError> {
    let (scheme, rest) = hub_url
        .split_once("://")
        .ok_or_else(|| AgentError::Connect(format!("hub URL has no scheme: {hub_url:?}")))?;
    let ws_scheme = match scheme {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(AgentError::Connect(format!(
                "unsupported hub URL scheme: {other:?}"
            )));
        }
    };
    Ok(format!(
        "{ws_scheme}://{}/{CONNECT_PATH}",
        rest.trim_end_matches('/')
    ))
}

fn pick_user_agent() -> &'static str {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    USER_AGENTS[(nanos % 2) as usize]
}

pub(crate) struct WsResponder {
    tx: mpsc::Sender<Message>,
}

#[async_trait]
impl Responder for WsResponder {
    async fn send(&self, resp: AgentResponse) -> Result<(), AgentError> {
        let bytes = resp.encode()?;
        self.tx
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|_| AgentError::Connect("send channel closed".into()))
    }
}

/// Drains the send channel into the socket. A write failure tears the
/// connection down so the state machine reconnects.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<Message>, cancel: CancellationToken)
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        let closing = matches!(msg, Message::Close(_));
                        if let Err(e) = sink.send(msg).await {
                            warn!("write failed, closing connection: {e}");
                            break;
                        }
                        if closing {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Best-effort close frame for paths that broke out without one.
    let _ = sink.send(close_frame()).await;
    let _ = sink.close().await;
    cancel.cancel();
}

/// Reads frames until the connection dies, dispatching requests.
async fn read_pump<S>(
    mut stream: S,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    agent: Arc<Agent>,
) where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
{
    let responder = WsResponder { tx: tx.clone() };
    let deadline = tokio::time::sleep(READ_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = &mut deadline => {
                warn!("nothing received for {}s, closing connection", READ_TIMEOUT.as_secs());
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + READ_TIMEOUT);
                        match msg {
                            Message::Binary(data) => {
                                match HubRequest::decode(&data) {
                                    Ok(request) => {
                                        agent
                                            .registry()
                                            .dispatch_and_reply(
                                                &agent,
                                                &request,
                                                ConnectionType::WebSocket,
                                                agent.is_verified(),
                                                &responder,
                                            )
                                            .await;
                                    }
                                    Err(e) => warn!("dropping undecodable frame: {e}"),
                                }
                            }
                            Message::Ping(payload) => {
                                let _ = tx.try_send(Message::Pong(payload));
                            }
                            Message::Close(_) => {
                                info!("hub closed the connection");
                                break;
                            }
                            // Text and stray pong/raw frames are ignored.
                            _ => debug!("ignoring non-binary frame"),
                        }
                    }
                    Some(Err(e)) => {
                        warn!("read error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    cancel.cancel();
    agent.set_verified(false);
    agent.emit(ConnEvent::WsDisconnect).await;
}

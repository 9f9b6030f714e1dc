//! Request dispatch: the action registry and its built-in handlers.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use argus_protocol::Action;
use argus_protocol::data::ConnectionType;
use argus_protocol::envelope::{AgentResponse, HubRequest, ProtocolError, ResponsePayload};
use argus_protocol::messages::{
    ContainerRequest, DataRequest, FingerprintRequest, FingerprintResponse, ServiceRequest,
};
use argus_telemetry::producers::ProducerError;

use crate::Agent;
use crate::error::AgentError;
use crate::manager::ConnEvent;

/// Deadline for SMART queries (may spin up device polling).
const SMART_DEADLINE: Duration = Duration::from_secs(5);

/// Deadline for per-request producer calls that may wake hardware or
/// cross a runtime socket (container logs, unit details).
const PRODUCER_DEADLINE: Duration = Duration::from_secs(10);

/// A boxed future returned by handler implementations.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AgentError>> + Send + 'a>>;

/// Transport-independent response channel handed to handlers.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, resp: AgentResponse) -> Result<(), AgentError>;
}

/// Everything a handler may look at for one request.
pub struct HandlerContext<'a> {
    pub agent: &'a Agent,
    pub request: &'a HubRequest,
    pub request_id: Option<u32>,
    /// Whether the hub has proven key possession on this transport.
    pub verified: bool,
    pub transport: ConnectionType,
    pub respond: &'a dyn Responder,
}

impl HandlerContext<'_> {
    /// Sends a payload echoing this request's id.
    async fn reply(&self, payload: ResponsePayload) -> Result<(), AgentError> {
        self.respond
            .send(AgentResponse::new(self.request_id, payload))
            .await
    }
}

/// One action handler.
pub trait RequestHandler: Send + Sync {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a>;
}

/// Maps action codes to handlers and enforces the auth gate.
pub struct Registry {
    handlers: HashMap<Action, Box<dyn RequestHandler>>,
}

impl Registry {
    /// Builds the registry with the full built-in handler set.
    pub fn new() -> Self {
        let mut handlers: HashMap<Action, Box<dyn RequestHandler>> = HashMap::new();
        handlers.insert(Action::CheckFingerprint, Box::new(CheckFingerprint));
        handlers.insert(Action::GetData, Box::new(GetData));
        handlers.insert(Action::GetContainerLogs, Box::new(GetContainerLogs));
        handlers.insert(Action::GetContainerInfo, Box::new(GetContainerInfo));
        handlers.insert(Action::GetSmartData, Box::new(GetSmartData));
        handlers.insert(Action::GetSystemdInfo, Box::new(GetSystemdInfo));
        Self { handlers }
    }

    /// Dispatches one request.
    ///
    /// `CheckFingerprint` is the only action allowed while unverified;
    /// everything else fails with [`AgentError::NotVerified`] first.
    pub async fn dispatch(
        &self,
        agent: &Agent,
        request: &HubRequest,
        transport: ConnectionType,
        verified: bool,
        respond: &dyn Responder,
    ) -> Result<(), AgentError> {
        let action = Action::try_from(request.action)?;
        if action != Action::CheckFingerprint && !verified {
            return Err(AgentError::NotVerified);
        }
        let handler = self
            .handlers
            .get(&action)
            .ok_or(ProtocolError::UnknownAction(request.action))?;
        handler.handle(HandlerContext {
            agent,
            request,
            request_id: request.id,
            verified,
            transport,
            respond,
        })
        .await
    }

    /// Dispatches and converts a handler error into an error response on
    /// the same request id. A successful response also flushes any
    /// snapshots buffered while offline.
    pub async fn dispatch_and_reply(
        &self,
        agent: &Agent,
        request: &HubRequest,
        transport: ConnectionType,
        verified: bool,
        respond: &dyn Responder,
    ) {
        match self
            .dispatch(agent, request, transport, verified, respond)
            .await
        {
            Ok(()) => flush_offline_buffer(agent, respond).await,
            Err(e) => {
                warn!(action = request.action, "handler failed: {e}");
                let reply = AgentResponse::error(request.id, e.to_string());
                if let Err(send_err) = respond.send(reply).await {
                    warn!("could not deliver error response: {send_err}");
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends snapshots captured while disconnected, oldest first, as bare
/// system-data payloads. Undeliverable snapshots go back to the buffer.
async fn flush_offline_buffer(agent: &Agent, respond: &dyn Responder) {
    if agent.buffer().is_empty() {
        return;
    }
    let snapshots = agent.buffer().drain();
    let total = snapshots.len();
    for (i, snapshot) in snapshots.iter().enumerate() {
        let resp = AgentResponse::new(None, ResponsePayload::SystemData(snapshot.clone()));
        if respond.send(resp).await.is_err() {
            warn!(remaining = total - i, "flush interrupted, re-buffering");
            for s in &snapshots[i..] {
                agent.buffer().push(s.clone());
            }
            return;
        }
    }
    tracing::info!(count = total, "flushed offline snapshots");
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

/// Verifies the hub's signature over the registration token.
struct CheckFingerprint;

impl RequestHandler for CheckFingerprint {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let body: FingerprintRequest = ctx.request.parse_data()?;
            if !ctx
                .agent
                .keys()
                .verify(&ctx.agent.config().token, &body.signature)
            {
                return Err(AgentError::InvalidSignature);
            }

            if ctx.transport == ConnectionType::WebSocket && !ctx.agent.is_verified() {
                ctx.agent.set_verified(true);
                ctx.agent.emit(ConnEvent::WsConnect).await;
            }

            let mut resp = FingerprintResponse {
                fingerprint: ctx.agent.fingerprint().to_string(),
                hostname: None,
                port: None,
                name: None,
            };
            if body.need_sys_info {
                resp.hostname = Some(ctx.agent.hostname().to_string());
                resp.port = Some(ctx.agent.config().listen_port());
                resp.name = ctx.agent.config().system_name.clone();
            }
            ctx.reply(ResponsePayload::Fingerprint(resp)).await
        })
    }
}

/// Gathers and returns one combined snapshot.
struct GetData;

impl RequestHandler for GetData {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let body: DataRequest = ctx.request.parse_data().unwrap_or_default();
            let data = ctx
                .agent
                .aggregator()
                .gather(body.cache_time_ms, ctx.agent.connection_type());
            ctx.reply(ResponsePayload::SystemData(data)).await
        })
    }
}

struct GetContainerLogs;

impl RequestHandler for GetContainerLogs {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let provider = ctx
                .agent
                .aggregator()
                .producers()
                .containers
                .clone()
                .ok_or(AgentError::Unsupported)?;
            let body: ContainerRequest = ctx.request.parse_data()?;
            let logs = tokio::time::timeout(PRODUCER_DEADLINE, provider.logs(&body.id))
                .await
                .map_err(|_| ProducerError::new("container query timed out"))??;
            ctx.reply(ResponsePayload::String(logs)).await
        })
    }
}

struct GetContainerInfo;

impl RequestHandler for GetContainerInfo {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let provider = ctx
                .agent
                .aggregator()
                .producers()
                .containers
                .clone()
                .ok_or(AgentError::Unsupported)?;
            let body: ContainerRequest = ctx.request.parse_data()?;
            let info = tokio::time::timeout(PRODUCER_DEADLINE, provider.info(&body.id))
                .await
                .map_err(|_| ProducerError::new("container query timed out"))??;
            ctx.reply(ResponsePayload::String(info)).await
        })
    }
}

/// Returns the current disk-health map; empty without a producer.
struct GetSmartData;

impl RequestHandler for GetSmartData {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let Some(provider) = ctx.agent.aggregator().producers().smart.clone() else {
                return ctx.reply(ResponsePayload::SmartData(BTreeMap::new())).await;
            };
            match tokio::time::timeout(SMART_DEADLINE, provider.refresh()).await {
                Ok(Err(e)) => warn!("smart refresh failed: {e}"),
                Err(_) => warn!("smart refresh timed out"),
                Ok(Ok(())) => {}
            }
            let map = provider.current().unwrap_or_else(|e| {
                warn!("smart producer failed: {e}");
                BTreeMap::new()
            });
            ctx.reply(ResponsePayload::SmartData(map)).await
        })
    }
}

/// Returns details for one systemd unit.
struct GetSystemdInfo;

impl RequestHandler for GetSystemdInfo {
    fn handle<'a>(&'a self, ctx: HandlerContext<'a>) -> HandlerFuture<'a> {
        Box::pin(async move {
            let provider = ctx
                .agent
                .aggregator()
                .producers()
                .services
                .clone()
                .ok_or(AgentError::Unsupported)?;
            let body: ServiceRequest = ctx.request.parse_data()?;
            if body.name.trim().is_empty() {
                return Err(AgentError::InvalidArgument("service name is empty".into()));
            }
            let details = tokio::time::timeout(PRODUCER_DEADLINE, provider.details(&body.name))
                .await
                .map_err(|_| ProducerError::new("service query timed out"))??;
            ctx.reply(ResponsePayload::ServiceInfo(details)).await
        })
    }
}

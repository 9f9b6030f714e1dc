//! Wire protocol types for Argus hub ↔ agent communication.
//!
//! Both transports (outbound WebSocket, inbound SSH) carry the same
//! compact CBOR frames: an integer-keyed request envelope from the hub
//! and an integer-keyed response envelope from the agent. Payload
//! structs use named fields and derived serde.

pub mod action;
pub mod data;
pub mod envelope;
pub mod messages;
pub mod smart;
pub mod systemd;

// Re-export primary types for convenience.
pub use action::Action;
pub use data::{CombinedData, ConnectionType, SystemStats};
pub use envelope::{AgentResponse, HubRequest, ProtocolError, ResponsePayload};

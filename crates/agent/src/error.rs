//! Error kinds shared across transports and handlers.

use argus_protocol::envelope::ProtocolError;
use argus_telemetry::producers::ProducerError;

/// Errors surfaced by the connection core.
///
/// Transport code only produces `Connect` and `Protocol`; everything
/// else is handler-scoped and ends up as the error payload of the
/// response for the matching request id.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport dial or TLS failure. Retried by the state machine.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Frame decode failure or unknown action. Logged; connection kept.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A pre-auth request for anything but the fingerprint exchange.
    #[error("not verified")]
    NotVerified,

    /// The signature matched none of the trusted keys.
    #[error("invalid signature")]
    InvalidSignature,

    /// The request needs a producer this host does not have.
    #[error("unsupported on this system")]
    Unsupported,

    /// The request decoded but its content violates the contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A producer failed. Never fatal.
    #[error(transparent)]
    Producer(#[from] ProducerError),
}

impl From<russh::Error> for AgentError {
    fn from(e: russh::Error) -> Self {
        AgentError::Connect(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(AgentError::NotVerified.to_string(), "not verified");
        assert_eq!(AgentError::InvalidSignature.to_string(), "invalid signature");
        assert_eq!(
            AgentError::InvalidArgument("service name is empty".into()).to_string(),
            "invalid argument: service name is empty"
        );
        assert_eq!(
            AgentError::Protocol(ProtocolError::UnknownAction(9)).to_string(),
            "unknown action code 9"
        );
    }
}

//! Trusted keys and signature verification.
//!
//! The agent never validates the hub's TLS certificate; identity is
//! proven here instead, by a detached signature over the registration
//! token under one of the operator-configured public keys. The same key
//! set gates the inbound SSH transport.

use russh_keys::PublicKeyBase64;
use russh_keys::key::PublicKey;
use tracing::warn;

use crate::error::AgentError;

/// The public keys the agent accepts signatures and SSH sessions from.
pub struct TrustedKeys {
    keys: Vec<PublicKey>,
}

impl TrustedKeys {
    /// Parses newline-separated OpenSSH authorized-key lines.
    ///
    /// Blank lines and comments are skipped; unparsable lines are logged
    /// and skipped. At least one key must survive.
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let mut keys = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_authorized_key(line) {
                Ok(key) => keys.push(key),
                Err(e) => warn!("skipping unparsable public key: {e}"),
            }
        }
        if keys.is_empty() {
            return Err(AgentError::Config(
                "no valid public keys in KEY".to_string(),
            ));
        }
        Ok(Self { keys })
    }

    /// Returns whether `signature` is a valid detached signature over
    /// `token` under any trusted key. First match accepts.
    pub fn verify(&self, token: &str, signature: &[u8]) -> bool {
        self.keys
            .iter()
            .any(|key| key.verify_detached(token.as_bytes(), signature))
    }

    /// Returns whether `offered` is one of the trusted keys.
    pub fn contains(&self, offered: &PublicKey) -> bool {
        let offered = offered.public_key_base64();
        self.keys.iter().any(|k| k.public_key_base64() == offered)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Parses one `<algo> <base64> [comment]` authorized-key line.
fn parse_authorized_key(line: &str) -> Result<PublicKey, AgentError> {
    let b64 = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AgentError::Config(format!("malformed key line: {line:?}")))?;
    russh_keys::parse_public_key_base64(b64)
        .map_err(|e| AgentError::Config(format!("invalid public key: {e}")))
}

//! Service status types, filled in by the systemd producer.

use serde::{Deserialize, Serialize};

/// Coarse unit activation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Active,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    #[default]
    Unknown,
}

/// Coarse state of one watched unit, reported with each snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub name: String,
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_state: String,
}

/// Detailed state of one unit, answering `GetSystemdInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    pub name: String,
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_state: String,
    /// Unix seconds when the unit last entered the active state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage_ns: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarts: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_state_tags() {
        let mut buf = Vec::new();
        ciborium::into_writer(&ServiceState::Failed, &mut buf).unwrap();
        let value: ciborium::Value = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(value.as_text(), Some("failed"));
    }

    #[test]
    fn service_status_roundtrip() {
        let status = ServiceStatus {
            name: "sshd.service".into(),
            state: ServiceState::Active,
            sub_state: "running".into(),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&status, &mut buf).unwrap();
        let parsed: ServiceStatus = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn service_details_roundtrip() {
        let details = ServiceDetails {
            name: "nginx.service".into(),
            state: ServiceState::Active,
            sub_state: "running".into(),
            active_since: Some(1_700_000_000),
            memory_bytes: Some(12 << 20),
            cpu_usage_ns: Some(420_000_000),
            restarts: Some(1),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&details, &mut buf).unwrap();
        let parsed: ServiceDetails = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(parsed, details);
    }
}

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Body of a `GetData` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    /// Requested sample-cache interval in milliseconds. Zero (or a missing
    /// body) selects the canonical 60 000 ms interval.
    #[serde(default)]
    pub cache_time_ms: u16,
}

/// Body of `GetContainerLogs` / `GetContainerInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub id: String,
}

/// Body of `GetSystemdInfo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub name: String,
}

/// Body of a `CheckFingerprint` request, sent by the hub to prove it holds
/// a trusted private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintRequest {
    /// Detached signature over the registration token bytes.
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    /// When set, the reply carries name/hostname/port alongside the
    /// fingerprint so the hub can register the system.
    #[serde(default)]
    pub need_sys_info: bool,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Reply to a successful `CheckFingerprint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintResponse {
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// SSH listen port, so the hub can fall back to the inbound transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Operator-supplied system name, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_request_defaults_to_zero_interval() {
        let req: DataRequest = ciborium::from_reader(&encode(&DataRequest::default())[..]).unwrap();
        assert_eq!(req.cache_time_ms, 0);
    }

    #[test]
    fn fingerprint_request_signature_is_byte_string() {
        let req = FingerprintRequest {
            signature: vec![1, 2, 3, 4],
            need_sys_info: true,
        };
        let bytes = encode(&req);
        // CBOR major type 2 (byte string) for the signature, not an array.
        let value: ciborium::Value = ciborium::from_reader(&bytes[..]).unwrap();
        let map = value.into_map().unwrap();
        let sig = map
            .iter()
            .find(|(k, _)| k.as_text() == Some("signature"))
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(sig.into_bytes().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn fingerprint_response_omits_absent_sys_info() {
        let resp = FingerprintResponse {
            fingerprint: "deadbeef".into(),
            hostname: None,
            port: None,
            name: None,
        };
        let value: ciborium::Value = ciborium::from_reader(&encode(&resp)[..]).unwrap();
        assert_eq!(value.into_map().unwrap().len(), 1);
    }

    fn encode<T: serde::Serialize>(v: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(v, &mut buf).unwrap();
        buf
    }
}

//! Integer-keyed CBOR envelopes.
//!
//! Requests and responses are CBOR maps keyed by small integers so the
//! wire stays compact and field names can evolve freely. The envelope
//! serde impls are written by hand; payload structs use derived serde.

use std::collections::BTreeMap;
use std::fmt;

use ciborium::Value;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::data::CombinedData;
use crate::messages::FingerprintResponse;
use crate::smart::SmartData;
use crate::systemd::ServiceDetails;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),

    #[error("unknown action code {0}")]
    UnknownAction(u8),
}

// Request map keys.
const REQ_KEY_ACTION: u64 = 0;
const REQ_KEY_DATA: u64 = 1;
const REQ_KEY_ID: u64 = 2;

// Response map keys.
const RESP_KEY_ID: u64 = 0;
const RESP_KEY_SYSTEM_DATA: u64 = 1;
const RESP_KEY_FINGERPRINT: u64 = 2;
const RESP_KEY_STRING: u64 = 3;
const RESP_KEY_SMART_DATA: u64 = 4;
const RESP_KEY_SERVICE_INFO: u64 = 5;
const RESP_KEY_ERROR: u64 = 6;

/// A request from the hub.
///
/// The action stays a raw `u8` so that frames with codes this agent does
/// not know still decode; the dispatcher turns them into
/// [`ProtocolError::UnknownAction`] and can answer on the request id.
/// `data` is kept opaque until the matching handler interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct HubRequest {
    pub action: u8,
    pub id: Option<u32>,
    pub data: Value,
}

impl HubRequest {
    /// Decodes a request from a binary frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Encodes the request to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserializes the opaque body into a concrete payload type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        self.data
            .clone()
            .deserialized()
            .map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

impl Serialize for HubRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + usize::from(self.id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(&REQ_KEY_ACTION, &self.action)?;
        map.serialize_entry(&REQ_KEY_DATA, &self.data)?;
        if let Some(id) = self.id {
            map.serialize_entry(&REQ_KEY_ID, &id)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HubRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RequestVisitor;

        impl<'de> Visitor<'de> for RequestVisitor {
            type Value = HubRequest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer-keyed request map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut action = None;
                let mut id = None;
                let mut data = Value::Null;

                while let Some(key) = map.next_key::<u64>()? {
                    match key {
                        REQ_KEY_ACTION => action = Some(map.next_value::<u8>()?),
                        REQ_KEY_DATA => data = map.next_value()?,
                        REQ_KEY_ID => id = Some(map.next_value::<u32>()?),
                        _ => {
                            let _ = map.next_value::<IgnoredAny>()?;
                        }
                    }
                }

                let action = action.ok_or_else(|| de::Error::missing_field("action"))?;
                Ok(HubRequest { action, id, data })
            }
        }

        deserializer.deserialize_map(RequestVisitor)
    }
}

/// The single payload of a response. Exactly one variant is encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    SystemData(CombinedData),
    Fingerprint(FingerprintResponse),
    String(String),
    SmartData(BTreeMap<String, SmartData>),
    ServiceInfo(ServiceDetails),
    Error(String),
}

impl ResponsePayload {
    fn key(&self) -> u64 {
        match self {
            ResponsePayload::SystemData(_) => RESP_KEY_SYSTEM_DATA,
            ResponsePayload::Fingerprint(_) => RESP_KEY_FINGERPRINT,
            ResponsePayload::String(_) => RESP_KEY_STRING,
            ResponsePayload::SmartData(_) => RESP_KEY_SMART_DATA,
            ResponsePayload::ServiceInfo(_) => RESP_KEY_SERVICE_INFO,
            ResponsePayload::Error(_) => RESP_KEY_ERROR,
        }
    }

    fn serialize_into<S: SerializeMap>(&self, map: &mut S) -> Result<(), S::Error> {
        let key = self.key();
        match self {
            ResponsePayload::SystemData(v) => map.serialize_entry(&key, v),
            ResponsePayload::Fingerprint(v) => map.serialize_entry(&key, v),
            ResponsePayload::String(v) => map.serialize_entry(&key, v),
            ResponsePayload::SmartData(v) => map.serialize_entry(&key, v),
            ResponsePayload::ServiceInfo(v) => map.serialize_entry(&key, v),
            ResponsePayload::Error(v) => map.serialize_entry(&key, v),
        }
    }

    /// Encodes the payload alone, without the envelope (legacy mode).
    pub fn encode_bare(&self) -> Result<Vec<u8>, ProtocolError> {
        fn write<T: Serialize>(v: &T) -> Result<Vec<u8>, ProtocolError> {
            let mut buf = Vec::new();
            ciborium::into_writer(v, &mut buf)
                .map_err(|e| ProtocolError::Encode(e.to_string()))?;
            Ok(buf)
        }
        match self {
            ResponsePayload::SystemData(v) => write(v),
            ResponsePayload::Fingerprint(v) => write(v),
            ResponsePayload::String(v) => write(v),
            ResponsePayload::SmartData(v) => write(v),
            ResponsePayload::ServiceInfo(v) => write(v),
            ResponsePayload::Error(v) => write(v),
        }
    }
}

/// A response from the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub id: Option<u32>,
    pub payload: ResponsePayload,
}

impl AgentResponse {
    pub fn new(id: Option<u32>, payload: ResponsePayload) -> Self {
        Self { id, payload }
    }

    /// Builds an error response echoing the request id.
    pub fn error(id: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    /// Encodes the response for the wire.
    ///
    /// Requests carrying an id get the integer-keyed envelope; requests
    /// without one (legacy hubs) get the bare payload bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.id.is_none() {
            return self.payload.encode_bare();
        }
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes an enveloped response from a binary frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

impl Serialize for AgentResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 1 + usize::from(self.id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(id) = self.id {
            map.serialize_entry(&RESP_KEY_ID, &id)?;
        }
        self.payload.serialize_into(&mut map)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for AgentResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ResponseVisitor;

        impl<'de> Visitor<'de> for ResponseVisitor {
            type Value = AgentResponse;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer-keyed response map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut id = None;
                let mut payload = None;

                while let Some(key) = map.next_key::<u64>()? {
                    match key {
                        RESP_KEY_ID => id = Some(map.next_value::<u32>()?),
                        RESP_KEY_SYSTEM_DATA => {
                            payload = Some(ResponsePayload::SystemData(map.next_value()?));
                        }
                        RESP_KEY_FINGERPRINT => {
                            payload = Some(ResponsePayload::Fingerprint(map.next_value()?));
                        }
                        RESP_KEY_STRING => {
                            payload = Some(ResponsePayload::String(map.next_value()?));
                        }
                        RESP_KEY_SMART_DATA => {
                            payload = Some(ResponsePayload::SmartData(map.next_value()?));
                        }
                        RESP_KEY_SERVICE_INFO => {
                            payload = Some(ResponsePayload::ServiceInfo(map.next_value()?));
                        }
                        RESP_KEY_ERROR => {
                            payload = Some(ResponsePayload::Error(map.next_value()?));
                        }
                        _ => {
                            let _ = map.next_value::<IgnoredAny>()?;
                        }
                    }
                }

                let payload =
                    payload.ok_or_else(|| de::Error::custom("response carries no payload"))?;
                Ok(AgentResponse { id, payload })
            }
        }

        deserializer.deserialize_map(ResponseVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::data::ConnectionType;

    #[test]
    fn request_roundtrip_with_id() {
        let req = HubRequest {
            action: Action::GetData.code(),
            id: Some(7),
            data: Value::Map(vec![(
                Value::Text("cacheTimeMs".into()),
                Value::Integer(10_000.into()),
            )]),
        };
        let bytes = req.encode().unwrap();
        let parsed = HubRequest::decode(&bytes).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn request_without_id_omits_the_key() {
        let req = HubRequest {
            action: Action::GetData.code(),
            id: None,
            data: Value::Null,
        };
        let bytes = req.encode().unwrap();
        let value: Value = ciborium::from_reader(&bytes[..]).unwrap();
        assert_eq!(value.into_map().unwrap().len(), 2);
    }

    #[test]
    fn request_with_unknown_action_still_decodes() {
        let req = HubRequest {
            action: 99,
            id: Some(3),
            data: Value::Null,
        };
        let parsed = HubRequest::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(parsed.action, 99);
        assert_eq!(parsed.id, Some(3));
    }

    #[test]
    fn request_ignores_future_keys() {
        // A newer hub may add envelope keys; the agent must skip them.
        let value = Value::Map(vec![
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(1.into()), Value::Null),
            (Value::Integer(2.into()), Value::Integer(1.into())),
            (Value::Integer(9.into()), Value::Text("future".into())),
        ]);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();
        let parsed = HubRequest::decode(&bytes).unwrap();
        assert_eq!(parsed.action, 0);
        assert_eq!(parsed.id, Some(1));
    }

    #[test]
    fn response_roundtrip_every_variant() {
        let payloads = vec![
            ResponsePayload::String("log output".into()),
            ResponsePayload::Error("boom".into()),
            ResponsePayload::SmartData(BTreeMap::new()),
            ResponsePayload::Fingerprint(FingerprintResponse {
                fingerprint: "abc123".into(),
                hostname: Some("host-1".into()),
                port: Some("45876".into()),
                name: None,
            }),
        ];
        for payload in payloads {
            let resp = AgentResponse::new(Some(12), payload);
            let bytes = resp.encode().unwrap();
            let parsed = AgentResponse::decode(&bytes).unwrap();
            assert_eq!(parsed, resp);
        }
    }

    #[test]
    fn response_echoes_request_id() {
        let resp = AgentResponse::error(Some(42), "nope");
        let parsed = AgentResponse::decode(&resp.encode().unwrap()).unwrap();
        assert_eq!(parsed.id, Some(42));
        assert!(matches!(parsed.payload, ResponsePayload::Error(ref m) if m == "nope"));
    }

    #[test]
    fn legacy_response_is_bare_payload() {
        let resp = AgentResponse::new(None, ResponsePayload::String("plain".into()));
        let bytes = resp.encode().unwrap();
        // No envelope: the bytes decode directly as the payload value.
        let text: String = ciborium::from_reader(&bytes[..]).unwrap();
        assert_eq!(text, "plain");
    }

    #[test]
    fn system_data_response_roundtrip() {
        let mut data = CombinedData::default();
        data.connection = ConnectionType::WebSocket;
        data.stats.cpu_pct = 3.0;
        let resp = AgentResponse::new(Some(1), ResponsePayload::SystemData(data));
        let parsed = AgentResponse::decode(&resp.encode().unwrap()).unwrap();
        assert_eq!(parsed, resp);
    }
}

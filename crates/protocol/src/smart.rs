//! Disk-health snapshot types, filled in by the SMART producer.

use serde::{Deserialize, Serialize};

/// One normalized SMART attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAttribute {
    pub id: u16,
    pub name: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worst: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    pub raw: i64,
}

/// Health snapshot for a single device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartData {
    pub device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Overall self-assessment: `true` means the device reports healthy.
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<SmartAttribute>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_data_roundtrip() {
        let data = SmartData {
            device: "nvme0n1".into(),
            model: "Example NVMe 1TB".into(),
            serial: "S0METH1NG".into(),
            temperature: Some(38.0),
            passed: true,
            attributes: vec![SmartAttribute {
                id: 5,
                name: "Reallocated_Sector_Ct".into(),
                value: 100,
                worst: Some(100),
                threshold: Some(10),
                raw: 0,
            }],
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&data, &mut buf).unwrap();
        let parsed: SmartData = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(parsed, data);
    }
}

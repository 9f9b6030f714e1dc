//! The merged snapshot returned for a `GetData` request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::systemd::ServiceStatus;

/// Transport the snapshot was produced under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    None,
    WebSocket,
    Ssh,
}

/// Static host description. Gathered once at startup except for uptime,
/// which is refreshed on every gather.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kernel_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu_model: String,
    pub cores: u32,
    pub threads: u32,
    pub uptime_secs: u64,
    pub agent_version: String,
}

/// Memory breakdown in bytes plus a derived percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub pct: f64,
    pub buff_cache: u64,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub zfs_arc: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// Filesystem usage in bytes plus a derived percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub pct: f64,
}

/// Read/write throughput for one block device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskIoStats {
    pub read_bytes_ps: f64,
    pub write_bytes_ps: f64,
}

/// Aggregate network throughput across eligible interfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub sent_bytes_ps: f64,
    pub recv_bytes_ps: f64,
}

/// Per-interval system statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub cpu_pct: f64,
    pub load_avg: [f64; 3],
    pub mem: MemoryStats,
    /// Root filesystem usage.
    pub disk: DiskUsage,
    /// Extra configured mounts, keyed by label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_disks: BTreeMap<String, DiskUsage>,
    /// Per-device throughput, keyed by device name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub disk_io: BTreeMap<String, DiskIoStats>,
    pub net: NetworkStats,
}

/// Stats for one container, reported by the container producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub name: String,
    pub cpu_pct: f64,
    pub mem_bytes: u64,
    pub net_sent_ps: f64,
    pub net_recv_ps: f64,
}

/// Stats for one GPU, reported by the GPU producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuData {
    pub name: String,
    pub usage_pct: f64,
    pub mem_used: u64,
    pub mem_total: u64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub power_watts: f64,
}

/// The complete snapshot answering a `GetData` request.
///
/// Never mutated after emission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedData {
    pub info: SystemInfo,
    pub stats: SystemStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gpus: Vec<GpuData>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub temperatures: BTreeMap<String, f64>,
    /// Watched systemd units, from the service producer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceStatus>,
    pub connection: ConnectionType,
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(v: &T) -> T
    where
        T: Serialize + for<'de> Deserialize<'de>,
    {
        let mut buf = Vec::new();
        ciborium::into_writer(v, &mut buf).unwrap();
        ciborium::from_reader(&buf[..]).unwrap()
    }

    #[test]
    fn connection_type_tags() {
        let mut buf = Vec::new();
        ciborium::into_writer(&ConnectionType::Ssh, &mut buf).unwrap();
        let value: ciborium::Value = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(value.as_text(), Some("ssh"));
    }

    #[test]
    fn combined_data_roundtrip() {
        let mut data = CombinedData::default();
        data.info.hostname = "node-7".into();
        data.info.cores = 4;
        data.stats.cpu_pct = 12.5;
        data.stats.load_avg = [0.4, 0.3, 0.2];
        data.stats
            .extra_disks
            .insert("backup".into(), DiskUsage { total: 100, used: 50, pct: 50.0 });
        data.temperatures.insert("cpu".into(), 41.0);
        data.connection = ConnectionType::WebSocket;
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn empty_collections_are_omitted() {
        let data = CombinedData::default();
        let mut buf = Vec::new();
        ciborium::into_writer(&data, &mut buf).unwrap();
        let value: ciborium::Value = ciborium::from_reader(&buf[..]).unwrap();
        let keys: Vec<String> = value
            .into_map()
            .unwrap()
            .into_iter()
            .filter_map(|(k, _)| k.into_text().ok())
            .collect();
        assert!(!keys.iter().any(|k| k == "containers"));
        assert!(!keys.iter().any(|k| k == "gpus"));
        assert!(!keys.iter().any(|k| k == "temperatures"));
        assert!(!keys.iter().any(|k| k == "services"));
    }
}

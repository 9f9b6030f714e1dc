//! Environment-driven configuration.
//!
//! Every variable can be set bare (`TOKEN`) or with the agent prefix
//! (`ARGUS_AGENT_TOKEN`); the prefixed form wins, so the agent can share
//! an environment file with other services.

use std::path::PathBuf;
use std::time::Duration;

use argus_telemetry::{FsEntry, MemCalc, NicFilter};

use crate::error::AgentError;

/// Prefix tried before the bare variable name.
pub const ENV_PREFIX: &str = "ARGUS_AGENT_";

/// Default inbound SSH listen address.
pub const DEFAULT_LISTEN: &str = ":45876";

const DEFAULT_DATA_DIR: &str = "./argus_data";
const DEFAULT_CACHE_TTL_MS: u64 = 120_000;

/// One explicitly configured SMART device, from `SMART_DEVICES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartDevice {
    pub name: String,
    pub device_type: Option<String>,
}

/// Agent configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Hub base URL; the agent is inbound-only without it.
    pub hub_url: Option<String>,
    /// Registration token presented on the WebSocket handshake.
    pub token: String,
    /// Raw trusted-key material (OpenSSH authorized-key lines).
    pub keys_raw: String,
    /// SSH listen address, always with a `:` before the port.
    pub listen: String,
    pub data_dir: PathBuf,
    pub system_name: Option<String>,
    pub root_fs: Option<String>,
    pub extra_fs: Vec<FsEntry>,
    pub nic_filter: Option<NicFilter>,
    pub mem_calc: MemCalc,
    pub smart_devices: Vec<SmartDevice>,
    pub service_patterns: Vec<String>,
    pub usage_cache_ttl: Duration,
    pub usage_cache_disabled: bool,
}

impl AgentConfig {
    /// Resolves the configuration from the process environment.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(lookup_env)
    }

    /// Resolves the configuration through an arbitrary lookup function.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let hub_url = get("HUB_URL").map(|u| u.trim_end_matches('/').to_string());

        let token = match get("TOKEN") {
            Some(t) => t,
            None => match get("TOKEN_FILE") {
                Some(path) => std::fs::read_to_string(&path)
                    .map_err(|e| AgentError::Config(format!("cannot read TOKEN_FILE: {e}")))?
                    .trim()
                    .to_string(),
                None => String::new(),
            },
        };
        if hub_url.is_some() && token.is_empty() {
            return Err(AgentError::Config(
                "HUB_URL is set but no TOKEN or TOKEN_FILE given".to_string(),
            ));
        }

        let keys_raw = get("KEY")
            .ok_or_else(|| AgentError::Config("KEY is required".to_string()))?;

        let listen = normalize_listen(
            get("LISTEN")
                .or_else(|| get("PORT"))
                .as_deref()
                .unwrap_or(DEFAULT_LISTEN),
        );

        let usage_cache_ttl = match get("CACHE_DURATION_MS") {
            Some(raw) => Duration::from_millis(raw.parse().map_err(|_| {
                AgentError::Config(format!("CACHE_DURATION_MS is not a number: {raw:?}"))
            })?),
            None => Duration::from_millis(DEFAULT_CACHE_TTL_MS),
        };

        Ok(Self {
            hub_url,
            token,
            keys_raw,
            listen,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into())),
            system_name: get("SYSTEM_NAME").filter(|s| !s.is_empty()),
            root_fs: get("FILESYSTEM").filter(|s| !s.is_empty()),
            extra_fs: get("EXTRA_FILESYSTEMS")
                .map(|raw| parse_extra_fs(&raw))
                .unwrap_or_default(),
            nic_filter: get("NICS").map(|raw| NicFilter::parse(&raw)),
            mem_calc: match get("MEM_CALC").as_deref() {
                Some("htop") => MemCalc::Htop,
                _ => MemCalc::Default,
            },
            smart_devices: get("SMART_DEVICES")
                .map(|raw| parse_smart_devices(&raw))
                .unwrap_or_default(),
            service_patterns: get("SERVICE_PATTERNS")
                .map(|raw| parse_service_patterns(&raw))
                .unwrap_or_default(),
            usage_cache_ttl,
            usage_cache_disabled: get("DISABLE_DISK_CACHE").is_some_and(|v| v != "0" && v != "false"),
        })
    }

    /// The SSH listen port without the leading colon, for the
    /// fingerprint reply.
    pub fn listen_port(&self) -> String {
        self.listen
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

/// Reads `<prefix><name>`, falling back to the bare name.
pub fn lookup_env(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .or_else(|| std::env::var(name).ok())
}

/// Accepts a bare port (`45876`) or a full address (`0.0.0.0:45876`).
fn normalize_listen(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains(':') {
        raw.to_string()
    } else {
        format!(":{raw}")
    }
}

/// Parses `EXTRA_FILESYSTEMS`: comma-separated devices or mount points,
/// each optionally labelled with a `device__label` suffix.
fn parse_extra_fs(raw: &str) -> Vec<FsEntry> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once("__") {
            Some((device, label)) => FsEntry {
                device: device.to_string(),
                label: label.to_string(),
            },
            None => FsEntry {
                device: entry.to_string(),
                label: default_fs_label(entry),
            },
        })
        .collect()
}

fn default_fs_label(entry: &str) -> String {
    entry
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(entry)
        .to_string()
}

/// Parses `SMART_DEVICES`: comma-separated `name` or `name:type`.
fn parse_smart_devices(raw: &str) -> Vec<SmartDevice> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((name, device_type)) => SmartDevice {
                name: name.to_string(),
                device_type: Some(device_type.to_string()),
            },
            None => SmartDevice {
                name: entry.to_string(),
                device_type: None,
            },
        })
        .collect()
}

/// Parses `SERVICE_PATTERNS`, appending `.service` to suffix-less globs.
fn parse_service_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|p| {
            if p.contains('.') {
                p.to_string()
            } else {
                format!("{p}.service")
            }
        })
        .collect()
}

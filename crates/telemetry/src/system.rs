//! Base host information via sysinfo.

use argus_protocol::data::SystemInfo;
use sysinfo::System;

/// Reads the static host description once and refreshes only the
/// volatile parts (uptime) on later calls.
pub struct SystemReader {
    sys: System,
    cached: Option<SystemInfo>,
}

impl SystemReader {
    pub fn new() -> Self {
        Self {
            sys: System::new_all(),
            cached: None,
        }
    }

    /// Returns the host description, stamped with the agent version.
    pub fn info(&mut self, agent_version: &str) -> SystemInfo {
        if let Some(cached) = &self.cached {
            let mut info = cached.clone();
            info.uptime_secs = System::uptime();
            return info;
        }

        let info = SystemInfo {
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            os_name: System::long_os_version().unwrap_or_default(),
            cpu_model: self.cpu_model(),
            cores: self.sys.physical_core_count().unwrap_or(0) as u32,
            threads: self.sys.cpus().len() as u32,
            uptime_secs: System::uptime(),
            agent_version: agent_version.to_string(),
        };
        self.cached = Some(info.clone());
        info
    }

    /// Model string of the first CPU (also feeds identity derivation).
    pub fn cpu_model(&self) -> String {
        self.sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .unwrap_or_default()
    }

    /// 1/5/15-minute load averages.
    pub fn load_avg() -> [f64; 3] {
        let load = System::load_average();
        [load.one, load.five, load.fifteen]
    }
}

impl Default for SystemReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_is_cached_after_first_read() {
        let mut reader = SystemReader::new();
        let first = reader.info("1.0.0");
        let second = reader.info("1.0.0");
        assert_eq!(first.hostname, second.hostname);
        assert_eq!(first.cpu_model, second.cpu_model);
        assert_eq!(first.agent_version, "1.0.0");
        // Uptime is refreshed, so it can only move forward.
        assert!(second.uptime_secs >= first.uptime_secs);
    }

    #[test]
    fn thread_count_at_least_core_count() {
        let mut reader = SystemReader::new();
        let info = reader.info("1.0.0");
        assert!(info.threads >= info.cores);
    }
}

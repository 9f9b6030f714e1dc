//! The gather pipeline: one call, one [`CombinedData`] snapshot.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sysinfo::Disks;
use tracing::warn;

use argus_protocol::data::{CombinedData, ConnectionType, DiskUsage, SystemStats};

use crate::cache::{CANONICAL_INTERVAL_MS, SampleCache};
use crate::cpu::{cpu_percent, round2};
use crate::disk::{DiskSample, DiskUsageCache, disk_io_rates};
use crate::mem::{MemCalc, memory_stats};
use crate::net::{NetSample, NicFilter, default_eligible};
use crate::platform;
use crate::producers::{
    ContainerProvider, GpuProvider, SensorProvider, ServiceProvider, SmartProvider,
};
use crate::system::SystemReader;

/// One extra filesystem to report, from `EXTRA_FILESYSTEMS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// Device name (`sdb1`) or mount point (`/mnt/backup`).
    pub device: String,
    /// Display label the hub sees.
    pub label: String,
}

/// Static configuration for the pipeline.
pub struct AggregatorConfig {
    pub agent_version: String,
    /// Root filesystem override (device or mount point); `/` when unset.
    pub root_fs: Option<String>,
    pub extra_fs: Vec<FsEntry>,
    pub nic_filter: Option<NicFilter>,
    pub mem_calc: MemCalc,
    pub usage_cache_ttl: Duration,
    pub usage_cache_disabled: bool,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            root_fs: None,
            extra_fs: Vec::new(),
            nic_filter: None,
            mem_calc: MemCalc::Default,
            usage_cache_ttl: Duration::from_secs(120),
            usage_cache_disabled: false,
        }
    }
}

/// The optional metric producers attached to the pipeline.
#[derive(Default, Clone)]
pub struct Producers {
    pub containers: Option<std::sync::Arc<dyn ContainerProvider>>,
    pub gpus: Option<std::sync::Arc<dyn GpuProvider>>,
    pub sensors: Option<std::sync::Arc<dyn SensorProvider>>,
    pub smart: Option<std::sync::Arc<dyn SmartProvider>>,
    pub services: Option<std::sync::Arc<dyn ServiceProvider>>,
}

/// Produces [`CombinedData`] snapshots on demand.
///
/// Owns the process-wide sample cache; a fresh cache per gather would
/// recompute every delta from a zero baseline and break the rates.
pub struct Aggregator {
    config: AggregatorConfig,
    cache: SampleCache,
    usage_cache: DiskUsageCache,
    system: Mutex<SystemReader>,
    disks: Mutex<Disks>,
    producers: Producers,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig, producers: Producers) -> Self {
        let cache = SampleCache::new();
        cache.seed_canonical(platform::read_cpu_times());
        let usage_cache =
            DiskUsageCache::new(config.usage_cache_ttl, config.usage_cache_disabled);
        Self {
            config,
            cache,
            usage_cache,
            system: Mutex::new(SystemReader::new()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            producers,
        }
    }

    pub fn producers(&self) -> &Producers {
        &self.producers
    }

    /// Model string of the first CPU, for fingerprint derivation.
    pub fn cpu_model(&self) -> String {
        self.system
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cpu_model()
    }

    /// Builds one snapshot for the given cache interval.
    ///
    /// An interval of 0 selects the canonical 60 000 ms key. Producer
    /// failures degrade to empty results and never abort the gather.
    pub fn gather(&self, cache_time_ms: u16, connection: ConnectionType) -> CombinedData {
        let interval = if cache_time_ms == 0 {
            CANONICAL_INTERVAL_MS
        } else {
            cache_time_ms
        };
        let now = Instant::now();

        let info = {
            let mut system = self.system.lock().unwrap_or_else(|e| e.into_inner());
            system.info(&self.config.agent_version)
        };

        let cpu_pct = match platform::read_cpu_times() {
            Some(cur) => match self.cache.swap_cpu(interval, cur) {
                Some(prev) => cpu_percent(&prev, &cur),
                None => 0.0,
            },
            None => 0.0,
        };

        let load_avg = SystemReader::load_avg();

        let mem = platform::read_mem_info()
            .map(|m| memory_stats(&m, platform::read_zfs_arc_size(), self.config.mem_calc))
            .unwrap_or_default();

        let (disk, extra_disks, tracked_devices) = self.disk_usage();
        let disk_io = self.disk_io(interval, now, &tracked_devices);
        let net = self.network(interval, now);

        let containers = match &self.producers.containers {
            Some(p) => p.stats(interval).unwrap_or_else(|e| {
                warn!("container producer failed: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let gpus = match &self.producers.gpus {
            Some(p) => p.current().unwrap_or_else(|e| {
                warn!("gpu producer failed: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let temperatures = match &self.producers.sensors {
            Some(p) => p.current().unwrap_or_else(|e| {
                warn!("sensor producer failed: {e}");
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        let services = match &self.producers.services {
            Some(p) => p.current().unwrap_or_else(|e| {
                warn!("service producer failed: {e}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        CombinedData {
            info,
            stats: SystemStats {
                cpu_pct,
                load_avg,
                mem,
                disk,
                extra_disks,
                disk_io,
                net,
            },
            containers,
            gpus,
            temperatures,
            services,
            connection,
        }
    }

    /// Root usage (always fresh), extra-mount usage (cached), and the
    /// block device names tracked for throughput.
    fn disk_usage(&self) -> (DiskUsage, BTreeMap<String, DiskUsage>, Vec<String>) {
        let mut disks = self.disks.lock().unwrap_or_else(|e| e.into_inner());
        disks.refresh(true);

        let root_target = self.config.root_fs.as_deref();
        let root = find_usage(&disks, root_target).unwrap_or_default();

        let mut tracked = Vec::new();
        if let Some(name) = find_device_name(&disks, root_target) {
            tracked.push(name);
        }

        let mut extra = BTreeMap::new();
        for entry in &self.config.extra_fs {
            let usage = self
                .usage_cache
                .resolve(&entry.label, || find_usage(&disks, Some(&entry.device)));
            match usage {
                Some(u) => {
                    extra.insert(entry.label.clone(), u);
                }
                None => warn!(device = %entry.device, "extra filesystem not found"),
            }
            if let Some(name) = find_device_name(&disks, Some(&entry.device)) {
                if !tracked.contains(&name) {
                    tracked.push(name);
                }
            }
        }
        (root, extra, tracked)
    }

    fn disk_io(
        &self,
        interval: u16,
        now: Instant,
        devices: &[String],
    ) -> BTreeMap<String, argus_protocol::data::DiskIoStats> {
        let sample = DiskSample {
            at: now,
            counters: platform::read_disk_counters(),
        };
        match self.cache.swap_disk(interval, sample.clone()) {
            Some(prev) => disk_io_rates(&prev, &sample, devices),
            None => BTreeMap::new(),
        }
    }

    fn network(&self, interval: u16, now: Instant) -> argus_protocol::data::NetworkStats {
        let counters = platform::read_net_counters()
            .into_iter()
            .filter(|(name, c)| match &self.config.nic_filter {
                Some(filter) => filter.admits(name),
                None => default_eligible(name, c),
            })
            .collect();
        let sample = NetSample { at: now, counters };
        match self.cache.swap_net(interval, sample.clone()) {
            Some(prev) => crate::net::network_rates(&prev, &sample),
            None => argus_protocol::data::NetworkStats::default(),
        }
    }
}

/// Finds the usage of the filesystem matching `target` (mount point or
/// device name); `None` targets the root mount.
fn find_usage(disks: &Disks, target: Option<&str>) -> Option<DiskUsage> {
    let disk = find_disk(disks, target)?;
    let total = disk.total_space();
    let used = total.saturating_sub(disk.available_space());
    let pct = if total > 0 {
        round2(used as f64 / total as f64 * 100.0)
    } else {
        0.0
    };
    Some(DiskUsage { total, used, pct })
}

/// Short device name (`sda1`) of the matching filesystem, for diskstats
/// correlation.
fn find_device_name(disks: &Disks, target: Option<&str>) -> Option<String> {
    let disk = find_disk(disks, target)?;
    Path::new(disk.name())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

fn find_disk<'a>(disks: &'a Disks, target: Option<&str>) -> Option<&'a sysinfo::Disk> {
    match target {
        None => disks.iter().find(|d| d.mount_point() == Path::new("/")),
        Some(t) => disks.iter().find(|d| {
            d.mount_point() == Path::new(t)
                || Path::new(d.name())
                    .file_name()
                    .is_some_and(|n| n.to_str() == Some(t))
        }),
    }
}

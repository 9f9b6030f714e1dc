//! Disk throughput deltas and the slow-moving usage cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use argus_protocol::data::{DiskIoStats, DiskUsage};

use crate::cpu::round2;

const SECTOR_SIZE: u64 = 512;

/// Cumulative I/O counters for one block device, in sectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub sectors_read: u64,
    pub sectors_written: u64,
}

/// A timestamped set of per-device counters.
#[derive(Debug, Clone)]
pub struct DiskSample {
    pub at: Instant,
    pub counters: HashMap<String, DiskCounters>,
}

/// Per-device byte throughput between two samples, restricted to the
/// tracked device names. Wrapped counters contribute 0.
pub fn disk_io_rates(
    prev: &DiskSample,
    cur: &DiskSample,
    devices: &[String],
) -> BTreeMap<String, DiskIoStats> {
    let elapsed = cur.at.saturating_duration_since(prev.at).as_secs_f64();
    let mut rates = BTreeMap::new();
    if elapsed <= 0.0 {
        return rates;
    }

    for device in devices {
        let (Some(c), Some(p)) = (cur.counters.get(device), prev.counters.get(device)) else {
            continue;
        };
        let read = c.sectors_read.saturating_sub(p.sectors_read) * SECTOR_SIZE;
        let written = c.sectors_written.saturating_sub(p.sectors_written) * SECTOR_SIZE;
        rates.insert(
            device.clone(),
            DiskIoStats {
                read_bytes_ps: round2(read as f64 / elapsed),
                write_bytes_ps: round2(written as f64 / elapsed),
            },
        );
    }
    rates
}

/// Usage values this close together are considered unchanged; statfs
/// results drift by a few MiB between calls without meaning anything.
const USAGE_TOLERANCE: u64 = 16 * 1024 * 1024;

struct CachedUsage {
    at: Instant,
    usage: DiskUsage,
}

/// Cache for extra-filesystem usage.
///
/// A statfs call is cheap but not free, and usage changes slowly; extra
/// mounts are only re-measured when the TTL lapses (the root filesystem
/// bypasses this cache entirely).
pub struct DiskUsageCache {
    ttl: Duration,
    disabled: bool,
    entries: Mutex<HashMap<String, CachedUsage>>,
}

impl DiskUsageCache {
    pub fn new(ttl: Duration, disabled: bool) -> Self {
        Self {
            ttl,
            disabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the usage for `label`, reading fresh values via `read`
    /// when the cache cannot answer.
    ///
    /// A fresh reading within [`USAGE_TOLERANCE`] of the cached one (on
    /// both total and used) keeps the cached values.
    pub fn resolve(
        &self,
        label: &str,
        read: impl FnOnce() -> Option<DiskUsage>,
    ) -> Option<DiskUsage> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if !self.disabled
            && let Some(entry) = entries.get(label)
            && now.saturating_duration_since(entry.at) < self.ttl
        {
            return Some(entry.usage.clone());
        }

        let fresh = read()?;
        match entries.get_mut(label) {
            Some(entry) if within_tolerance(&entry.usage, &fresh) => {
                entry.at = now;
                Some(entry.usage.clone())
            }
            Some(entry) => {
                entry.usage = fresh.clone();
                entry.at = now;
                Some(fresh)
            }
            None => {
                entries.insert(
                    label.to_string(),
                    CachedUsage {
                        at: now,
                        usage: fresh.clone(),
                    },
                );
                Some(fresh)
            }
        }
    }
}

fn within_tolerance(a: &DiskUsage, b: &DiskUsage) -> bool {
    a.total.abs_diff(b.total) <= USAGE_TOLERANCE && a.used.abs_diff(b.used) <= USAGE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(total: u64, used: u64) -> DiskUsage {
        DiskUsage {
            total,
            used,
            pct: if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    #[test]
    fn io_rates_for_tracked_devices() {
        let at = Instant::now();
        let prev = DiskSample {
            at,
            counters: HashMap::from([
                ("sda".into(), DiskCounters { sectors_read: 0, sectors_written: 0 }),
                ("sdb".into(), DiskCounters { sectors_read: 0, sectors_written: 0 }),
            ]),
        };
        let cur = DiskSample {
            at: at + Duration::from_secs(1),
            counters: HashMap::from([
                ("sda".into(), DiskCounters { sectors_read: 100, sectors_written: 50 }),
                ("sdb".into(), DiskCounters { sectors_read: 9999, sectors_written: 9999 }),
            ]),
        };
        let rates = disk_io_rates(&prev, &cur, &["sda".into()]);
        assert_eq!(rates.len(), 1);
        let sda = &rates["sda"];
        assert_eq!(sda.read_bytes_ps, (100 * SECTOR_SIZE) as f64);
        assert_eq!(sda.write_bytes_ps, (50 * SECTOR_SIZE) as f64);
    }

    #[test]
    fn io_counter_wrap_yields_zero() {
        let at = Instant::now();
        let prev = DiskSample {
            at,
            counters: HashMap::from([(
                "sda".into(),
                DiskCounters { sectors_read: 1000, sectors_written: 1000 },
            )]),
        };
        let cur = DiskSample {
            at: at + Duration::from_secs(1),
            counters: HashMap::from([(
                "sda".into(),
                DiskCounters { sectors_read: 10, sectors_written: 2000 },
            )]),
        };
        let rates = disk_io_rates(&prev, &cur, &["sda".into()]);
        assert_eq!(rates["sda"].read_bytes_ps, 0.0);
        assert_eq!(rates["sda"].write_bytes_ps, (1000 * SECTOR_SIZE) as f64);
    }

    #[test]
    fn cache_serves_entries_within_ttl() {
        let cache = DiskUsageCache::new(Duration::from_secs(60), false);
        let first = cache.resolve("data", || Some(usage(1000 << 20, 500 << 20)));
        assert_eq!(first.unwrap().used, 500 << 20);

        // Second read inside the TTL never calls statfs.
        let second = cache.resolve("data", || panic!("should not re-read inside TTL"));
        assert_eq!(second.unwrap().used, 500 << 20);
    }

    #[test]
    fn drift_within_tolerance_keeps_cached_values() {
        let cache = DiskUsageCache::new(Duration::ZERO, false);
        let base = usage(1000 << 20, 500 << 20);
        cache.resolve("data", || Some(base.clone()));

        // 8 MiB of drift on both axes: below the 16 MiB tolerance.
        let drifted = usage((1000 << 20) + (8 << 20), (500 << 20) + (8 << 20));
        let got = cache.resolve("data", || Some(drifted)).unwrap();
        assert_eq!(got.total, base.total);
        assert_eq!(got.used, base.used);
    }

    #[test]
    fn real_change_replaces_cached_values() {
        let cache = DiskUsageCache::new(Duration::ZERO, false);
        cache.resolve("data", || Some(usage(1000 << 20, 500 << 20)));

        let grown = usage(1000 << 20, 700 << 20);
        let got = cache.resolve("data", || Some(grown.clone())).unwrap();
        assert_eq!(got.used, grown.used);
    }

    #[test]
    fn disabled_cache_always_reads() {
        let cache = DiskUsageCache::new(Duration::from_secs(3600), true);
        cache.resolve("data", || Some(usage(100 << 20, 10 << 20)));
        let mut called = false;
        cache.resolve("data", || {
            called = true;
            Some(usage(100 << 20, 90 << 20))
        });
        assert!(called);
    }
}

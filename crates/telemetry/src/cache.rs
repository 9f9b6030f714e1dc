//! Last-sample memo for delta-based metrics.
//!
//! The hub may poll at several cadences at once (a realtime dashboard at
//! 20 s and history collection at 60 s, say); each cadence needs its own
//! previous-counter state or the deltas bleed into each other.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::cpu::CpuTimes;
use crate::disk::DiskSample;
use crate::net::NetSample;

/// The canonical interval. Unseen intervals seed from this key so their
/// first reading does not spike from a zero baseline.
pub const CANONICAL_INTERVAL_MS: u16 = 60_000;

#[derive(Default)]
struct IntervalSample {
    cpu: Option<CpuTimes>,
    net: Option<NetSample>,
    disk: Option<DiskSample>,
}

/// Process-wide memo of the previous counters per cache interval.
///
/// Keys are created lazily and never evicted. Each swap is one critical
/// section, so concurrent gathers for the same interval serialize their
/// read-then-update.
#[derive(Default)]
pub struct SampleCache {
    entries: Mutex<HashMap<u16, IntervalSample>>,
}

impl SampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the canonical interval from a best-effort startup reading.
    pub fn seed_canonical(&self, cpu: Option<CpuTimes>) {
        let mut entries = self.lock();
        entries.entry(CANONICAL_INTERVAL_MS).or_default().cpu = cpu;
    }

    /// Stores `current` for the interval and returns the previous value,
    /// falling back to the canonical interval for a never-seen key.
    pub fn swap_cpu(&self, interval_ms: u16, current: CpuTimes) -> Option<CpuTimes> {
        let mut entries = self.lock();
        let prev = match entries.get(&interval_ms).and_then(|e| e.cpu) {
            Some(prev) => Some(prev),
            None => entries.get(&CANONICAL_INTERVAL_MS).and_then(|e| e.cpu),
        };
        entries.entry(interval_ms).or_default().cpu = Some(current);
        prev
    }

    /// Same swap contract as [`swap_cpu`](Self::swap_cpu) for network counters.
    pub fn swap_net(&self, interval_ms: u16, current: NetSample) -> Option<NetSample> {
        let mut entries = self.lock();
        let prev = match entries.get(&interval_ms).and_then(|e| e.net.clone()) {
            Some(prev) => Some(prev),
            None => entries
                .get(&CANONICAL_INTERVAL_MS)
                .and_then(|e| e.net.clone()),
        };
        entries.entry(interval_ms).or_default().net = Some(current);
        prev
    }

    /// Same swap contract as [`swap_cpu`](Self::swap_cpu) for disk counters.
    pub fn swap_disk(&self, interval_ms: u16, current: DiskSample) -> Option<DiskSample> {
        let mut entries = self.lock();
        let prev = match entries.get(&interval_ms).and_then(|e| e.disk.clone()) {
            Some(prev) => Some(prev),
            None => entries
                .get(&CANONICAL_INTERVAL_MS)
                .and_then(|e| e.disk.clone()),
        };
        entries.entry(interval_ms).or_default().disk = Some(current);
        prev
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u16, IntervalSample>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use std::time::Instant;

    use crate::net::NetCounters;

    fn times(user: u64) -> CpuTimes {
        CpuTimes {
            user,
            ..CpuTimes::default()
        }
    }

    #[test]
    fn first_swap_returns_none_without_seed() {
        let cache = SampleCache::new();
        assert_eq!(cache.swap_cpu(10_000, times(1)), None);
        assert_eq!(cache.swap_cpu(10_000, times(2)), Some(times(1)));
    }

    #[test]
    fn unseen_interval_seeds_from_canonical() {
        let cache = SampleCache::new();
        cache.seed_canonical(Some(times(100)));

        // A brand-new interval starts from the canonical baseline, not zero.
        assert_eq!(cache.swap_cpu(20_000, times(150)), Some(times(100)));
        // And from then on tracks its own state.
        assert_eq!(cache.swap_cpu(20_000, times(200)), Some(times(150)));
    }

    #[test]
    fn intervals_do_not_bleed_into_each_other() {
        let cache = SampleCache::new();
        cache.swap_cpu(10_000, times(10));
        cache.swap_cpu(60_000, times(99));
        assert_eq!(cache.swap_cpu(10_000, times(20)), Some(times(10)));
        assert_eq!(cache.swap_cpu(60_000, times(100)), Some(times(99)));
    }

    #[test]
    fn net_swap_falls_back_to_canonical() {
        let cache = SampleCache::new();
        let sample = NetSample {
            at: Instant::now(),
            counters: StdHashMap::from([("eth0".into(), NetCounters { recv: 5, sent: 5 })]),
        };
        cache.swap_net(CANONICAL_INTERVAL_MS, sample.clone());

        let prev = cache
            .swap_net(
                15_000,
                NetSample {
                    at: Instant::now(),
                    counters: StdHashMap::new(),
                },
            )
            .expect("canonical seed");
        assert_eq!(prev.counters["eth0"], NetCounters { recv: 5, sent: 5 });
    }
}

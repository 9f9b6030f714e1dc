//! Network interface selection and throughput deltas.

use std::collections::HashMap;
use std::time::Instant;

use argus_protocol::data::NetworkStats;

use crate::cpu::round2;

/// Cumulative byte counters for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub recv: u64,
    pub sent: u64,
}

/// A timestamped set of per-interface counters.
#[derive(Debug, Clone)]
pub struct NetSample {
    pub at: Instant,
    pub counters: HashMap<String, NetCounters>,
}

/// Interface name prefixes that are never reported: loopback and the
/// virtual devices container runtimes create.
const SKIPPED_PREFIXES: [&str; 4] = ["lo", "docker", "br-", "veth"];

/// Returns whether an interface qualifies under the built-in policy:
/// not a skipped virtual device, and it has moved at least one byte.
pub fn default_eligible(name: &str, counters: &NetCounters) -> bool {
    if SKIPPED_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return false;
    }
    counters.recv > 0 || counters.sent > 0
}

/// Operator interface list, parsed from the `NICS` variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicFilter {
    /// Only the named interfaces are admitted. An empty list admits none.
    Include(Vec<String>),
    /// The named interfaces are dropped. An empty list admits all.
    Exclude(Vec<String>),
}

impl NicFilter {
    /// Parses a comma-separated list. A leading `-` switches the whole
    /// list to exclude mode. Entries may carry a `*` wildcard.
    pub fn parse(raw: &str) -> Self {
        let (exclude, list) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let names: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if exclude {
            NicFilter::Exclude(names)
        } else {
            NicFilter::Include(names)
        }
    }

    /// Returns whether the named interface passes this filter.
    pub fn admits(&self, name: &str) -> bool {
        match self {
            NicFilter::Include(names) => names.iter().any(|p| wildcard_match(p, name)),
            NicFilter::Exclude(names) => !names.iter().any(|p| wildcard_match(p, name)),
        }
    }
}

/// Matches `pattern` against `name`, honoring a single `*` wildcard at
/// the start, end, or middle of the pattern.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
    }
}

/// Aggregate throughput between two samples across all interfaces present
/// in both. A counter that moved backwards contributes 0.
pub fn network_rates(prev: &NetSample, cur: &NetSample) -> NetworkStats {
    let elapsed = cur.at.saturating_duration_since(prev.at).as_secs_f64();
    if elapsed <= 0.0 {
        return NetworkStats::default();
    }

    let mut sent = 0u64;
    let mut recv = 0u64;
    for (name, c) in &cur.counters {
        if let Some(p) = prev.counters.get(name) {
            sent += c.sent.saturating_sub(p.sent);
            recv += c.recv.saturating_sub(p.recv);
        }
    }

    NetworkStats {
        sent_bytes_ps: round2(sent as f64 / elapsed),
        recv_bytes_ps: round2(recv as f64 / elapsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counters(recv: u64, sent: u64) -> NetCounters {
        NetCounters { recv, sent }
    }

    #[test]
    fn virtual_devices_are_skipped() {
        let c = counters(1, 1);
        assert!(!default_eligible("lo", &c));
        assert!(!default_eligible("docker0", &c));
        assert!(!default_eligible("br-4f2a", &c));
        assert!(!default_eligible("veth12ab", &c));
        assert!(default_eligible("eth0", &c));
        assert!(default_eligible("enp3s0", &c));
    }

    #[test]
    fn idle_interfaces_are_skipped() {
        assert!(!default_eligible("eth0", &counters(0, 0)));
        assert!(default_eligible("eth0", &counters(1, 0)));
    }

    #[test]
    fn include_list_admits_only_named() {
        let filter = NicFilter::parse("eth0,wlan0");
        assert!(filter.admits("eth0"));
        assert!(filter.admits("wlan0"));
        assert!(!filter.admits("eth1"));
    }

    #[test]
    fn empty_include_list_blocks_all() {
        let filter = NicFilter::parse("");
        assert_eq!(filter, NicFilter::Include(vec![]));
        assert!(!filter.admits("eth0"));
    }

    #[test]
    fn exclude_list_drops_named() {
        let filter = NicFilter::parse("-wlan0");
        assert!(filter.admits("eth0"));
        assert!(!filter.admits("wlan0"));
    }

    #[test]
    fn empty_exclude_list_admits_all() {
        let filter = NicFilter::parse("-");
        assert_eq!(filter, NicFilter::Exclude(vec![]));
        assert!(filter.admits("eth0"));
    }

    #[test]
    fn wildcard_entries() {
        let filter = NicFilter::parse("eth*,*br0");
        assert!(filter.admits("eth0"));
        assert!(filter.admits("eth12"));
        assert!(filter.admits("mybr0"));
        assert!(!filter.admits("wlan0"));

        let filter = NicFilter::parse("en*s0");
        assert!(filter.admits("enp3s0"));
        assert!(!filter.admits("enp3s1"));
    }

    #[test]
    fn rates_sum_across_interfaces() {
        let at = Instant::now();
        let prev = NetSample {
            at,
            counters: HashMap::from([
                ("eth0".into(), counters(1000, 500)),
                ("wlan0".into(), counters(200, 100)),
            ]),
        };
        let cur = NetSample {
            at: at + Duration::from_secs(10),
            counters: HashMap::from([
                ("eth0".into(), counters(11_000, 5_500)),
                ("wlan0".into(), counters(1_200, 600)),
            ]),
        };
        let rates = network_rates(&prev, &cur);
        assert_eq!(rates.recv_bytes_ps, 1_100.0);
        assert_eq!(rates.sent_bytes_ps, 550.0);
    }

    #[test]
    fn wrapped_counter_contributes_zero() {
        let at = Instant::now();
        let prev = NetSample {
            at,
            counters: HashMap::from([("eth0".into(), counters(u64::MAX - 10, 1000))]),
        };
        let cur = NetSample {
            at: at + Duration::from_secs(1),
            counters: HashMap::from([("eth0".into(), counters(100, 2000))]),
        };
        let rates = network_rates(&prev, &cur);
        assert_eq!(rates.recv_bytes_ps, 0.0);
        assert_eq!(rates.sent_bytes_ps, 1000.0);
    }

    #[test]
    fn interface_missing_from_previous_sample_is_ignored() {
        let at = Instant::now();
        let prev = NetSample {
            at,
            counters: HashMap::new(),
        };
        let cur = NetSample {
            at: at + Duration::from_secs(1),
            counters: HashMap::from([("eth0".into(), counters(5000, 5000))]),
        };
        let rates = network_rates(&prev, &cur);
        assert_eq!(rates.recv_bytes_ps, 0.0);
    }
}

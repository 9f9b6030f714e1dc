//! CPU time accounting and busy-percentage deltas.

/// Cumulative CPU times from the scheduler, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Total ticks. Guest and GuestNice are already folded into user/nice
    /// by the kernel, so they are subtracted to avoid double counting.
    pub fn total(&self) -> u64 {
        (self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq
            + self.steal)
            .saturating_sub(self.guest + self.guest_nice)
    }

    /// Ticks spent idle (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// Busy percentage between two readings, clamped to [0, 100].
///
/// Identical readings (or a counter that moved backwards after a reboot
/// or producer restart) yield 0.
pub fn cpu_percent(prev: &CpuTimes, cur: &CpuTimes) -> f64 {
    let total_delta = cur.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = cur.idle_total().saturating_sub(prev.idle_total());
    let busy = total_delta.saturating_sub(idle_delta) as f64;
    round2((busy / total_delta as f64 * 100.0).clamp(0.0, 100.0))
}

/// Rounds to two decimal places.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

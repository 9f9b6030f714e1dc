//! Memory breakdown from raw meminfo counters.

use argus_protocol::data::MemoryStats;

use crate::cpu::round2;

/// Raw meminfo counters, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub total: u64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub s_reclaimable: u64,
    pub shmem: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

/// How "used" memory is accounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MemCalc {
    /// used = total − free − buffers − cached (reclaimable counted as cache).
    #[default]
    Default,
    /// htop-style: used = total − free − buff/cache.
    Htop,
}

/// Builds the memory breakdown from raw counters.
///
/// `buff_cache` is total − free − used − shared, which resolves to
/// buffers + cached + reclaimable − shmem. A nonzero ZFS ARC size is
/// subtracted from used and reported as its own bucket: the ARC shrinks
/// under pressure, so counting it as used overstates real consumption.
pub fn memory_stats(m: &MemInfo, zfs_arc: u64, calc: MemCalc) -> MemoryStats {
    let buff_cache = (m.buffers + m.cached + m.s_reclaimable).saturating_sub(m.shmem);
    let mut used = match calc {
        MemCalc::Default => m
            .total
            .saturating_sub(m.free + m.buffers + m.cached + m.s_reclaimable),
        MemCalc::Htop => m.total.saturating_sub(m.free + buff_cache),
    };

    let mut arc = 0;
    if zfs_arc > 0 && zfs_arc < used {
        used -= zfs_arc;
        arc = zfs_arc;
    }

    let pct = if m.total > 0 {
        round2(used as f64 / m.total as f64 * 100.0)
    } else {
        0.0
    };

    MemoryStats {
        total: m.total,
        used,
        pct,
        buff_cache,
        zfs_arc: arc,
        swap_total: m.swap_total,
        swap_used: m.swap_total.saturating_sub(m.swap_free),
    }
}

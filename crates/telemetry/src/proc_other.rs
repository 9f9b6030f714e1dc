//! Fallback counter readers for platforms without procfs.
//!
//! Rates degrade to zero; base info still comes from sysinfo.

use std::collections::HashMap;

use crate::cpu::CpuTimes;
use crate::disk::DiskCounters;
use crate::mem::MemInfo;
use crate::net::NetCounters;

pub fn read_cpu_times() -> Option<CpuTimes> {
    None
}

pub fn read_mem_info() -> Option<MemInfo> {
    None
}

pub fn read_zfs_arc_size() -> u64 {
    0
}

pub fn read_net_counters() -> HashMap<String, NetCounters> {
    HashMap::new()
}

pub fn read_disk_counters() -> HashMap<String, DiskCounters> {
    HashMap::new()
}

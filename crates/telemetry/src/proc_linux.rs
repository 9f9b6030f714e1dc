//! Linux procfs counter readers.
//!
//! Each reader is a thin file read over a pure parser so the parsing is
//! testable without a live /proc.

use std::collections::HashMap;

use crate::cpu::CpuTimes;
use crate::disk::DiskCounters;
use crate::mem::MemInfo;
use crate::net::NetCounters;

/// Reads the aggregate CPU line from `/proc/stat`.
pub fn read_cpu_times() -> Option<CpuTimes> {
    let contents = std::fs::read_to_string("/proc/stat").ok()?;
    parse_cpu_times(&contents)
}

/// Reads `/proc/meminfo`, converting kibibyte fields to bytes.
pub fn read_mem_info() -> Option<MemInfo> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    Some(parse_mem_info(&contents))
}

/// Reads the ZFS ARC size, 0 when ZFS is not loaded.
pub fn read_zfs_arc_size() -> u64 {
    std::fs::read_to_string("/proc/spl/kstat/zfs/arcstats")
        .ok()
        .and_then(|c| parse_arc_size(&c))
        .unwrap_or(0)
}

/// Reads per-interface byte counters from `/proc/net/dev`.
pub fn read_net_counters() -> HashMap<String, NetCounters> {
    std::fs::read_to_string("/proc/net/dev")
        .map(|c| parse_net_dev(&c))
        .unwrap_or_default()
}

/// Reads per-device sector counters from `/proc/diskstats`.
pub fn read_disk_counters() -> HashMap<String, DiskCounters> {
    std::fs::read_to_string("/proc/diskstats")
        .map(|c| parse_diskstats(&c))
        .unwrap_or_default()
}

fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let mut fields = line.split_whitespace().skip(1).map(|f| f.parse().unwrap_or(0));
    Some(CpuTimes {
        user: fields.next()?,
        nice: fields.next()?,
        system: fields.next()?,
        idle: fields.next()?,
        iowait: fields.next().unwrap_or(0),
        irq: fields.next().unwrap_or(0),
        softirq: fields.next().unwrap_or(0),
        steal: fields.next().unwrap_or(0),
        guest: fields.next().unwrap_or(0),
        guest_nice: fields.next().unwrap_or(0),
    })
}

fn parse_mem_info(contents: &str) -> MemInfo {
    let mut info = MemInfo::default();
    for line in contents.lines() {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let kib: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let bytes = kib * 1024;
        match name {
            "MemTotal" => info.total = bytes,
            "MemFree" => info.free = bytes,
            "Buffers" => info.buffers = bytes,
            "Cached" => info.cached = bytes,
            "SReclaimable" => info.s_reclaimable = bytes,
            "Shmem" => info.shmem = bytes,
            "SwapTotal" => info.swap_total = bytes,
            "SwapFree" => info.swap_free = bytes,
            _ => {}
        }
    }
    info
}

fn parse_arc_size(contents: &str) -> Option<u64> {
    // arcstats rows are `name  type  data`.
    contents
        .lines()
        .find(|l| l.starts_with("size "))
        .and_then(|l| l.split_whitespace().nth(2))
        .and_then(|v| v.parse().ok())
}

fn parse_net_dev(contents: &str) -> HashMap<String, NetCounters> {
    let mut counters = HashMap::new();
    // First two lines are headers.
    for line in contents.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = rest
            .split_whitespace()
            .map(|f| f.parse().unwrap_or(0))
            .collect();
        // Field 0 is bytes received, field 8 is bytes transmitted.
        if fields.len() >= 9 {
            counters.insert(
                name.trim().to_string(),
                NetCounters {
                    recv: fields[0],
                    sent: fields[8],
                },
            );
        }
    }
    counters
}

fn parse_diskstats(contents: &str) -> HashMap<String, DiskCounters> {
    let mut counters = HashMap::new();
    for line in contents.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // major minor name reads _ sectors_read _ writes _ sectors_written ...
        if fields.len() >= 10 {
            counters.insert(
                fields[2].to_string(),
                DiskCounters {
                    sectors_read: fields[5].parse().unwrap_or(0),
                    sectors_written: fields[9].parse().unwrap_or(0),
                },
            );
        }
    }
    counters
}

//! Metrics aggregation pipeline for the Argus agent.
//!
//! The [`Aggregator`] answers `GetData` requests by combining base host
//! info, delta-based CPU/disk/network rates from the [`SampleCache`], and
//! whatever optional producers (containers, GPUs, sensors) are attached.
//! Raw counters come from procfs on Linux; other platforms degrade to
//! zeroed rates.

mod aggregator;
mod cache;
mod cpu;
mod disk;
mod mem;
mod net;
pub mod producers;
mod sensors;
mod system;

#[cfg(target_os = "linux")]
#[path = "proc_linux.rs"]
mod platform;

#[cfg(not(target_os = "linux"))]
#[path = "proc_other.rs"]
mod platform;

pub use aggregator::{Aggregator, AggregatorConfig, FsEntry, Producers};
pub use cache::{CANONICAL_INTERVAL_MS, SampleCache};
pub use cpu::CpuTimes;
pub use disk::{DiskCounters, DiskUsageCache};
pub use mem::MemCalc;
pub use net::{NetCounters, NicFilter};
pub use sensors::SysinfoSensors;
pub use system::SystemReader;

//! Producer traits for platform-specific metric sources.
//!
//! Docker scraping, GPU sampling, SMART polling, and systemd walking all
//! live outside this crate; the aggregator and the request handlers see
//! them only through these traits. Producers run their own sampling
//! loops and keep results under their own locks, so the `current`-style
//! methods are cheap copy-outs. Slow per-request calls (container logs,
//! unit details) are async and run under the caller's deadline.

use std::collections::BTreeMap;

use async_trait::async_trait;

use argus_protocol::data::{ContainerStats, GpuData};
use argus_protocol::smart::SmartData;
use argus_protocol::systemd::{ServiceDetails, ServiceStatus};

/// A failure inside a producer. Never fatal to a gather: the aggregator
/// logs it and substitutes an empty result.
#[derive(Debug, thiserror::Error)]
#[error("producer failure: {0}")]
pub struct ProducerError(pub String);

impl ProducerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Container runtime stats and per-container queries.
#[async_trait]
pub trait ContainerProvider: Send + Sync {
    /// Current stats for all running containers at the given interval.
    fn stats(&self, cache_time_ms: u16) -> Result<Vec<ContainerStats>, ProducerError>;

    /// Recent log output for one container.
    async fn logs(&self, id: &str) -> Result<String, ProducerError>;

    /// Inspect output for one container.
    async fn info(&self, id: &str) -> Result<String, ProducerError>;
}

/// GPU utilization snapshots.
pub trait GpuProvider: Send + Sync {
    fn current(&self) -> Result<Vec<GpuData>, ProducerError>;
}

/// Temperature sensors, keyed by sensor label.
pub trait SensorProvider: Send + Sync {
    fn current(&self) -> Result<BTreeMap<String, f64>, ProducerError>;
}

/// Disk-health snapshots, keyed by device name.
#[async_trait]
pub trait SmartProvider: Send + Sync {
    /// Forces a re-poll of the devices. May wake disks from standby.
    async fn refresh(&self) -> Result<(), ProducerError> {
        Ok(())
    }

    fn current(&self) -> Result<BTreeMap<String, SmartData>, ProducerError>;
}

/// Systemd unit states and per-unit details.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Current coarse state of every watched unit.
    fn current(&self) -> Result<Vec<ServiceStatus>, ProducerError>;

    async fn details(&self, name: &str) -> Result<ServiceDetails, ProducerError>;
}

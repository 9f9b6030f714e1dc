//! Bounded FIFO of snapshots captured while disconnected.

use std::collections::VecDeque;
use std::sync::Mutex;

use argus_protocol::data::CombinedData;
use tracing::warn;

/// Default capacity: several hours of snapshots at the usual cadence.
pub const DEFAULT_CAPACITY: usize = 360;

/// Holds snapshots produced while no hub is reachable, to be flushed on
/// the first successful response after reconnection.
pub struct OfflineBuffer {
    entries: Mutex<VecDeque<CombinedData>>,
    capacity: usize,
}

impl OfflineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Appends a snapshot, dropping the oldest when full.
    pub fn push(&self, data: CombinedData) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
            warn!(capacity = self.capacity, "offline buffer full, dropping oldest snapshot");
        }
        entries.push_back(data);
    }

    /// Returns and clears all buffered snapshots, oldest first, in one
    /// critical section.
    pub fn drain(&self) -> Vec<CombinedData> {
        self.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<CombinedData>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for OfflineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

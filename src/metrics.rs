/// Launch telemetry for the `viz` dashboard.
///
/// A launch publishes `LiveMetrics` snapshots through a `MetricsWriter`:
/// once when the partition plan is fixed, again as each core retires its
/// slab, and a final time at the join. The dashboard only ever polls the
/// snapshot file, so it can attach and detach while a launch is in flight.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const METRICS_PATH: &str = "/tmp/warpspawn_live.json";

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct LiveMetrics {
    /// "idle" | "running" | "complete"
    pub status: String,
    pub kernel_name: String,
    /// Grid dimensions [x, y, z]
    pub grid: [u32; 3],
    /// Block dimensions [x, y, z]
    pub block: [u32; 3],
    pub num_cores: u32,
    pub warps_per_core: u32,
    pub threads_per_warp: u32,
    /// Cores participating in the launch
    pub active_cores: u32,
    /// Warps per block (0 on the one-thread-per-block path)
    pub warps_per_group: u32,
    /// Total blocks in the grid
    pub blocks_total: u32,
    /// Blocks completed so far
    pub blocks_executed: u32,
    /// Warp stubs executed so far
    pub warps_executed: u32,
    /// Kernel invocations so far
    pub threads_executed: u32,
    /// Blocks assigned to each core — index = core id
    pub core_blocks_assigned: Vec<u32>,
    /// Blocks completed by each core
    pub core_blocks_executed: Vec<u32>,
    /// Unix timestamp in ms when this snapshot was published
    pub timestamp_ms: u64,
}

/// Publishes snapshots to a well-known path. Each snapshot lands in a
/// scratch file first and is renamed into place, so a polling dashboard
/// never observes a half-written one.
pub struct MetricsWriter {
    target: PathBuf,
    scratch: PathBuf,
}

impl MetricsWriter {
    pub fn new() -> Self {
        MetricsWriter::at(METRICS_PATH)
    }

    pub fn at(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let mut scratch = target.clone();
        scratch.as_mut_os_string().push(".tmp");
        MetricsWriter { target, scratch }
    }

    /// Publish one snapshot; I/O errors are ignored.
    pub fn publish(&self, metrics: &LiveMetrics) {
        let Ok(json) = serde_json::to_string(metrics) else {
            return;
        };
        if std::fs::write(&self.scratch, json).is_ok() {
            let _ = std::fs::rename(&self.scratch, &self.target);
        }
    }
}

impl Default for MetricsWriter {
    fn default() -> Self {
        MetricsWriter::new()
    }
}

/// Latest published snapshot, if any launch has produced one yet.
pub fn read_metrics() -> Option<LiveMetrics> {
    let raw = std::fs::read(METRICS_PATH).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Unix time in milliseconds, for stamping snapshots.
pub fn unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as u64,
        Err(_) => 0,
    }
}

/// Top-level device: a set of independently executing cores in front of a
/// shared global memory. `spawn_threads` is the launch entry — it validates
/// the geometry once, then runs the per-core launch routine on every core
/// with identical arguments.
use crate::cores::Core;
use crate::kernel::{Geometry, Kernel, LaunchDims};
use crate::memory::HBM;
use crate::metrics::{unix_millis, LiveMetrics, MetricsWriter};
use crate::partition::{active_cores, slab_for_core, warp_demand};
use crate::spawn::{CoreLaunch, LaunchError, LaunchStats};
use serde::{Deserialize, Serialize};

/// Hardware shape of the device, as the identity registers report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCaps {
    pub num_cores: u32,
    pub warps_per_core: u32,
    pub threads_per_warp: u32,
}

impl DeviceCaps {
    pub fn new(num_cores: u32, warps_per_core: u32, threads_per_warp: u32) -> Self {
        assert!(num_cores >= 1 && warps_per_core >= 1 && threads_per_warp >= 1);
        assert!(threads_per_warp <= 32, "lane masks are 32-bit");
        DeviceCaps {
            num_cores,
            warps_per_core,
            threads_per_warp,
        }
    }

    /// Threads a single core can host at once — the hard cap on block size.
    pub fn threads_per_core(&self) -> u32 {
        self.warps_per_core * self.threads_per_warp
    }

    /// Small FPGA-class part: 2 cores × 4 warps × 4 lanes.
    pub fn fpga_small() -> Self {
        DeviceCaps::new(2, 4, 4)
    }

    /// Simulation default: 16 cores × 8 warps × 16 lanes.
    pub fn sim_default() -> Self {
        DeviceCaps::new(16, 8, 16)
    }
}

const DEFAULT_HBM_BYTES: usize = 256 * 1024 * 1024;

pub struct Device {
    pub caps: DeviceCaps,
    pub cores: Vec<Core>,
    pub hbm: HBM,
    /// When set, launches publish live snapshots for the `viz` dashboard
    metrics: Option<MetricsWriter>,
}

impl Device {
    pub fn new(caps: DeviceCaps) -> Self {
        Device {
            caps,
            cores: (0..caps.num_cores)
                .map(|id| Core::new(id, caps.warps_per_core))
                .collect(),
            hbm: HBM::new(DEFAULT_HBM_BYTES),
            metrics: None,
        }
    }

    /// Publish live metrics snapshots while launching.
    pub fn with_live_metrics(mut self) -> Self {
        self.metrics = Some(MetricsWriter::new());
        self
    }

    /// Launch a kernel over the given geometry.
    ///
    /// Fails only when a block cannot fit on one core; every other geometry
    /// is accepted and a zero grid is a no-op. Cores execute the launch
    /// routine independently; the simulator runs them in core-id order, but
    /// kernels must not rely on any cross-core ordering.
    pub fn spawn_threads(
        &mut self,
        dims: &LaunchDims,
        kernel: &Kernel,
    ) -> Result<LaunchStats, LaunchError> {
        let geom = dims.normalize();
        let threads_per_core = self.caps.threads_per_core();
        if geom.group_size > threads_per_core {
            return Err(LaunchError::BlockTooLarge {
                group_size: geom.group_size,
                threads_per_core,
            });
        }

        let mut stats = self.plan_stats(&geom);
        log::debug!(
            "launch '{}': grid {:?} block {:?}, {} blocks of {} threads on {} cores",
            kernel.name,
            geom.grid_dim,
            geom.block_dim,
            geom.num_groups,
            geom.group_size,
            stats.active_cores,
        );
        if let Some(writer) = &self.metrics {
            writer.publish(&launch_snapshot("running", kernel, self.caps, &geom, &stats));
        }

        let caps = self.caps;
        for core in self.cores.iter_mut() {
            core.reset();
            CoreLaunch {
                core,
                caps,
                geom: &geom,
                kernel,
                hbm: &mut self.hbm,
                stats: &mut stats,
            }
            .run();
            if let Some(writer) = &self.metrics {
                writer.publish(&launch_snapshot("running", kernel, caps, &geom, &stats));
            }
        }

        if let Some(writer) = &self.metrics {
            writer.publish(&launch_snapshot("complete", kernel, caps, &geom, &stats));
        }
        log::debug!(
            "launch '{}' complete: {} blocks, {} warps, {} threads",
            kernel.name,
            stats.blocks_executed,
            stats.warps_executed,
            stats.threads_executed,
        );
        Ok(stats)
    }

    /// Replicate the partition decision the cores are about to make, so the
    /// stats carry the plan alongside the execution counters.
    fn plan_stats(&self, geom: &Geometry) -> LaunchStats {
        let mut stats = LaunchStats::new(self.caps.num_cores);
        stats.blocks_total = geom.num_groups;
        if geom.group_size > 1 {
            let demand = warp_demand(geom.group_size, self.caps.threads_per_warp);
            stats.warps_per_group = demand.warps_per_group;
            stats.active_cores = active_cores(
                geom.num_groups * demand.warps_per_group,
                self.caps.warps_per_core,
                self.caps.num_cores,
            );
        } else {
            stats.active_cores = active_cores(
                geom.num_groups,
                self.caps.threads_per_core(),
                self.caps.num_cores,
            );
        }
        for core_id in 0..stats.active_cores {
            stats.core_blocks_assigned[core_id as usize] =
                slab_for_core(geom.num_groups, stats.active_cores, core_id).count;
        }
        stats
    }
}

/// Build a live snapshot from the launch plan and counters.
fn launch_snapshot(
    status: &str,
    kernel: &Kernel,
    caps: DeviceCaps,
    geom: &Geometry,
    stats: &LaunchStats,
) -> LiveMetrics {
    LiveMetrics {
        status: status.to_string(),
        kernel_name: kernel.name.clone(),
        grid: [geom.grid_dim.x, geom.grid_dim.y, geom.grid_dim.z],
        block: [geom.block_dim.x, geom.block_dim.y, geom.block_dim.z],
        num_cores: caps.num_cores,
        warps_per_core: caps.warps_per_core,
        threads_per_warp: caps.threads_per_warp,
        active_cores: stats.active_cores,
        warps_per_group: stats.warps_per_group,
        blocks_total: stats.blocks_total,
        blocks_executed: stats.blocks_executed,
        warps_executed: stats.warps_executed,
        threads_executed: stats.threads_executed,
        core_blocks_assigned: stats.core_blocks_assigned.clone(),
        core_blocks_executed: stats.core_blocks_executed.clone(),
        timestamp_ms: unix_millis(),
    }
}

/// Per-core kernel launch.
///
/// Every core runs the same routine with identical arguments and decides for
/// itself whether it participates, which slab of blocks it owns, and how its
/// warps cycle through that slab:
///
/// 1. Block-per-warp path (`group_size > 1`): each block occupies
///    `warps_per_group` consecutive warps; the last warp of a block runs
///    under the partial lane mask. Oversubscribed slabs cycle whole blocks
///    through the core in batches.
///
/// 2. One-thread-per-block path (`group_size == 1`): blocks degrade to tasks
///    packed one per lane, so a warp retires `threads_per_warp` tasks per
///    batch. Tasks short of a full warp run once more under a tail mask.
///
/// Warp 0 marshals a descriptor into the core's scratch slot, spawns its
/// sibling warps onto the matching stub, runs the same stub itself, and
/// finally issues the quiescence warp-spawn that ends the launch on the core.
use crate::cores::{Core, GroupsDescriptor, ScratchDescriptor, TasksDescriptor, ThreadMask};
use crate::device::DeviceCaps;
use crate::kernel::{Dim3, Geometry, Kernel, ThreadCtx};
use crate::memory::HBM;
use crate::partition::{active_cores, group_schedule, slab_for_core, task_schedule, warp_demand};

/// The one failure a launch can report. Raised before any warp is spawned;
/// all other inputs degenerate to no-ops.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchError {
    #[error("block of {group_size} threads exceeds core capacity of {threads_per_core}")]
    BlockTooLarge {
        group_size: u32,
        threads_per_core: u32,
    },
}

/// Statistics collected during a kernel launch.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LaunchStats {
    /// Total blocks in the grid
    pub blocks_total: u32,
    /// Cores that participated
    pub active_cores: u32,
    /// Warps per block (0 on the one-thread-per-block path)
    pub warps_per_group: u32,
    /// Blocks executed
    pub blocks_executed: u32,
    /// Warp stub executions
    pub warps_executed: u32,
    /// Kernel callback invocations
    pub threads_executed: u32,
    /// Blocks assigned to each core — index = core id
    pub core_blocks_assigned: Vec<u32>,
    /// Blocks completed by each core
    pub core_blocks_executed: Vec<u32>,
}

impl LaunchStats {
    pub(crate) fn new(num_cores: u32) -> Self {
        LaunchStats {
            core_blocks_assigned: vec![0; num_cores as usize],
            core_blocks_executed: vec![0; num_cores as usize],
            ..Default::default()
        }
    }
}

/// One core's view of a launch in flight.
pub(crate) struct CoreLaunch<'a> {
    pub core: &'a mut Core,
    pub caps: DeviceCaps,
    pub geom: &'a Geometry,
    pub kernel: &'a Kernel,
    pub hbm: &'a mut HBM,
    pub stats: &'a mut LaunchStats,
}

impl<'a> CoreLaunch<'a> {
    /// Run the launch routine on this core. Geometry has already been
    /// validated; a core that sits out returns without hardware effects.
    pub(crate) fn run(&mut self) {
        let participated = if self.geom.group_size > 1 {
            self.groups_path()
        } else {
            self.tasks_path()
        };
        if participated {
            // quiescence barrier: warp 0 returns once siblings have parked
            self.core.wspawn(1);
            self.core.clear_scratch();
        }
    }

    // -----------------------------------------------------------------------
    // Block-per-warp path
    // -----------------------------------------------------------------------

    fn groups_path(&mut self) -> bool {
        let caps = self.caps;
        let demand = warp_demand(self.geom.group_size, caps.threads_per_warp);
        let needed_warps = self.geom.num_groups * demand.warps_per_group;
        let active = active_cores(needed_warps, caps.warps_per_core, caps.num_cores);
        if self.core.id >= active {
            return false;
        }

        let slab = slab_for_core(self.geom.num_groups, active, self.core.id);
        let schedule = group_schedule(slab.count, demand.warps_per_group, caps.warps_per_core);

        log::debug!(
            "core {}: {} blocks at offset {}, {} warps/block, {} warps x {} batches (+{})",
            self.core.id,
            slab.count,
            slab.offset,
            demand.warps_per_group,
            schedule.batches.active_warps,
            schedule.batches.warp_batches,
            schedule.batches.remaining_warps,
        );

        self.core.marshal(ScratchDescriptor::Groups(GroupsDescriptor {
            group_offset: slab.offset,
            warp_batches: schedule.batches.warp_batches,
            remaining_warps: schedule.batches.remaining_warps,
            warps_per_group: demand.warps_per_group,
            concurrent_groups: schedule.concurrent_groups,
            remaining_mask: demand.remaining_mask,
        }));

        self.core.wspawn(schedule.batches.active_warps);
        for warp_id in 1..schedule.batches.active_warps {
            self.groups_stub(warp_id);
        }
        self.groups_stub(0);
        true
    }

    /// Entry point of every warp on the groups path. Reads the descriptor
    /// from scratch, raises the lane mask for its position within the block,
    /// then walks its share of the slab.
    fn groups_stub(&mut self, warp_id: u32) {
        let d = self.core.groups_descriptor();
        let tpw = self.caps.threads_per_warp;

        let group_warp_id = warp_id % d.warps_per_group;
        let mask = if group_warp_id == d.warps_per_group - 1 {
            d.remaining_mask
        } else {
            ThreadMask::all(tpw)
        };
        self.core.tmc(warp_id, mask);

        let local_group_id = warp_id / d.warps_per_group;
        let iterations = d.warp_batches + u32::from(warp_id < d.remaining_warps);
        log::trace!(
            "core {} warp {}: resident block {} position {} mask {:#x} x{} batches",
            self.core.id,
            warp_id,
            local_group_id,
            group_warp_id,
            mask.bits(),
            iterations,
        );

        for i in 0..iterations {
            let block_linear = d.group_offset + local_group_id + i * d.concurrent_groups;
            let block_idx = Dim3::from_linear(block_linear, self.geom.grid_dim);
            if group_warp_id == 0 {
                self.stats.blocks_executed += 1;
                self.stats.core_blocks_executed[self.core.id as usize] += 1;
            }
            for lane in 0..tpw {
                if !mask.is_active(lane) {
                    continue;
                }
                let local_task_id = group_warp_id * tpw + lane;
                let thread_idx = Dim3::from_linear(local_task_id, self.geom.block_dim);
                self.invoke(block_idx, thread_idx, local_group_id, warp_id, lane);
            }
        }
        self.stats.warps_executed += 1;

        // every warp parks itself on exit; warp 0 drops back to lane 0
        let exit_mask = if warp_id == 0 {
            ThreadMask::one()
        } else {
            ThreadMask::ZERO
        };
        self.core.tmc(warp_id, exit_mask);
    }

    // -----------------------------------------------------------------------
    // One-thread-per-block path
    // -----------------------------------------------------------------------

    fn tasks_path(&mut self) -> bool {
        let caps = self.caps;
        let tpw = caps.threads_per_warp;
        let num_tasks = self.geom.num_groups;
        let active = active_cores(num_tasks, caps.threads_per_core(), caps.num_cores);
        if self.core.id >= active {
            return false;
        }

        let slab = slab_for_core(num_tasks, active, self.core.id);
        let full_warps = slab.count / tpw;
        let tail_tasks = slab.count % tpw;
        let schedule = task_schedule(full_warps, caps.warps_per_core);

        log::debug!(
            "core {}: {} tasks at offset {}, {} full warps x {} batches (+{}), tail {}",
            self.core.id,
            slab.count,
            slab.offset,
            schedule.active_warps,
            schedule.warp_batches,
            schedule.remaining_warps,
            tail_tasks,
        );

        self.core.marshal(ScratchDescriptor::Tasks(TasksDescriptor {
            all_tasks_offset: slab.offset,
            remain_tasks_offset: slab.offset + (slab.count - tail_tasks),
            warp_batches: schedule.warp_batches,
            remaining_warps: schedule.remaining_warps,
        }));

        if schedule.active_warps >= 1 {
            self.core.wspawn(schedule.active_warps);
            for warp_id in 1..schedule.active_warps {
                self.tasks_stub(warp_id);
            }
            // warp 0 raises all lanes, runs the same body, then drops back
            self.core.tmc(0, ThreadMask::all(tpw));
            self.tasks_body(0);
            self.core.tmc(0, ThreadMask::one());
        }

        if tail_tasks != 0 {
            self.core.tmc(0, ThreadMask::first(tail_tasks));
            self.remainder_body();
            self.core.tmc(0, ThreadMask::one());
        }
        true
    }

    /// Entry point of sibling warps on the tasks path.
    fn tasks_stub(&mut self, warp_id: u32) {
        self.core.tmc(warp_id, ThreadMask::all(self.caps.threads_per_warp));
        self.tasks_body(warp_id);
        self.core.tmc(warp_id, ThreadMask::ZERO);
    }

    /// Retire this warp's contiguous run of full-warp tasks, one task per
    /// lane per batch.
    fn tasks_body(&mut self, warp_id: u32) {
        let d = self.core.tasks_descriptor();
        let tpw = self.caps.threads_per_warp;
        let mask = self.core.thread_mask(warp_id);

        let start_warp = warp_id * d.warp_batches + warp_id.min(d.remaining_warps);
        let iterations = d.warp_batches + u32::from(warp_id < d.remaining_warps);
        log::trace!(
            "core {} warp {}: tasks from warp slot {} x{} batches",
            self.core.id,
            warp_id,
            start_warp,
            iterations,
        );

        for i in 0..iterations {
            let warp_base = d.all_tasks_offset + (start_warp + i) * tpw;
            for lane in 0..tpw {
                if !mask.is_active(lane) {
                    continue;
                }
                let block_idx = Dim3::from_linear(warp_base + lane, self.geom.grid_dim);
                self.stats.blocks_executed += 1;
                self.stats.core_blocks_executed[self.core.id as usize] += 1;
                self.invoke(block_idx, Dim3::ZERO, 0, warp_id, lane);
            }
        }
        self.stats.warps_executed += 1;
    }

    /// Tail tasks: one callback per active lane under the tail mask, on
    /// warp 0 only.
    fn remainder_body(&mut self) {
        let d = self.core.tasks_descriptor();
        let mask = self.core.thread_mask(0);

        for lane in 0..self.caps.threads_per_warp {
            if !mask.is_active(lane) {
                continue;
            }
            let block_idx = Dim3::from_linear(d.remain_tasks_offset + lane, self.geom.grid_dim);
            self.stats.blocks_executed += 1;
            self.stats.core_blocks_executed[self.core.id as usize] += 1;
            self.invoke(block_idx, Dim3::ZERO, 0, 0, lane);
        }
    }

    // -----------------------------------------------------------------------
    // Callback dispatch
    // -----------------------------------------------------------------------

    fn invoke(
        &mut self,
        block_idx: Dim3,
        thread_idx: Dim3,
        local_group_id: u32,
        warp_id: u32,
        lane_id: u32,
    ) {
        let kernel = self.kernel;
        let mut ctx = ThreadCtx {
            block_idx,
            thread_idx,
            block_dim: self.geom.block_dim,
            grid_dim: self.geom.grid_dim,
            local_group_id,
            core_id: self.core.id,
            warp_id,
            lane_id,
            gmem: &mut *self.hbm,
        };
        (kernel.func)(&mut ctx);
        self.stats.threads_executed += 1;
    }
}

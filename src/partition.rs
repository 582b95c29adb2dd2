/// Partition math for a launch: how many warps a block needs, how many cores
/// participate, which contiguous slab of blocks (or tasks) each core owns,
/// and how a slab that oversubscribes the core's warps splits into batches.
///
/// Every active core evaluates these functions with identical inputs and must
/// arrive at the same answers — there is no inter-core communication.
use crate::cores::ThreadMask;

/// Warp requirements of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarpDemand {
    /// Warps needed to host `group_size` threads
    pub warps_per_group: u32,
    /// Lane mask for the last (possibly partial) warp of the block
    pub remaining_mask: ThreadMask,
}

/// Warps needed per block, and the lane mask of the block's last warp.
pub fn warp_demand(group_size: u32, threads_per_warp: u32) -> WarpDemand {
    let mut warps_per_group = group_size / threads_per_warp;
    let remaining_threads = group_size % threads_per_warp;
    let remaining_mask = if remaining_threads != 0 {
        warps_per_group += 1;
        ThreadMask::first(remaining_threads)
    } else {
        ThreadMask::all(threads_per_warp)
    };
    WarpDemand {
        warps_per_group,
        remaining_mask,
    }
}

/// Number of cores that participate in a launch needing `needed_units` units
/// of work, where one core provides `units_per_core` of them.
pub fn active_cores(needed_units: u32, units_per_core: u32, num_cores: u32) -> u32 {
    let needed_cores = needed_units.div_ceil(units_per_core);
    needed_cores.min(num_cores)
}

/// A core's contiguous span of the linear block (or task) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slab {
    /// First linear index owned by the core
    pub offset: u32,
    /// Number of indices owned
    pub count: u32,
}

/// Balanced contiguous partition of `total` indices over `active_cores`
/// cores: every core gets `⌊total/active_cores⌋`, and each of the first
/// `total mod active_cores` cores gets one more. Offsets are prefix sums, so
/// slabs are disjoint and ascending by core id.
pub fn slab_for_core(total: u32, active_cores: u32, core_id: u32) -> Slab {
    let base = total / active_cores;
    let rem = total % active_cores;
    Slab {
        offset: core_id * base + core_id.min(rem),
        count: base + u32::from(core_id < rem),
    }
}

/// How a core's warps cycle through its slab when the slab needs more warps
/// than the core can host at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSchedule {
    /// Warps dispatched by the warp-spawn (including warp 0)
    pub active_warps: u32,
    /// Full batches every active warp runs
    pub warp_batches: u32,
    /// Warps with id below this run one extra batch
    pub remaining_warps: u32,
}

impl BatchSchedule {
    /// Batches a given warp runs under this schedule.
    pub fn iterations(&self, warp_id: u32) -> u32 {
        self.warp_batches + u32::from(warp_id < self.remaining_warps)
    }
}

/// Schedule for the block-per-warp path, plus the number of blocks that can
/// reside on the core at once (which is also each warp's block stride).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSchedule {
    pub concurrent_groups: u32,
    pub batches: BatchSchedule,
}

/// Fit `groups_per_core` blocks of `warps_per_group` warps each into
/// `warps_per_core` warp slots. When all the slab's warps fit, a single batch
/// covers it; otherwise whole blocks cycle through the core in batches.
pub fn group_schedule(
    groups_per_core: u32,
    warps_per_group: u32,
    warps_per_core: u32,
) -> GroupSchedule {
    let concurrent_groups = warps_per_core / warps_per_group;
    let total_warps = groups_per_core * warps_per_group;
    let batches = if total_warps <= warps_per_core {
        BatchSchedule {
            active_warps: total_warps,
            warp_batches: 1,
            remaining_warps: 0,
        }
    } else {
        let active_warps = concurrent_groups * warps_per_group;
        BatchSchedule {
            active_warps,
            warp_batches: total_warps / active_warps,
            remaining_warps: total_warps % active_warps,
        }
    };
    GroupSchedule {
        concurrent_groups,
        batches,
    }
}

/// Schedule for the one-thread-per-block path: `full_warps` fully-populated
/// warps cycling through `warps_per_core` slots. The tail (tasks short of a
/// full warp) is handled separately by the remainder stub.
pub fn task_schedule(full_warps: u32, warps_per_core: u32) -> BatchSchedule {
    if full_warps <= warps_per_core {
        BatchSchedule {
            active_warps: full_warps,
            warp_batches: 1,
            remaining_warps: 0,
        }
    } else {
        BatchSchedule {
            active_warps: warps_per_core,
            warp_batches: full_warps / warps_per_core,
            remaining_warps: full_warps % warps_per_core,
        }
    }
}

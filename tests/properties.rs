/// Property tests over random launch geometry and device shapes: coverage,
/// slab disjointness/contiguity/balance, batch fairness, lane placement, and
/// the degenerate cases.
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use warpspawn::device::{Device, DeviceCaps};
use warpspawn::kernel::{Dim3, Kernel, LaunchDims};
use warpspawn::spawn::{LaunchError, LaunchStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Invocation {
    core_id: u32,
    warp_id: u32,
    lane_id: u32,
    block: (u32, u32, u32),
    thread: (u32, u32, u32),
}

fn run_recorded(
    caps: DeviceCaps,
    grid: [u32; 3],
    block: [u32; 3],
) -> (Result<LaunchStats, LaunchError>, Vec<Invocation>) {
    let mut device = Device::new(caps);
    let observations = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&observations);
    let kernel = Kernel::new("probe", move |ctx| {
        sink.borrow_mut().push(Invocation {
            core_id: ctx.core_id,
            warp_id: ctx.warp_id,
            lane_id: ctx.lane_id,
            block: (ctx.block_idx.x, ctx.block_idx.y, ctx.block_idx.z),
            thread: (ctx.thread_idx.x, ctx.thread_idx.y, ctx.thread_idx.z),
        });
    });
    let dims = LaunchDims::new(3, Some(&grid), Some(&block));
    let result = device.spawn_threads(&dims, &kernel);
    let recorded = observations.borrow().clone();
    (result, recorded)
}

fn caps_strategy() -> impl Strategy<Value = DeviceCaps> {
    (1u32..=4, 1u32..=4, 1u32..=8).prop_map(|(c, w, t)| DeviceCaps::new(c, w, t))
}

fn grid_strategy() -> impl Strategy<Value = [u32; 3]> {
    (1u32..=4, 1u32..=4, 1u32..=4).prop_map(|(x, y, z)| [x, y, z])
}

fn block_strategy() -> impl Strategy<Value = [u32; 3]> {
    (1u32..=3, 1u32..=3, 1u32..=3).prop_map(|(x, y, z)| [x, y, z])
}

fn linear_block(inv: &Invocation, grid: Dim3) -> u32 {
    Dim3::new(inv.block.0, inv.block.1, inv.block.2).to_linear(grid)
}

fn blocks_by_core(invocations: &[Invocation], grid: Dim3) -> BTreeMap<u32, BTreeSet<u32>> {
    let mut map: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
    for inv in invocations {
        map.entry(inv.core_id).or_default().insert(linear_block(inv, grid));
    }
    map
}

proptest! {
    /// Every (blockIdx, threadIdx) pair in the launch product set is observed
    /// exactly once, and nothing outside it.
    #[test]
    fn every_thread_of_every_block_runs_exactly_once(
        caps in caps_strategy(),
        grid in grid_strategy(),
        block in block_strategy(),
    ) {
        let group_size = block.iter().product::<u32>();
        prop_assume!(group_size <= caps.threads_per_core());

        let (result, invs) = run_recorded(caps, grid, block);
        let stats = result.unwrap();

        let mut counts: HashMap<((u32, u32, u32), (u32, u32, u32)), u32> = HashMap::new();
        for inv in &invs {
            *counts.entry((inv.block, inv.thread)).or_insert(0) += 1;
        }

        let num_groups = grid.iter().product::<u32>();
        prop_assert_eq!(invs.len() as u32, num_groups * group_size);
        prop_assert_eq!(stats.blocks_executed, num_groups);
        prop_assert_eq!(stats.threads_executed as usize, invs.len());

        for bz in 0..grid[2] {
            for by in 0..grid[1] {
                for bx in 0..grid[0] {
                    for tz in 0..block[2] {
                        for ty in 0..block[1] {
                            for tx in 0..block[0] {
                                let key = ((bx, by, bz), (tx, ty, tz));
                                prop_assert_eq!(
                                    counts.remove(&key),
                                    Some(1),
                                    "missing or duplicated {:?}",
                                    key
                                );
                            }
                        }
                    }
                }
            }
        }
        prop_assert!(counts.is_empty(), "stray invocations: {:?}", counts);
    }

    /// Each active core owns a contiguous slab; slabs are disjoint, ascend
    /// with core id, cover the whole grid, and differ in size by at most one.
    #[test]
    fn slabs_are_contiguous_disjoint_and_balanced(
        caps in caps_strategy(),
        grid in grid_strategy(),
        block in block_strategy(),
    ) {
        let group_size = block.iter().product::<u32>();
        prop_assume!(group_size <= caps.threads_per_core());

        let (result, invs) = run_recorded(caps, grid, block);
        let stats = result.unwrap();
        let num_groups = grid.iter().product::<u32>();
        let grid_dim = Dim3::new(grid[0], grid[1], grid[2]);

        let by_core = blocks_by_core(&invs, grid_dim);
        prop_assert_eq!(by_core.len() as u32, stats.active_cores);

        let mut next = 0u32;
        let mut sizes = Vec::new();
        for (core_id, blocks) in &by_core {
            let lo = *blocks.iter().next().unwrap();
            let hi = *blocks.iter().next_back().unwrap();
            prop_assert_eq!(
                blocks.len() as u32,
                hi - lo + 1,
                "core {} slab has gaps: {:?}",
                core_id,
                blocks
            );
            prop_assert_eq!(lo, next, "core {} slab does not continue the previous", core_id);
            next = hi + 1;
            sizes.push(blocks.len() as u32);
        }
        prop_assert_eq!(next, num_groups);

        let max = sizes.iter().max().copied().unwrap_or(0);
        let min = sizes.iter().min().copied().unwrap_or(0);
        prop_assert!(max - min <= 1, "unbalanced slabs: {:?}", sizes);
    }

    /// On the block-per-warp path, every lane lands on the warp and lane the
    /// intra-block thread id dictates, and the partial last warp of a block
    /// activates exactly the lowest `group_size % threads_per_warp` lanes.
    #[test]
    fn lanes_follow_the_thread_mask(
        caps in caps_strategy(),
        grid in grid_strategy(),
        block in block_strategy(),
    ) {
        let group_size = block.iter().product::<u32>();
        prop_assume!(group_size > 1);
        prop_assume!(group_size <= caps.threads_per_core());

        let (result, invs) = run_recorded(caps, grid, block);
        result.unwrap();

        let tpw = caps.threads_per_warp;
        let block_dim = Dim3::new(block[0], block[1], block[2]);
        let warps_per_group = group_size.div_ceil(tpw);
        let tail = group_size % tpw;

        for inv in &invs {
            let ltid = Dim3::new(inv.thread.0, inv.thread.1, inv.thread.2).to_linear(block_dim);
            prop_assert_eq!(inv.lane_id, ltid % tpw);
            prop_assert_eq!(inv.warp_id % warps_per_group, ltid / tpw);
            if tail != 0 && ltid / tpw == warps_per_group - 1 {
                prop_assert!(inv.lane_id < tail, "lane {} past tail mask", inv.lane_id);
            }
        }

        // the last warp of each block populates exactly the tail lanes
        if tail != 0 {
            let grid_dim = Dim3::new(grid[0], grid[1], grid[2]);
            let mut last_warp_lanes: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
            for inv in &invs {
                let ltid = Dim3::new(inv.thread.0, inv.thread.1, inv.thread.2).to_linear(block_dim);
                if ltid / tpw == warps_per_group - 1 {
                    last_warp_lanes
                        .entry(linear_block(inv, grid_dim))
                        .or_default()
                        .insert(inv.lane_id);
                }
            }
            for (block_id, lanes) in last_warp_lanes {
                prop_assert_eq!(lanes, (0..tail).collect::<BTreeSet<u32>>(), "block {}", block_id);
            }
        }
    }

    /// When a slab oversubscribes the core, batches are dealt fairly: the
    /// per-warp block counts on a core differ by at most one.
    #[test]
    fn warp_batches_are_balanced(
        caps in caps_strategy(),
        grid in grid_strategy(),
        block in block_strategy(),
    ) {
        let group_size = block.iter().product::<u32>();
        prop_assume!(group_size > 1);
        prop_assume!(group_size <= caps.threads_per_core());

        let (result, invs) = run_recorded(caps, grid, block);
        result.unwrap();
        let grid_dim = Dim3::new(grid[0], grid[1], grid[2]);

        let mut per_warp: BTreeMap<(u32, u32), BTreeSet<u32>> = BTreeMap::new();
        for inv in &invs {
            per_warp
                .entry((inv.core_id, inv.warp_id))
                .or_default()
                .insert(linear_block(inv, grid_dim));
        }
        let mut per_core: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        for ((core_id, _), blocks) in per_warp {
            per_core.entry(core_id).or_default().push(blocks.len() as u32);
        }
        for (core_id, counts) in per_core {
            let max = counts.iter().max().copied().unwrap();
            let min = counts.iter().min().copied().unwrap();
            prop_assert!(max - min <= 1, "core {} warp batches: {:?}", core_id, counts);
        }
    }

    /// The one-thread-per-block path covers each task exactly once with
    /// contiguous per-core slabs, `threadIdx` pinned to the origin.
    #[test]
    fn single_thread_blocks_pack_lanewise(
        caps in caps_strategy(),
        num_tasks in 1u32..=64,
    ) {
        let (result, invs) = run_recorded(caps, [num_tasks, 1, 1], [1, 1, 1]);
        let stats = result.unwrap();

        prop_assert_eq!(stats.warps_per_group, 0);
        prop_assert_eq!(invs.len() as u32, num_tasks);

        let tasks: BTreeSet<u32> = invs.iter().map(|i| i.block.0).collect();
        prop_assert_eq!(tasks, (0..num_tasks).collect::<BTreeSet<u32>>());
        for inv in &invs {
            prop_assert_eq!(inv.thread, (0, 0, 0));
        }

        let by_core = blocks_by_core(&invs, Dim3::x(num_tasks));
        let mut next = 0u32;
        for (core_id, tasks) in &by_core {
            let lo = *tasks.iter().next().unwrap();
            let hi = *tasks.iter().next_back().unwrap();
            prop_assert_eq!(tasks.len() as u32, hi - lo + 1, "core {} tasks: {:?}", core_id, tasks);
            prop_assert_eq!(lo, next);
            next = hi + 1;
        }
        prop_assert_eq!(next, num_tasks);
    }

    /// A grid with a zero axis launches nothing and still succeeds.
    #[test]
    fn zero_grid_is_a_successful_no_op(
        caps in caps_strategy(),
        block in block_strategy(),
        axis in 0usize..3,
    ) {
        let group_size = block.iter().product::<u32>();
        prop_assume!(group_size <= caps.threads_per_core());

        let mut grid = [2u32, 2, 2];
        grid[axis] = 0;
        let (result, invs) = run_recorded(caps, grid, block);
        let stats = result.unwrap();
        prop_assert_eq!(stats.active_cores, 0);
        prop_assert_eq!(stats.blocks_executed, 0);
        prop_assert!(invs.is_empty());
    }

    /// A block that cannot fit on one core fails up front with no callbacks.
    #[test]
    fn oversized_blocks_are_rejected(
        caps in caps_strategy(),
        grid in grid_strategy(),
        excess in 1u32..=8,
    ) {
        let group_size = caps.threads_per_core() + excess;
        let (result, invs) = run_recorded(caps, grid, [group_size, 1, 1]);
        prop_assert_eq!(
            result,
            Err(LaunchError::BlockTooLarge {
                group_size,
                threads_per_core: caps.threads_per_core(),
            })
        );
        prop_assert!(invs.is_empty());
    }
}

use warpspawn::device::{Device, DeviceCaps};
use warpspawn::kernel::{Kernel, LaunchDims};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut device = Device::new(DeviceCaps::sim_default()).with_live_metrics();
    println!(
        "Initialized device with {} cores x {} warps x {} lanes ({} threads/core)",
        device.caps.num_cores,
        device.caps.warps_per_core,
        device.caps.threads_per_warp,
        device.caps.threads_per_core(),
    );

    // --- Vector addition demo ---
    // C[i] = A[i] + B[i] for N elements, each stored as a single f32 (4 bytes)
    let n: u32 = 1024;
    let stride = std::mem::size_of::<f32>();

    // A starts at address 0, B at n*4, C at 2*n*4
    let base_a: usize = 0;
    let base_b: usize = n as usize * stride;
    let base_c: usize = 2 * n as usize * stride;

    for i in 0..n as usize {
        let a_val: f32 = i as f32;
        let b_val: f32 = (n as usize - i) as f32;
        device.hbm.write(base_a + i * stride, &a_val.to_le_bytes());
        device.hbm.write(base_b + i * stride, &b_val.to_le_bytes());
    }

    let kernel = Kernel::new("vec_add", move |ctx| {
        let i = ctx.global_id() as usize;
        if i >= n as usize {
            return;
        }
        let a = f32::from_le_bytes(ctx.gmem.read(base_a + i * stride, 4).try_into().unwrap());
        let b = f32::from_le_bytes(ctx.gmem.read(base_b + i * stride, 4).try_into().unwrap());
        let c = a + b;
        ctx.gmem.write(base_c + i * stride, &c.to_le_bytes());
    });

    // 1 thread per element, 128 threads per block
    let threads_per_block = 128u32;
    let grid = [n.div_ceil(threads_per_block)];
    let block = [threads_per_block];
    let dims = LaunchDims::new(1, Some(&grid), Some(&block));

    let stats = device.spawn_threads(&dims, &kernel)?;

    let mut all_correct = true;
    for i in 0..n as usize {
        let bytes = device.hbm.read(base_c + i * stride, 4);
        let c = f32::from_le_bytes(bytes.try_into().unwrap());
        let expected = n as f32; // a[i] + b[i] = i + (n - i) = n
        if (c - expected).abs() > 1e-5 {
            println!("MISMATCH at i={}: got {}, expected {}", i, c, expected);
            all_correct = false;
        }
    }
    if all_correct {
        println!(
            "vec_add PASSED: all {} results correct (each = {})",
            n, n
        );
    }
    println!(
        "Stats: {} blocks | {} warps | {} threads | {} active cores | {} warps/block",
        stats.blocks_executed,
        stats.warps_executed,
        stats.threads_executed,
        stats.active_cores,
        stats.warps_per_group,
    );

    // -----------------------------------------------------------------------
    // Matrix multiply demo
    // -----------------------------------------------------------------------
    println!("\n{}", "=".repeat(60));
    println!("Matmul Demo");
    println!("{}", "=".repeat(60));

    // C = A x B over i32, one thread per output element, 8x8 blocks
    let m: u32 = 32;
    let elems = (m * m) as usize;
    let istride = std::mem::size_of::<i32>();
    let mat_a: usize = 0;
    let mat_b: usize = elems * istride;
    let mat_c: usize = 2 * elems * istride;

    let mut src_a = vec![0i32; elems];
    let mut src_b = vec![0i32; elems];
    for i in 0..elems {
        src_a[i] = ((i * 7 + 3) % 17) as i32;
        src_b[i] = ((i * 5 + 1) % 13) as i32;
    }
    for i in 0..elems {
        device.hbm.write(mat_a + i * istride, &src_a[i].to_le_bytes());
        device.hbm.write(mat_b + i * istride, &src_b[i].to_le_bytes());
    }

    // CPU reference
    let mut refs = vec![0i32; elems];
    for row in 0..m as usize {
        for col in 0..m as usize {
            let mut sum = 0i32;
            for k in 0..m as usize {
                sum += src_a[row * m as usize + k] * src_b[k * m as usize + col];
            }
            refs[row * m as usize + col] = sum;
        }
    }

    let matmul = Kernel::new("matmul", move |ctx| {
        let col = (ctx.block_idx.x * ctx.block_dim.x + ctx.thread_idx.x) as usize;
        let row = (ctx.block_idx.y * ctx.block_dim.y + ctx.thread_idx.y) as usize;
        if row >= m as usize || col >= m as usize {
            return;
        }
        let mut sum = 0i32;
        for k in 0..m as usize {
            let a = i32::from_le_bytes(
                ctx.gmem
                    .read(mat_a + (row * m as usize + k) * istride, 4)
                    .try_into()
                    .unwrap(),
            );
            let b = i32::from_le_bytes(
                ctx.gmem
                    .read(mat_b + (k * m as usize + col) * istride, 4)
                    .try_into()
                    .unwrap(),
            );
            sum += a * b;
        }
        ctx.gmem
            .write(mat_c + (row * m as usize + col) * istride, &sum.to_le_bytes());
    });

    let grid = [m / 8, m / 8];
    let block = [8u32, 8];
    let dims = LaunchDims::new(2, Some(&grid), Some(&block));
    let mstats = device.spawn_threads(&dims, &matmul)?;

    let mut errors = 0;
    for i in 0..elems {
        let got = i32::from_le_bytes(device.hbm.read(mat_c + i * istride, 4).try_into().unwrap());
        if got != refs[i] {
            if errors < 8 {
                println!("MISMATCH at [{}]: got {}, expected {}", i, got, refs[i]);
            }
            errors += 1;
        }
    }
    if errors == 0 {
        println!("matmul PASSED: all {} elements match the CPU reference", elems);
    } else {
        println!("matmul FAILED: {} mismatches", errors);
    }
    println!(
        "Stats: {} blocks | {} warps | {} threads | {} active cores",
        mstats.blocks_executed,
        mstats.warps_executed,
        mstats.threads_executed,
        mstats.active_cores,
    );

    Ok(())
}

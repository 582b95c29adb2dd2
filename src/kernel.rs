/// Kernel definitions and launch geometry.
/// A kernel is a function that every logical thread executes, identified by
/// its thread/block coordinates — mirroring the CUDA/OpenCL execution model.
use crate::memory::HBM;

/// 3D dimension struct used for grid and block sizes (mirrors CUDA's dim3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const ZERO: Dim3 = Dim3 { x: 0, y: 0, z: 0 };

    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Dim3 { x, y, z }
    }

    /// Convenience constructor for 1D configs
    pub fn x(x: u32) -> Self {
        Dim3 { x, y: 1, z: 1 }
    }

    /// Total number of threads/blocks in this dimension
    pub fn size(&self) -> u32 {
        self.x * self.y * self.z
    }

    /// Decompose a linear index into coordinates, x-fastest (row-major).
    pub fn from_linear(linear: u32, dims: Dim3) -> Self {
        Dim3 {
            x: linear % dims.x,
            y: (linear / dims.x) % dims.y,
            z: linear / (dims.x * dims.y),
        }
    }

    /// Inverse of `from_linear`.
    pub fn to_linear(&self, dims: Dim3) -> u32 {
        self.x + self.y * dims.x + self.z * dims.x * dims.y
    }
}

/// Launch geometry as supplied by the caller: a dimension count plus optional
/// per-axis grid/block extents. An absent array, or an axis at or beyond
/// `dimension`, defaults to 1 — so a 1D launch can pass just `&[n]`.
pub struct LaunchDims<'a> {
    pub dimension: u32,
    pub grid_dim: Option<&'a [u32]>,
    pub block_dim: Option<&'a [u32]>,
}

impl<'a> LaunchDims<'a> {
    pub fn new(dimension: u32, grid_dim: Option<&'a [u32]>, block_dim: Option<&'a [u32]>) -> Self {
        LaunchDims {
            dimension,
            grid_dim,
            block_dim,
        }
    }

    /// Fold the caller's arrays into concrete grid/block dims and their
    /// axis products.
    pub fn normalize(&self) -> Geometry {
        let mut grid = [1u32; 3];
        let mut block = [1u32; 3];
        for i in 0..3 {
            if (i as u32) < self.dimension {
                if let Some(g) = self.grid_dim {
                    grid[i] = g.get(i).copied().unwrap_or(1);
                }
                if let Some(b) = self.block_dim {
                    block[i] = b.get(i).copied().unwrap_or(1);
                }
            }
        }
        let grid_dim = Dim3::new(grid[0], grid[1], grid[2]);
        let block_dim = Dim3::new(block[0], block[1], block[2]);
        Geometry {
            grid_dim,
            block_dim,
            num_groups: grid_dim.size(),
            group_size: block_dim.size(),
        }
    }
}

/// Normalized launch geometry: immutable for the lifetime of a launch.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub grid_dim: Dim3,
    pub block_dim: Dim3,
    /// Total blocks in the grid
    pub num_groups: u32,
    /// Threads per block
    pub group_size: u32,
}

/// Per-thread context passed into the kernel function.
/// Carries the thread's logical coordinates, its physical placement, and
/// access to global memory.
pub struct ThreadCtx<'a> {
    pub block_idx: Dim3,
    pub thread_idx: Dim3,
    pub block_dim: Dim3,
    pub grid_dim: Dim3,
    /// Index of this block among the blocks concurrently resident on its core
    /// (always 0 on the one-thread-per-block path).
    pub local_group_id: u32,
    /// Physical core executing this thread
    pub core_id: u32,
    /// Hardware warp within the core
    pub warp_id: u32,
    /// SIMD lane within the warp
    pub lane_id: u32,
    /// Global memory (HBM)
    pub gmem: &'a mut HBM,
}

impl<'a> ThreadCtx<'a> {
    /// Flat 1D global thread index: blockIdx.x * blockDim.x + threadIdx.x
    pub fn global_id(&self) -> u32 {
        self.block_idx.x * self.block_dim.x + self.thread_idx.x
    }
}

/// A kernel: a named function executed by every thread in the launch grid.
/// Arguments travel as closure captures.
pub struct Kernel {
    pub name: String,
    pub func: Box<dyn Fn(&mut ThreadCtx<'_>)>,
}

impl Kernel {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut ThreadCtx<'_>) + 'static,
    {
        Kernel {
            name: name.to_string(),
            func: Box::new(func),
        }
    }
}

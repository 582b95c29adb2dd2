pub mod cores;
pub mod device;
pub mod kernel;
pub mod memory;
pub mod metrics;
pub mod partition;
pub mod spawn;

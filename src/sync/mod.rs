mod pool;
mod status;

pub use pool::{ExclusivePool, PoolGuard};
pub use status::{TaskGuard, TaskStatusTable};

//! # Adaptive Task Pool
//!
//! An in-process worker pool that executes asynchronous units of work on a
//! dynamically sized population of Tokio tasks.
//!
//! ## Features
//!
//! - **Bounded FIFO queue**: submission blocks (up to a deadline) while the queue is full
//! - **Tiered workers**: permanent, core (idle-evicted) and temporary (fast-exit) bands
//! - **Backlog-driven scaling**: new workers are spawned when the queue backs up
//! - **Fault isolation**: panicking tasks are converted into structured errors
//! - **Lifecycle control**: graceful drain or immediate shutdown, plus state snapshots
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskPool                              │
//! │  (lifecycle state machine, scaling policy, submission)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Bounded work queue                          │
//! │  (async-channel, FIFO, closed on shutdown then drained)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Workers                                │
//! │  (interrupt / idle deadline / dequeue, PanicGuard per task) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use taskpool::prelude::*;
//!
//! let config = PoolConfig::new(4, 64).with_max_workers(16);
//! let pool = TaskPool::new(config)?;
//! pool.start()?;
//!
//! pool.submit(task_fn(|ctx| async move {
//!     do_work(&ctx).await?;
//!     Ok(())
//! }))
//! .await?;
//!
//! pool.shutdown()?.wait().await;
//! ```

pub mod pool;
pub mod reliability;
pub mod task;

mod duration_millis;

/// Prelude for common imports
pub mod prelude {
    pub use crate::pool::{
        PoolConfig, PoolError, PoolSnapshot, PoolState, ShutdownSignal, TaskPool, WorkerBand,
        WorkerLimits,
    };
    pub use crate::reliability::RetryPolicy;
    pub use crate::task::{task_fn, PanicGuard, Task, TaskContext, TaskError, TaskFn};
}

// Re-export key types at crate root
pub use pool::{
    PoolConfig, PoolError, PoolSnapshot, PoolState, ShutdownSignal, TaskPool, WorkerBand,
    WorkerLimits,
};
pub use reliability::RetryPolicy;
pub use task::{task_fn, PanicGuard, Task, TaskContext, TaskError, TaskFn};

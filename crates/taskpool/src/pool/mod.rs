//! Adaptive task pool
//!
//! This module provides:
//! - [`TaskPool`] - Bounded queue plus a dynamically sized set of workers
//! - [`PoolConfig`] - Worker thresholds, timeouts and backlog rate
//! - [`WorkerLimits`] / [`WorkerBand`] - The permanent / core / temporary scaling policy
//! - [`PoolSnapshot`] - Point-in-time state emitted by [`TaskPool::state`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskPool                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────┐  │
//! │  │   submit()   │  │   start()    │  │ shutdown[_now]()  │  │
//! │  └──────┬───────┘  └──────┬───────┘  └─────────┬─────────┘  │
//! │         │   lifecycle mutex (state, total_workers)           │
//! │         ▼                                                    │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │            Bounded FIFO queue (async-channel)        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  [1 .. init]        permanent workers (never evicted)        │
//! │  (init .. core]     core workers (evicted after max_idle)    │
//! │  (core .. max]      temporary workers (exit when idle)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use taskpool::pool::{PoolConfig, TaskPool};
//!
//! let config = PoolConfig::new(8, 128)
//!     .with_core_workers(16)
//!     .with_max_workers(32)
//!     .with_max_idle_time(Duration::from_secs(5));
//!
//! let pool = TaskPool::new(config)?;
//! pool.on_error(|_ctx, err| async move {
//!     tracing::warn!(%err, "task failed");
//! });
//! pool.start()?;
//!
//! // Graceful shutdown
//! pool.shutdown()?.wait().await;
//! ```

mod band;
mod config;
mod error;
mod snapshot;
mod task_pool;
mod tracked;
mod worker;

pub use band::{WorkerBand, WorkerLimits};
pub use config::PoolConfig;
pub use error::PoolError;
pub use snapshot::{PoolSnapshot, PoolState};
pub use task_pool::{ErrorHandler, ShutdownSignal, TaskPool};
pub use tracked::TimeoutTrackedWorkers;

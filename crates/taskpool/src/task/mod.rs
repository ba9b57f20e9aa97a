//! Units of work executed by the pool
//!
//! This module provides:
//! - [`Task`] - The work item trait
//! - [`TaskFn`] / [`task_fn`] - Closure adapter implementing [`Task`]
//! - [`TaskContext`] - Cancellable, deadline-aware execution context
//! - [`PanicGuard`] - Wrapper converting panics into [`TaskError::Panicked`]

mod context;
mod definition;
mod guard;

pub use context::TaskContext;
pub use definition::{task_fn, Task, TaskError, TaskFn};
pub use guard::PanicGuard;
pub(crate) use guard::panic_message;

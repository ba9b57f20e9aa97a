//! Task trait definition

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use super::TaskContext;

/// Error type for task failures
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task reported a failure
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The task panicked; the panic was caught by [`PanicGuard`](super::PanicGuard)
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text
        message: String,
        /// Backtrace captured where the panic was recovered
        backtrace: String,
    },

    /// The task observed cancellation and stopped early
    #[error("task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Create a failure from a message
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(anyhow::anyhow!("{}", message))
    }

    /// Check if this error came from a caught panic
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

/// A unit of work executed by the pool
///
/// Tasks are owned exclusively: the submitter owns a task until it is handed
/// to the queue, then the worker that dequeues it owns it and consumes it by
/// calling [`run`](Task::run).
///
/// # Example
///
/// ```ignore
/// use taskpool::prelude::*;
///
/// struct Resize {
///     path: PathBuf,
/// }
///
/// #[async_trait]
/// impl Task for Resize {
///     async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
///         tokio::select! {
///             res = resize(&self.path) => res.map_err(TaskError::from),
///             _ = ctx.cancelled() => Err(TaskError::Cancelled),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + 'static {
    /// Execute the task to completion or failure
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError>;
}

/// Adapter turning a closure into a [`Task`]
pub struct TaskFn<F>(F);

impl<F> TaskFn<F> {
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> fmt::Debug for TaskFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
        (self.0)(ctx).await
    }
}

/// Build a [`Task`] from an async closure
///
/// ```ignore
/// pool.submit(task_fn(|ctx| async move {
///     send_email(&ctx).await?;
///     Ok(())
/// }))
/// .await?;
/// ```
pub fn task_fn<F, Fut>(f: F) -> TaskFn<F>
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    TaskFn::new(f)
}

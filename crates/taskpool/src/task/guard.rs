//! Panic isolation for tasks

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use super::{Task, TaskContext, TaskError};

/// Wraps a task so that a panic inside [`Task::run`] becomes
/// [`TaskError::Panicked`] instead of unwinding into the worker.
pub struct PanicGuard {
    inner: Box<dyn Task>,
}

impl PanicGuard {
    /// Guard a boxed task
    pub fn new(inner: Box<dyn Task>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Task for PanicGuard {
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
        match AssertUnwindSafe(self.inner.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let backtrace = Backtrace::force_capture().to_string();

                error!(panic = %message, stack = %backtrace, "panic when running task");

                Err(TaskError::Panicked { message, backtrace })
            }
        }
    }
}

/// Render a panic payload as text
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::task_fn;

    fn explode(message: &str) -> Result<(), TaskError> {
        panic!("{}", message)
    }

    #[tokio::test]
    async fn test_passes_through_success() {
        let guard = PanicGuard::new(Box::new(task_fn(|_ctx| async { Ok(()) })));
        assert!(Box::new(guard).run(TaskContext::background()).await.is_ok());
    }

    #[tokio::test]
    async fn test_passes_through_failure() {
        let guard = PanicGuard::new(Box::new(task_fn(|_ctx| async {
            Err(TaskError::failed("rejected"))
        })));

        let err = Box::new(guard)
            .run(TaskContext::background())
            .await
            .unwrap_err();

        assert!(!err.is_panic());
        assert_eq!(err.to_string(), "rejected");
    }

    #[tokio::test]
    async fn test_converts_panic() {
        let guard = PanicGuard::new(Box::new(task_fn(|_ctx| async {
            explode("worker must survive this")
        })));

        let err = Box::new(guard)
            .run(TaskContext::background())
            .await
            .unwrap_err();

        match err {
            TaskError::Panicked { message, backtrace } => {
                assert_eq!(message, "worker must survive this");
                assert!(!backtrace.is_empty());
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[test]
    fn test_panic_message_formats() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(7_u32);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "borrowed");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}

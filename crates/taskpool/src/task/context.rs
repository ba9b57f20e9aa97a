//! Task execution context

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context provided to tasks during execution
///
/// The context provides:
/// - Cancellation detection (the pool interrupt signal)
/// - An optional deadline
///
/// Cloning a context is cheap; clones observe the same cancellation.
///
/// # Example
///
/// ```ignore
/// async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
///     for chunk in self.chunks {
///         if ctx.is_cancelled() {
///             return Err(TaskError::Cancelled);
///         }
///         process(chunk).await?;
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TaskContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl TaskContext {
    /// Create a context driven by the given cancellation token
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Create a context that is never cancelled
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Derive a child context that additionally expires after `timeout`
    ///
    /// Cancelling the child does not cancel the parent. The child keeps the
    /// earlier of the parent deadline and the new one.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(match self.deadline {
                Some(parent) => parent.min(deadline),
                None => deadline,
            }),
        }
    }

    /// Check if cancellation was requested or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.is_expired()
    }

    /// Check if the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Wait until cancellation is requested or the deadline passes
    ///
    /// This is useful for select! patterns:
    ///
    /// ```ignore
    /// tokio::select! {
    ///     result = do_work() => { ... }
    ///     _ = ctx.cancelled() => return Err(TaskError::Cancelled),
    /// }
    /// ```
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// The deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline (`None` when there is no deadline)
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_context() {
        let ctx = TaskContext::background();
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_cancellation_propagates_to_clones() {
        let token = CancellationToken::new();
        let ctx = TaskContext::new(token.clone());
        let clone = ctx.clone();

        token.cancel();

        assert!(ctx.is_cancelled());
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_reach_parent() {
        let parent = TaskContext::background();
        let child = parent.with_timeout(Duration::from_secs(60));

        child.cancel();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_keeps_earlier_deadline() {
        let parent = TaskContext::background().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(60));

        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_at_deadline() {
        let ctx = TaskContext::background().with_timeout(Duration::from_millis(10));
        let started = Instant::now();

        ctx.cancelled().await;

        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(ctx.is_expired());
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}

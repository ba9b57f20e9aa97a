//! Caller-side reliability helpers
//!
//! The pool never retries on its own. [`RetryPolicy`] drives
//! [`TaskPool::submit_with_retry`](crate::TaskPool::submit_with_retry) for
//! callers who want timed-out submissions to be attempted again.

mod retry;

pub use retry::RetryPolicy;

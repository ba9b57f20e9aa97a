//! Task pool lifecycle, submission and scaling

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender, TrySendError};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::band::{WorkerBand, WorkerLimits};
use super::config::PoolConfig;
use super::error::PoolError;
use super::snapshot::{PoolSnapshot, PoolState};
use super::tracked::TimeoutTrackedWorkers;
use super::worker;
use crate::reliability::RetryPolicy;
use crate::task::{Task, TaskContext, TaskError};

/// Asynchronous callback invoked once per failed task
pub type ErrorHandler = Arc<dyn Fn(TaskContext, TaskError) -> BoxFuture<'static, ()> + Send + Sync>;

/// `(state, total_workers)`, always mutated together
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) state: PoolState,
    pub(crate) total_workers: usize,
}

/// What a worker does after finishing a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextStep {
    /// Worker retired; leave the loop
    Exit,
    /// Keep looping, evicted if idle past the deadline
    Idle(Instant),
    /// Keep looping without a timer
    Continue,
}

/// State shared by the pool handle and every worker
pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    pub(crate) limits: WorkerLimits,
    lifecycle: Mutex<Lifecycle>,
    pub(crate) running: AtomicUsize,
    /// Workers parked in a receive with no hand-off claimed yet. Only used
    /// when `queue_capacity` is 0.
    ready: AtomicUsize,
    next_worker_id: AtomicU64,
    sender: Sender<Box<dyn Task>>,
    pub(crate) receiver: Receiver<Box<dyn Task>>,
    /// Raised on every dequeue and on shutdown
    pub(crate) space: Notify,
    pub(crate) tracked: TimeoutTrackedWorkers,
    pub(crate) interrupt: CancellationToken,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl PoolInner {
    fn allow_to_create_worker(&self, total_workers: usize) -> bool {
        if total_workers >= self.limits.max || self.config.queue_capacity == 0 {
            return false;
        }
        let rate = self.receiver.len() as f64 / self.config.queue_capacity as f64;
        rate != 0.0 && rate >= self.config.queue_backlog_rate
    }

    fn spawn_worker(self: &Arc<Self>, lifecycle: &mut Lifecycle) {
        lifecycle.total_workers += 1;
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            pool = %self.config.name,
            worker_id = id,
            total_workers = lifecycle.total_workers,
            "spawning worker"
        );
        tokio::spawn(worker::run_worker(Arc::clone(self), id));
    }

    /// Zero capacity: a task is accepted only when a parked worker takes it
    pub(crate) fn is_rendezvous(&self) -> bool {
        self.config.queue_capacity == 0
    }

    /// Announce a worker waiting for a hand-off
    pub(crate) fn park(&self) {
        self.ready.fetch_add(1, Ordering::AcqRel);
        self.space.notify_waiters();
    }

    /// Claim one parked worker; false if none is left unclaimed
    pub(crate) fn claim_parked(&self) -> bool {
        self.ready
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Tasks accepted but not yet picked up by a worker
    ///
    /// Hand-offs in flight on a zero-capacity queue already belong to a
    /// worker and are not counted.
    pub(crate) fn queued(&self) -> usize {
        if self.is_rendezvous() {
            0
        } else {
            self.receiver.len()
        }
    }

    /// Try a non-blocking enqueue; hands the task back if the queue is full
    fn try_enqueue(self: &Arc<Self>, task: Box<dyn Task>) -> Result<Option<Box<dyn Task>>, PoolError> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state {
            PoolState::Closing => return Err(PoolError::Closing),
            PoolState::Closed => return Err(PoolError::Closed),
            PoolState::Created | PoolState::Running => {}
        }

        if self.is_rendezvous() && !self.claim_parked() {
            return Ok(Some(task));
        }

        match self.sender.try_send(task) {
            Ok(()) => {
                if lifecycle.state == PoolState::Running
                    && self.allow_to_create_worker(lifecycle.total_workers)
                {
                    self.spawn_worker(&mut lifecycle);
                }
                Ok(None)
            }
            Err(TrySendError::Full(task)) => {
                if self.is_rendezvous() {
                    self.park();
                }
                Ok(Some(task))
            }
            Err(TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    /// Scaling decision taken by a worker after each task
    pub(crate) fn after_task(&self, worker_id: u64) -> NextStep {
        let lifecycle = self.lifecycle.lock();
        let queued = self.queued();
        let queue_idle = queued == 0 || queued < lifecycle.total_workers;
        let timed = self.tracked.len();

        let band = self.limits.classify(lifecycle.total_workers, timed);
        if band == WorkerBand::Temporary && queue_idle {
            self.retire_locked(lifecycle, worker_id, "no backlog");
            NextStep::Exit
        } else if self.limits.exceeds_permanent(lifecycle.total_workers, timed) {
            self.tracked.insert(worker_id);
            NextStep::Idle(Instant::now() + self.config.max_idle_time)
        } else {
            NextStep::Continue
        }
    }

    /// Remove a worker from the accounting
    pub(crate) fn retire(&self, worker_id: u64, reason: &'static str) {
        self.retire_locked(self.lifecycle.lock(), worker_id, reason);
    }

    fn retire_locked(&self, mut lifecycle: MutexGuard<'_, Lifecycle>, worker_id: u64, reason: &'static str) {
        self.tracked.remove(worker_id);
        lifecycle.total_workers = lifecycle.total_workers.saturating_sub(1);
        debug!(
            pool = %self.config.name,
            worker_id,
            reason,
            total_workers = lifecycle.total_workers,
            "worker exited"
        );

        if lifecycle.total_workers == 0 && lifecycle.state == PoolState::Closing {
            lifecycle.state = PoolState::Closed;
            drop(lifecycle);
            info!(pool = %self.config.name, "pool drained and closed");
            self.interrupt.cancel();
        }
    }

    pub(crate) fn error_handler(&self) -> Option<ErrorHandler> {
        self.error_handler.read().clone()
    }

    fn snapshot(&self) -> PoolSnapshot {
        let lifecycle = self.lifecycle.lock();
        PoolSnapshot {
            queue_capacity: self.config.queue_capacity,
            worker_count: lifecycle.total_workers,
            waiting_count: self.queued(),
            running_count: self.running.load(Ordering::Acquire),
            state: lifecycle.state,
            timestamp: Utc::now(),
        }
    }
}

/// Adaptive task pool
///
/// A bounded FIFO queue drained by a worker population that grows with
/// backlog and shrinks when idle, between `init_workers` and `max_workers`.
/// The handle is cheap to clone; all clones drive the same pool.
///
/// # Example
///
/// ```ignore
/// let pool = TaskPool::new(PoolConfig::new(2, 16).with_max_workers(8))?;
/// pool.start()?;
///
/// pool.submit(task_fn(|_ctx| async {
///     do_work().await.map_err(TaskError::from)
/// }))
/// .await?;
///
/// pool.shutdown()?.wait().await;
/// ```
#[derive(Clone)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("name", &self.inner.config.name)
            .field("limits", &self.inner.limits)
            .field("state", &self.pool_state())
            .finish()
    }
}

impl TaskPool {
    /// Create a pool in the `Created` state
    ///
    /// Submissions are accepted and buffered before `start()`, up to the
    /// queue capacity. A zero capacity queue buffers nothing: a submission
    /// succeeds only when an idle worker is waiting to take it.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let limits = config.limits()?;
        // With zero capacity the channel only carries claimed hand-offs, at
        // most one per live worker
        let buffer = match config.queue_capacity {
            0 => limits.max,
            capacity => capacity,
        };
        let (sender, receiver) = async_channel::bounded(buffer);

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                limits,
                lifecycle: Mutex::new(Lifecycle {
                    state: PoolState::Created,
                    total_workers: 0,
                }),
                running: AtomicUsize::new(0),
                ready: AtomicUsize::new(0),
                next_worker_id: AtomicU64::new(1),
                sender,
                receiver,
                space: Notify::new(),
                tracked: TimeoutTrackedWorkers::new(),
                interrupt: CancellationToken::new(),
                error_handler: RwLock::new(None),
            }),
        })
    }

    /// Register the callback invoked for every failed or panicked task
    ///
    /// The handler runs on its own Tokio task with a context that expires
    /// after `err_handle_timeout`. Panics inside it are caught and logged.
    pub fn on_error<F, Fut>(&self, handler: F)
    where
        F: Fn(TaskContext, TaskError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: ErrorHandler =
            Arc::new(move |ctx: TaskContext, err: TaskError| handler(ctx, err).boxed());
        *self.inner.error_handler.write() = Some(handler);
    }

    /// Launch the initial workers and move to `Running`
    ///
    /// Fails with [`PoolError::InvalidArgument`] outside a Tokio runtime.
    pub fn start(&self) -> Result<(), PoolError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(PoolError::InvalidArgument(
                "start must be called from within a Tokio runtime".to_string(),
            ));
        }

        let mut lifecycle = self.inner.lifecycle.lock();
        match lifecycle.state {
            PoolState::Created => {}
            PoolState::Running => return Err(PoolError::AlreadyRunning),
            PoolState::Closing => return Err(PoolError::Closing),
            PoolState::Closed => return Err(PoolError::Closed),
        }

        let workers = self.inner.limits.initial_workers(self.inner.queued());
        for _ in 0..workers {
            self.inner.spawn_worker(&mut lifecycle);
        }
        lifecycle.state = PoolState::Running;

        info!(
            pool = %self.inner.config.name,
            workers,
            init_workers = self.inner.limits.init,
            core_workers = self.inner.limits.core,
            max_workers = self.inner.limits.max,
            "task pool started"
        );
        Ok(())
    }

    /// Submit a task, waiting up to `submit_timeout` for queue space
    pub async fn submit<T: Task>(&self, task: T) -> Result<(), PoolError> {
        let budget = self.inner.config.submit_timeout;
        self.submit_boxed(Box::new(task), Instant::now() + budget, budget)
            .await
    }

    /// Submit a task, waiting until `deadline` for queue space
    ///
    /// Dropping the returned future abandons the submission; the task is
    /// never enqueued in that case.
    pub async fn submit_with_deadline<T: Task>(&self, task: T, deadline: Instant) -> Result<(), PoolError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        self.submit_boxed(Box::new(task), deadline, budget).await
    }

    async fn submit_boxed(
        &self,
        mut task: Box<dyn Task>,
        deadline: Instant,
        budget: Duration,
    ) -> Result<(), PoolError> {
        loop {
            // Register before trying so a dequeue between the attempt and the
            // wait is not missed
            let notified = self.inner.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            task = match self.inner.try_enqueue(task)? {
                None => return Ok(()),
                Some(task) => task,
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(pool = %self.inner.config.name, budget_ms = budget.as_millis() as u64, "submission timed out");
                    return Err(PoolError::SubmitTimeout(budget));
                }
            }
        }
    }

    /// Submit a task built by `make_task`, retrying timed-out submissions
    ///
    /// A fresh task is built for every attempt. Only retryable errors
    /// ([`PoolError::is_retryable`]) are retried.
    pub async fn submit_with_retry<T, F>(&self, policy: &RetryPolicy, mut make_task: F) -> Result<(), PoolError>
    where
        T: Task,
        F: FnMut() -> T,
    {
        let mut attempt = 1;
        loop {
            match self.submit(make_task()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && policy.has_attempts_remaining(attempt) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        pool = %self.inner.config.name,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Close the queue and let workers drain it
    ///
    /// The returned signal completes once the last worker has exited.
    pub fn shutdown(&self) -> Result<ShutdownSignal, PoolError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        Self::ensure_running(lifecycle.state)?;

        self.inner.sender.close();
        lifecycle.state = PoolState::Closing;
        let workers = lifecycle.total_workers;
        if workers == 0 {
            lifecycle.state = PoolState::Closed;
            self.inner.interrupt.cancel();
        }
        drop(lifecycle);

        self.inner.space.notify_waiters();
        info!(pool = %self.inner.config.name, workers, "task pool shutting down");

        Ok(ShutdownSignal {
            done: self.inner.interrupt.clone(),
        })
    }

    /// Close the queue, interrupt workers and return every buffered task
    ///
    /// Tasks already executing are neither returned nor awaited. A hand-off
    /// that no worker has started yet is returned as well.
    pub fn shutdown_now(&self) -> Result<Vec<Box<dyn Task>>, PoolError> {
        let mut lifecycle = self.inner.lifecycle.lock();
        Self::ensure_running(lifecycle.state)?;

        self.inner.sender.close();
        lifecycle.state = PoolState::Closed;
        drop(lifecycle);

        let mut remaining = Vec::with_capacity(self.inner.receiver.len());
        while let Ok(task) = self.inner.receiver.try_recv() {
            remaining.push(task);
        }

        self.inner.interrupt.cancel();
        self.inner.space.notify_waiters();

        info!(
            pool = %self.inner.config.name,
            abandoned = remaining.len(),
            "task pool shut down immediately"
        );
        Ok(remaining)
    }

    fn ensure_running(state: PoolState) -> Result<(), PoolError> {
        match state {
            PoolState::Running => Ok(()),
            PoolState::Created => Err(PoolError::NotRunning),
            PoolState::Closing => Err(PoolError::Closing),
            PoolState::Closed => Err(PoolError::Closed),
        }
    }

    /// Stream snapshots every `interval` until `cancel` fires or the pool closes
    ///
    /// Ticks are dropped while the receiver holds an unread snapshot. A final
    /// snapshot is offered the same way before the channel closes, so the
    /// reporter never outlives either signal.
    pub fn state(
        &self,
        cancel: CancellationToken,
        interval: Duration,
    ) -> Result<mpsc::Receiver<PoolSnapshot>, PoolError> {
        if interval.is_zero() {
            return Err(PoolError::InvalidArgument(
                "state interval must be greater than zero".to_string(),
            ));
        }
        if cancel.is_cancelled() || self.inner.interrupt.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = inner.interrupt.cancelled() => break,
                    _ = tx.closed() => return,
                    _ = ticker.tick() => {
                        if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(inner.snapshot()) {
                            return;
                        }
                    }
                }
            }

            let _ = tx.try_send(inner.snapshot());
            debug!(pool = %inner.config.name, "state reporter stopped");
        });

        Ok(rx)
    }

    /// Current snapshot
    pub fn snapshot(&self) -> PoolSnapshot {
        self.inner.snapshot()
    }

    /// Lifecycle state
    pub fn pool_state(&self) -> PoolState {
        self.inner.lifecycle.lock().state
    }

    /// Live workers
    pub fn worker_count(&self) -> usize {
        self.inner.lifecycle.lock().total_workers
    }

    /// Workers currently executing a task
    pub fn running_count(&self) -> usize {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.inner.queued()
    }

    /// Configuration the pool was built with
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Resolved worker thresholds
    pub fn limits(&self) -> WorkerLimits {
        self.inner.limits
    }
}

/// Completion signal returned by [`TaskPool::shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    done: CancellationToken,
}

impl ShutdownSignal {
    /// Wait until every worker has exited
    pub async fn wait(self) {
        self.done.cancelled().await;
    }

    /// Check if the pool has fully drained
    pub fn is_complete(&self) -> bool {
        self.done.is_cancelled()
    }
}

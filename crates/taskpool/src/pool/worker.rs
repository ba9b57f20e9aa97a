//! Worker execution loop

use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{error, warn};

use super::task_pool::{NextStep, PoolInner};
use crate::task::{panic_message, PanicGuard, Task, TaskContext, TaskError};

pub(crate) async fn run_worker(inner: Arc<PoolInner>, id: u64) {
    let mut idle_deadline: Option<Instant> = None;
    let mut parked = false;

    loop {
        if inner.is_rendezvous() && !parked {
            inner.park();
            parked = true;
        }

        let idle = async move {
            match idle_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = inner.interrupt.cancelled() => {
                inner.retire(id, "interrupted");
                return;
            }
            _ = idle => {
                if parked && !inner.claim_parked() {
                    // A hand-off is already on its way to this worker
                    idle_deadline = None;
                    inner.tracked.remove(id);
                    continue;
                }
                inner.retire(id, "idle timeout");
                return;
            }
            received = inner.receiver.recv() => {
                parked = false;
                if idle_deadline.take().is_some() {
                    inner.tracked.remove(id);
                }

                let Ok(task) = received else {
                    inner.retire(id, "queue closed");
                    return;
                };
                inner.space.notify_waiters();

                execute(&inner, id, task).await;

                match inner.after_task(id) {
                    NextStep::Exit => return,
                    NextStep::Idle(deadline) => idle_deadline = Some(deadline),
                    NextStep::Continue => {}
                }
            }
        }
    }
}

async fn execute(inner: &Arc<PoolInner>, worker_id: u64, task: Box<dyn Task>) {
    let ctx = TaskContext::new(inner.interrupt.child_token());

    inner.running.fetch_add(1, Ordering::AcqRel);
    let result = Box::new(PanicGuard::new(task)).run(ctx.clone()).await;
    inner.running.fetch_sub(1, Ordering::AcqRel);

    if let Err(err) = result {
        if !err.is_panic() {
            warn!(pool = %inner.config.name, worker_id, error = %err, "task failed");
        }
        dispatch_error(inner, ctx, err);
    }
}

fn dispatch_error(inner: &Arc<PoolInner>, ctx: TaskContext, err: TaskError) {
    let Some(handler) = inner.error_handler() else {
        return;
    };

    let timeout = inner.config.err_handle_timeout;
    let ctx = ctx.with_timeout(timeout);
    let pool = inner.config.name.clone();

    tokio::spawn(async move {
        let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(ctx, err))) {
            Ok(fut) => fut,
            Err(payload) => {
                error!(pool = %pool, panic = %panic_message(payload.as_ref()), "panic when handling task error");
                return;
            }
        };

        match tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await {
            Ok(Ok(())) => {}
            Ok(Err(payload)) => {
                error!(pool = %pool, panic = %panic_message(payload.as_ref()), "panic when handling task error");
            }
            Err(_) => {
                warn!(pool = %pool, timeout_ms = timeout.as_millis() as u64, "error handler timed out");
            }
        }
    });
}

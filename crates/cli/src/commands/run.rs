// Load-driving run command

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;
use taskpool::{
    task_fn, PoolConfig, PoolError, PoolSnapshot, RetryPolicy, TaskContext, TaskError, TaskPool,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::output::{print_field, print_table_header, print_table_row, OutputFormat};

const SNAPSHOT_COLUMNS: [(&str, usize); 6] = [
    ("TIME", 12),
    ("STATE", 8),
    ("WORKERS", 7),
    ("RUNNING", 7),
    ("WAITING", 7),
    ("CAPACITY", 8),
];

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of synthetic tasks to submit
    #[arg(long, default_value = "100")]
    pub tasks: usize,

    /// Duration of each task in milliseconds
    #[arg(long, default_value = "20")]
    pub task_ms: u64,

    /// Make every Nth task fail
    #[arg(long)]
    pub fail_every: Option<usize>,

    /// Make every Nth task panic
    #[arg(long)]
    pub panic_every: Option<usize>,

    /// Snapshot interval in milliseconds
    #[arg(long, default_value = "250")]
    pub interval_ms: u64,

    /// Submission attempts per task
    #[arg(long, default_value = "1")]
    pub retries: u32,

    /// How to shut the pool down once everything is submitted
    #[arg(long, value_enum, default_value_t = ShutdownMode::Graceful)]
    pub mode: ShutdownMode,
}

/// Shutdown strategy once every task is submitted
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Drain the queue, then stop
    Graceful,
    /// Interrupt workers and abandon queued tasks
    Now,
}

impl std::fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graceful => write!(f, "graceful"),
            Self::Now => write!(f, "now"),
        }
    }
}

/// Kind of synthetic task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Succeed,
    Fail,
    Panic,
}

impl RunArgs {
    fn behavior(&self, index: usize) -> Behavior {
        let nth = index + 1;
        if self.panic_every.is_some_and(|n| n > 0 && nth % n == 0) {
            Behavior::Panic
        } else if self.fail_every.is_some_and(|n| n > 0 && nth % n == 0) {
            Behavior::Fail
        } else {
            Behavior::Succeed
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    panicked: AtomicUsize,
    cancelled: AtomicUsize,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    pool: String,
    mode: ShutdownMode,
    tasks: usize,
    submitted: usize,
    rejected: usize,
    completed: usize,
    failed: usize,
    panicked: usize,
    cancelled: usize,
    abandoned: usize,
    elapsed_ms: u64,
    last: PoolSnapshot,
}

pub async fn run(config: PoolConfig, args: RunArgs, output: OutputFormat, quiet: bool) -> Result<()> {
    let pool = TaskPool::new(config)?;
    let counters = Arc::new(Counters::default());
    let started = Instant::now();

    {
        let counters = Arc::clone(&counters);
        pool.on_error(move |_ctx, err| {
            let counters = Arc::clone(&counters);
            async move {
                let counter = match err {
                    TaskError::Panicked { .. } => &counters.panicked,
                    TaskError::Cancelled => &counters.cancelled,
                    TaskError::Failed(_) => &counters.failed,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    pool.start()?;

    let reporter_stop = CancellationToken::new();
    let reporter = if quiet {
        None
    } else {
        let snapshots = pool.state(reporter_stop.clone(), Duration::from_millis(args.interval_ms.max(1)))?;
        Some(spawn_printer(snapshots, output))
    };

    let interrupted = CancellationToken::new();
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                interrupted.cancel();
            }
        });
    }

    let policy = RetryPolicy::exponential().with_max_attempts(args.retries.max(1));
    let task_duration = Duration::from_millis(args.task_ms);
    let mut submitted = 0;
    let mut rejected = 0;

    for index in 0..args.tasks {
        if interrupted.is_cancelled() {
            break;
        }

        let behavior = args.behavior(index);
        let counters_for_task = Arc::clone(&counters);
        let result = pool
            .submit_with_retry(&policy, || {
                let counters = Arc::clone(&counters_for_task);
                task_fn(move |ctx| synthetic_task(ctx, behavior, task_duration, counters))
            })
            .await;

        match result {
            Ok(()) => submitted += 1,
            Err(err @ PoolError::SubmitTimeout(_)) => {
                warn!(task = index, error = %err, "task rejected");
                rejected += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(submitted, rejected, mode = %args.mode, "all tasks submitted, shutting down");

    let abandoned = if args.mode == ShutdownMode::Now || interrupted.is_cancelled() {
        pool.shutdown_now()?.len()
    } else {
        let signal = pool.shutdown()?;
        tokio::select! {
            _ = signal.wait() => 0,
            _ = interrupted.cancelled() => match pool.shutdown_now() {
                Ok(remaining) => remaining.len(),
                Err(_) => 0,
            },
        }
    };

    reporter_stop.cancel();
    if let Some(reporter) = reporter {
        reporter.await?;
    }

    let summary = RunSummary {
        pool: pool.config().name.clone(),
        mode: args.mode,
        tasks: args.tasks,
        submitted,
        rejected,
        completed: counters.completed.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
        panicked: counters.panicked.load(Ordering::Relaxed),
        cancelled: counters.cancelled.load(Ordering::Relaxed),
        abandoned,
        elapsed_ms: started.elapsed().as_millis() as u64,
        last: pool.snapshot(),
    };

    print_summary(&summary, output)
}

async fn synthetic_task(
    ctx: TaskContext,
    behavior: Behavior,
    duration: Duration,
    counters: Arc<Counters>,
) -> Result<(), TaskError> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = ctx.cancelled() => return Err(TaskError::Cancelled),
    }

    match behavior {
        Behavior::Succeed => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        Behavior::Fail => Err(TaskError::failed("synthetic failure")),
        Behavior::Panic => panic!("synthetic panic"),
    }
}

fn spawn_printer(mut snapshots: tokio::sync::mpsc::Receiver<PoolSnapshot>, output: OutputFormat) -> JoinHandle<()> {
    tokio::spawn(async move {
        if output.is_text() {
            print_table_header(&SNAPSHOT_COLUMNS);
        }

        while let Some(snapshot) = snapshots.recv().await {
            if output.is_text() {
                print_snapshot_row(&snapshot);
            } else if let Err(e) = output.print_record(&snapshot) {
                warn!(error = %e, "failed to print snapshot");
            }
        }
    })
}

fn print_snapshot_row(snapshot: &PoolSnapshot) {
    let time = snapshot.timestamp.format("%H:%M:%S%.3f").to_string();
    let state = snapshot.state.to_string();
    let workers = snapshot.worker_count.to_string();
    let running = snapshot.running_count.to_string();
    let waiting = snapshot.waiting_count.to_string();
    let capacity = snapshot.queue_capacity.to_string();

    let values = [&time, &state, &workers, &running, &waiting, &capacity];
    let row: Vec<(&str, usize)> = values
        .iter()
        .zip(SNAPSHOT_COLUMNS.iter())
        .map(|(value, (_, width))| (value.as_str(), *width))
        .collect();
    print_table_row(&row);
}

fn print_summary(summary: &RunSummary, output: OutputFormat) -> Result<()> {
    if !output.is_text() {
        return output.print_value(summary);
    }

    println!();
    print_field("Pool", &summary.pool);
    print_field("Mode", summary.mode);
    print_field("Tasks", summary.tasks);
    print_field("Submitted", summary.submitted);
    print_field("Rejected", summary.rejected);
    print_field("Completed", summary.completed);
    print_field("Failed", summary.failed);
    print_field("Panicked", summary.panicked);
    print_field("Cancelled", summary.cancelled);
    print_field("Abandoned", summary.abandoned);
    print_field("Elapsed", format!("{}ms", summary.elapsed_ms));
    print_field("Final state", summary.last.state);
    print_field("Workers left", summary.last.worker_count);

    Ok(())
}

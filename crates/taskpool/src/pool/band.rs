//! Worker banding policy
//!
//! The worker population is partitioned by three thresholds:
//!
//! ```text
//! [1       , init]  permanent  never idle-evicted
//! (init    , core]  core       evicted after `max_idle_time` without work
//! (core    , max ]  temporary  exits as soon as no backlog is visible
//! ```

use serde::{Deserialize, Serialize};

/// Which band a worker falls into after finishing a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerBand {
    /// Within `init`; loops forever without an idle timer
    Permanent,
    /// Beyond `init`; arms an idle timer and may be evicted
    Core,
    /// Beyond `core`; exits immediately when the queue is idle
    Temporary,
}

impl std::fmt::Display for WorkerBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permanent => write!(f, "permanent"),
            Self::Core => write!(f, "core"),
            Self::Temporary => write!(f, "temporary"),
        }
    }
}

/// Resolved worker thresholds, `init <= core <= max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLimits {
    /// Permanent workers
    pub init: usize,
    /// Upper bound of the core band
    pub core: usize,
    /// Upper bound of the temporary band
    pub max: usize,
}

impl WorkerLimits {
    /// Classify a worker given the live worker count and the number of
    /// workers currently holding an idle timer.
    pub fn classify(&self, total_workers: usize, timed_workers: usize) -> WorkerBand {
        if self.core < total_workers && total_workers <= self.max {
            WorkerBand::Temporary
        } else if self.exceeds_permanent(total_workers, timed_workers) {
            WorkerBand::Core
        } else {
            WorkerBand::Permanent
        }
    }

    /// More workers are active (not waiting on an idle timer) than the
    /// permanent band holds.
    pub fn exceeds_permanent(&self, total_workers: usize, timed_workers: usize) -> bool {
        self.init < total_workers.saturating_sub(timed_workers)
    }

    /// Workers `start()` launches for a queue already holding `queued` tasks
    pub fn initial_workers(&self, queued: usize) -> usize {
        let needed = queued.saturating_sub(self.init);
        self.init + needed.min(self.max - self.init)
    }
}

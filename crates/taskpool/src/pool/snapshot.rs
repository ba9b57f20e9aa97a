//! Pool state and snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pool lifecycle state
///
/// ```text
/// Created ──start()──► Running ──shutdown()──► Closing ──last worker──► Closed
///                          │                                               ▲
///                          └──────────────shutdown_now()───────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Constructed; accepts submissions but runs nothing yet
    Created,
    /// Workers are executing tasks
    Running,
    /// Queue closed; workers are draining
    Closing,
    /// All workers gone
    Closed,
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Immutable point-in-time view of a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Configured queue capacity
    pub queue_capacity: usize,
    /// Live workers
    pub worker_count: usize,
    /// Tasks waiting in the queue
    pub waiting_count: usize,
    /// Workers currently executing a task
    pub running_count: usize,
    /// Lifecycle state
    pub state: PoolState,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl PoolSnapshot {
    /// Workers alive but not executing a task
    pub fn idle_count(&self) -> usize {
        self.worker_count.saturating_sub(self.running_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(PoolState::Created.to_string(), "created");
        assert_eq!(PoolState::Closing.to_string(), "closing");
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = PoolSnapshot {
            queue_capacity: 8,
            worker_count: 3,
            waiting_count: 2,
            running_count: 1,
            state: PoolState::Running,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["worker_count"], 3);
        assert_eq!(snapshot.idle_count(), 2);
    }
}

//! Pool configuration

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::band::WorkerLimits;
use super::error::PoolError;
use crate::duration_millis;

const DEFAULT_INIT_WORKERS: usize = 1;
const DEFAULT_QUEUE_CAPACITY: usize = 128;
const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(10);
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_ERR_HANDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Task pool configuration
///
/// `core_workers` and `max_workers` are optional. When only one of them is
/// set the other is raised to match it; when neither is set both equal
/// `init_workers`. After defaulting, `init_workers <= core_workers <= max_workers`
/// must hold or [`TaskPool::new`](super::TaskPool::new) fails.
///
/// # Example
///
/// ```
/// use taskpool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new(4, 64)
///     .with_core_workers(8)
///     .with_max_workers(16)
///     .with_max_idle_time(Duration::from_secs(30));
///
/// let limits = config.limits().unwrap();
/// assert_eq!((limits.init, limits.core, limits.max), (4, 8, 16));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Pool name used in log events
    #[serde(default = "default_name")]
    pub name: String,

    /// Permanent workers, started by `start()` and never idle-evicted
    pub init_workers: usize,

    /// Queue capacity
    pub queue_capacity: usize,

    /// Upper bound of the core band (idle-evicted workers)
    #[serde(default)]
    pub core_workers: Option<usize>,

    /// Upper bound of the temporary band (fast-exit workers)
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// How long a core worker waits for work before exiting
    #[serde(with = "duration_millis", default = "default_max_idle_time")]
    pub max_idle_time: Duration,

    /// Default submission deadline
    #[serde(with = "duration_millis", default = "default_submit_timeout")]
    pub submit_timeout: Duration,

    /// Upper bound for a single error handler invocation
    #[serde(with = "duration_millis", default = "default_err_handle_timeout")]
    pub err_handle_timeout: Duration,

    /// Queue occupancy ratio (0.0 - 1.0) at which submissions spawn workers
    #[serde(default)]
    pub queue_backlog_rate: f64,
}

fn default_name() -> String {
    "taskpool".to_string()
}

fn default_max_idle_time() -> Duration {
    DEFAULT_MAX_IDLE_TIME
}

fn default_submit_timeout() -> Duration {
    DEFAULT_SUBMIT_TIMEOUT
}

fn default_err_handle_timeout() -> Duration {
    DEFAULT_ERR_HANDLE_TIMEOUT
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            init_workers: DEFAULT_INIT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            core_workers: None,
            max_workers: None,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            err_handle_timeout: DEFAULT_ERR_HANDLE_TIMEOUT,
            queue_backlog_rate: 0.0,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new(init_workers: usize, queue_capacity: usize) -> Self {
        Self {
            init_workers,
            queue_capacity,
            ..Default::default()
        }
    }

    /// Load configuration from `TASKPOOL_*` environment variables
    ///
    /// Unset variables keep their defaults. Unparseable values are rejected.
    pub fn from_env() -> Result<Self, PoolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("TASKPOOL_NAME") {
            config.name = name;
        }
        if let Some(v) = parse_var(&lookup, "TASKPOOL_INIT_WORKERS")? {
            config.init_workers = v;
        }
        if let Some(v) = parse_var(&lookup, "TASKPOOL_QUEUE_CAPACITY")? {
            config.queue_capacity = v;
        }
        config.core_workers = parse_var(&lookup, "TASKPOOL_CORE_WORKERS")?;
        config.max_workers = parse_var(&lookup, "TASKPOOL_MAX_WORKERS")?;
        if let Some(ms) = parse_var(&lookup, "TASKPOOL_MAX_IDLE_MS")? {
            config.max_idle_time = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "TASKPOOL_SUBMIT_TIMEOUT_MS")? {
            config.submit_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, "TASKPOOL_ERR_HANDLE_TIMEOUT_MS")? {
            config.err_handle_timeout = Duration::from_millis(ms);
        }
        if let Some(rate) = parse_var(&lookup, "TASKPOOL_QUEUE_BACKLOG_RATE")? {
            config.queue_backlog_rate = rate;
        }

        Ok(config)
    }

    /// Set the pool name used in log events
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the idle time after which core workers exit
    pub fn with_max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }

    /// Set the default submission deadline
    pub fn with_submit_timeout(mut self, submit_timeout: Duration) -> Self {
        self.submit_timeout = submit_timeout;
        self
    }

    /// Set the core worker bound
    pub fn with_core_workers(mut self, core_workers: usize) -> Self {
        self.core_workers = Some(core_workers);
        self
    }

    /// Set the maximum worker bound
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Set the queue backlog rate (not clamped; out-of-range values are rejected)
    pub fn with_queue_backlog_rate(mut self, rate: f64) -> Self {
        self.queue_backlog_rate = rate;
        self
    }

    /// Set the error handler timeout
    pub fn with_err_handle_timeout(mut self, timeout: Duration) -> Self {
        self.err_handle_timeout = timeout;
        self
    }

    /// Resolve the worker thresholds and validate the configuration
    pub fn limits(&self) -> Result<WorkerLimits, PoolError> {
        if self.init_workers == 0 {
            return Err(PoolError::InvalidConfig(format!(
                "invalid init worker count: {}, init workers should be greater than 0",
                self.init_workers
            )));
        }

        if !(0.0..=1.0).contains(&self.queue_backlog_rate) {
            return Err(PoolError::InvalidConfig(format!(
                "invalid queue backlog rate: {}, queue backlog rate should be in [0, 1]",
                self.queue_backlog_rate
            )));
        }

        let (core, max) = match (self.core_workers, self.max_workers) {
            (Some(core), Some(max)) => (core, max),
            (Some(core), None) => (core, core),
            (None, Some(max)) => (max, max),
            (None, None) => (self.init_workers, self.init_workers),
        };

        let limits = WorkerLimits {
            init: self.init_workers,
            core,
            max,
        };

        if !(limits.init <= limits.core && limits.core <= limits.max) {
            return Err(PoolError::InvalidConfig(format!(
                "workers required to satisfy [ init <= core <= max ], got [ {} <= {} <= {} ]",
                limits.init, limits.core, limits.max
            )));
        }

        Ok(limits)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PoolError> {
        self.limits().map(|_| ())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, PoolError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PoolError::InvalidConfig(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.name, "taskpool");
        assert_eq!(config.init_workers, 1);
        assert_eq!(config.max_idle_time, Duration::from_secs(10));
        assert_eq!(config.submit_timeout, Duration::from_secs(15));
        assert_eq!(config.err_handle_timeout, Duration::from_secs(3));
        assert_eq!(config.queue_backlog_rate, 0.0);
    }

    #[test]
    fn test_config_builder() {
        let config = PoolConfig::new(2, 10)
            .with_name("thumbnails")
            .with_core_workers(4)
            .with_max_workers(8)
            .with_max_idle_time(Duration::from_millis(500))
            .with_submit_timeout(Duration::from_secs(1))
            .with_err_handle_timeout(Duration::from_millis(100))
            .with_queue_backlog_rate(0.5);

        assert_eq!(config.name, "thumbnails");
        assert_eq!(config.init_workers, 2);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.core_workers, Some(4));
        assert_eq!(config.max_workers, Some(8));
        assert_eq!(config.max_idle_time, Duration::from_millis(500));
        assert_eq!(config.submit_timeout, Duration::from_secs(1));
        assert_eq!(config.err_handle_timeout, Duration::from_millis(100));
        assert_eq!(config.queue_backlog_rate, 0.5);
    }

    #[test]
    fn test_limits_default_to_init() {
        let limits = PoolConfig::new(3, 0).limits().unwrap();
        assert_eq!((limits.init, limits.core, limits.max), (3, 3, 3));
    }

    #[test]
    fn test_only_core_raises_max() {
        let limits = PoolConfig::new(2, 8).with_core_workers(5).limits().unwrap();
        assert_eq!((limits.init, limits.core, limits.max), (2, 5, 5));
    }

    #[test]
    fn test_only_max_raises_core() {
        let limits = PoolConfig::new(2, 8).with_max_workers(6).limits().unwrap();
        assert_eq!((limits.init, limits.core, limits.max), (2, 6, 6));
    }

    #[test]
    fn test_zero_init_workers_rejected() {
        let err = PoolConfig::new(0, 8).validate().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_bounds_order_enforced() {
        // core below init
        assert!(PoolConfig::new(4, 8).with_core_workers(2).validate().is_err());
        // max below core
        assert!(PoolConfig::new(1, 8)
            .with_core_workers(4)
            .with_max_workers(3)
            .validate()
            .is_err());
        // max below init
        assert!(PoolConfig::new(4, 8).with_max_workers(2).validate().is_err());
        // equal bounds are fine
        assert!(PoolConfig::new(4, 8)
            .with_core_workers(4)
            .with_max_workers(4)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_backlog_rate_range() {
        assert!(PoolConfig::new(1, 8).with_queue_backlog_rate(0.0).validate().is_ok());
        assert!(PoolConfig::new(1, 8).with_queue_backlog_rate(1.0).validate().is_ok());
        assert!(PoolConfig::new(1, 8).with_queue_backlog_rate(-0.1).validate().is_err());
        assert!(PoolConfig::new(1, 8).with_queue_backlog_rate(1.1).validate().is_err());
        assert!(PoolConfig::new(1, 8)
            .with_queue_backlog_rate(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            ("TASKPOOL_NAME", "ingest"),
            ("TASKPOOL_INIT_WORKERS", "4"),
            ("TASKPOOL_QUEUE_CAPACITY", "32"),
            ("TASKPOOL_MAX_WORKERS", "12"),
            ("TASKPOOL_MAX_IDLE_MS", "250"),
            ("TASKPOOL_QUEUE_BACKLOG_RATE", "0.25"),
        ]))
        .unwrap();

        assert_eq!(config.name, "ingest");
        assert_eq!(config.init_workers, 4);
        assert_eq!(config.queue_capacity, 32);
        assert_eq!(config.core_workers, None);
        assert_eq!(config.max_workers, Some(12));
        assert_eq!(config.max_idle_time, Duration::from_millis(250));
        assert_eq!(config.submit_timeout, Duration::from_secs(15));
        assert_eq!(config.queue_backlog_rate, 0.25);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PoolConfig::from_lookup(lookup_from(&[("TASKPOOL_QUEUE_CAPACITY", "-1")]))
            .unwrap_err();
        match err {
            PoolError::InvalidConfig(msg) => assert!(msg.starts_with("TASKPOOL_QUEUE_CAPACITY=-1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"init_workers": 2, "queue_capacity": 16, "max_idle_time": 1500}"#)
                .unwrap();

        assert_eq!(config.name, "taskpool");
        assert_eq!(config.max_idle_time, Duration::from_millis(1500));
        assert_eq!(config.submit_timeout, Duration::from_secs(15));
        assert_eq!(config.core_workers, None);
    }
}

//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the worker count.
pub const ENV_WORKER_COUNT: &str = "SOUL_WORKER_COUNT";
/// Environment variable overriding the worker stack size in bytes.
pub const ENV_THREAD_STACK_SIZE: &str = "SOUL_THREAD_STACK_SIZE";

const MIN_STACK_SIZE: usize = 64 * 1024;

/// Worker pool and scheduling parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Dedicated worker threads. `None` means hardware concurrency minus one.
    pub worker_count: Option<usize>,
    /// Stack size of each worker thread in bytes.
    pub thread_stack_size: usize,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Upper bound on a single idle wait, in milliseconds.
    pub park_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            thread_stack_size: 2 * 1024 * 1024,
            thread_name_prefix: "soul-worker".to_string(),
            park_timeout_ms: 10,
        }
    }
}

impl SchedulerConfig {
    /// Set an explicit worker count (0 runs everything on the initializing thread).
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Set the worker stack size in bytes.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the idle wait bound in milliseconds.
    #[must_use]
    pub const fn with_park_timeout_ms(mut self, ms: u64) -> Self {
        self.park_timeout_ms = ms;
        self
    }

    /// Worker count after applying the hardware default.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
    }

    /// Idle wait bound as a `Duration`.
    #[must_use]
    pub const fn park_timeout(&self) -> Duration {
        Duration::from_millis(self.park_timeout_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_stack_size < MIN_STACK_SIZE {
            return Err(format!(
                "thread_stack_size must be at least {MIN_STACK_SIZE} bytes"
            ));
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.park_timeout_ms == 0 {
            return Err("park_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `SOUL_*` environment variables (a `.env` file
    /// is loaded first when present).
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(raw) = std::env::var(ENV_WORKER_COUNT) {
            let count = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("{ENV_WORKER_COUNT}: {e}"))?;
            cfg.worker_count = Some(count);
        }
        if let Ok(raw) = std::env::var(ENV_THREAD_STACK_SIZE) {
            cfg.thread_stack_size = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| format!("{ENV_THREAD_STACK_SIZE}: {e}"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

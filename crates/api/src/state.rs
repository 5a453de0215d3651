//! Application state for the API server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use leetcrew_agents::{Pipeline, SolverConfig};

pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Shared application state for the API server.
pub struct AppState {
    /// Read-only; runs never mutate it.
    pub pipeline: Arc<Pipeline>,

    /// Server start time (for health checks)
    pub start_time: Instant,

    /// Wall-clock limit for one solve request.
    pub run_timeout: Duration,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Build the standard pipeline with workers from `config`.
    pub fn from_config(config: &SolverConfig) -> leetcrew_common::Result<Self> {
        let workers = config.build_workers()?;
        Ok(Self::new(Pipeline::standard(workers)?))
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

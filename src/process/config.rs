//! Construction-time configuration for the process manager.

use std::time::Duration;

use crate::error::{ProcessError, Result};

/// Stagger between consecutive workers' sync phases.
pub const SYNC_STEP: Duration = Duration::from_millis(2);

/// Configuration for a [`ProcessManager`](super::ProcessManager).
///
/// None of these values can be changed once the manager is running.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Number of worker threads to spawn.
    pub num_workers: usize,
    /// Requested interval between a worker's exchanges with the manager.
    pub sync_period: Duration,
    /// Fraction of a worker's pending queue handed back to the manager on sync.
    pub pending_share: f64,
    /// Fraction of a worker's solution queue handed back to the manager on sync.
    pub solution_share: f64,
    /// How long an idle worker blocks on its standing request before looping again.
    pub idle_wait: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            sync_period: Duration::from_millis(100),
            pending_share: 0.6,
            solution_share: 1.0,
            idle_wait: Duration::from_millis(1),
        }
    }
}

impl ProcessConfig {
    /// Set the number of worker threads (at least one).
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    pub fn with_sync_period(mut self, sync_period: Duration) -> Self {
        self.sync_period = sync_period;
        self
    }

    pub fn with_pending_share(mut self, share: f64) -> Self {
        self.pending_share = share;
        self
    }

    pub fn with_solution_share(mut self, share: f64) -> Self {
        self.solution_share = share;
        self
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Sync period actually used: never shorter than one stagger step per worker.
    pub fn effective_sync_period(&self) -> Duration {
        self.sync_period.max(SYNC_STEP * self.num_workers as u32)
    }

    /// Offset of a worker's first sync relative to the others.
    pub fn sync_offset(&self, worker_id: usize) -> Duration {
        SYNC_STEP * worker_id as u32
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(ProcessError::invalid_config(
                "num_workers",
                "at least one worker is required",
            ));
        }
        if u32::try_from(self.num_workers).is_err() {
            return Err(ProcessError::invalid_config(
                "num_workers",
                format!("{} workers is out of range", self.num_workers),
            ));
        }
        for (key, share) in [
            ("pending_share", self.pending_share),
            ("solution_share", self.solution_share),
        ] {
            if !(share > 0.0 && share <= 1.0) {
                return Err(ProcessError::invalid_config(
                    key,
                    format!("{share} is outside (0, 1]"),
                ));
            }
        }
        if self.idle_wait.is_zero() {
            return Err(ProcessError::invalid_config(
                "idle_wait",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

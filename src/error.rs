//! Error types for the expansion scheduler.

use std::time::Duration;

use crate::process::arena::NodeId;

/// Errors surfaced by the scheduler, its result handles and the node arena.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Invalid configuration for {key}: {message}")]
    InvalidConfig { key: &'static str, message: String },

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The job was superseded by a later `process` call before it completed.
    #[error("Job {job} was abandoned before producing a result")]
    Abandoned { job: u64 },

    /// An expand callback panicked; the manager refuses every job from then on.
    #[error("Job {job} failed: worker {worker} panicked: {message}")]
    WorkerPanicked {
        job: u64,
        worker: usize,
        message: String,
    },

    #[error("Job {job} produced no result within {waited:?}")]
    Timeout { job: u64, waited: Duration },

    /// The handle refers to a node freed by an arena reset.
    #[error("Stale arena node {0:?}")]
    StaleNode(NodeId),
}

impl ProcessError {
    pub(crate) fn invalid_config(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key,
            message: message.into(),
        }
    }

    /// True when the job can never resolve (as opposed to not having resolved yet).
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::Abandoned { .. })
    }
}

pub type Result<T, E = ProcessError> = std::result::Result<T, E>;

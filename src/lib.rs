//! Multi-worker best-first expansion scheduler.
//!
//! - `process`: the scheduler itself (work item contract, worker pool,
//!   manager, job submission and result handles, node arena)
//! - `walk`: a synthetic random-walk search used by the CLI and tests
//! - `error`: error types shared by both

pub mod error;
pub mod process;
pub mod walk;

pub use error::{ProcessError, Result};
pub use process::{
    Arena, JobOutcome, JobRequest, NodeId, ProcessConfig, ProcessManager, ResultHandle,
    Termination, WorkItem,
};

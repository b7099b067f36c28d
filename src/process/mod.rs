//! Parallel best-first expansion over a fixed pool of worker threads.
//!
//! # Architecture
//!
//! - A **manager** owns the shared pending and solution queues for the single
//!   running job. A coordination thread checks termination and feeds workers
//!   that have asked for more work.
//! - Each **worker** expands its own cheapest item without taking any lock and
//!   periodically hands part of its backlog, plus all of its solutions, back to
//!   the manager. Worker phases are staggered so they do not all sync at once.
//! - Workers keep one standing **request** open with the manager; it is
//!   answered with a round-robin share of the manager's backlog.
//! - Starting a job raises a cancel flag on every worker and bumps the job
//!   generation, so work for a superseded job is flushed rather than merged.
//!
//! Ordering is only approximately global: each worker pops in strict cost
//! order, but backlog moves between workers in batches.
//!
//! # Example
//!
//! ```ignore
//! use search_process::process::{JobRequest, ProcessConfig, ProcessManager};
//!
//! let manager = ProcessManager::new(
//!     ProcessConfig::default().with_workers(4),
//!     |node: &Node, depth: Option<&u32>| node.children(depth),
//!     |node: Node| node.cost,
//! )?;
//!
//! let handle = manager.process(JobRequest::new(seeds).with_minimal_solutions(10));
//! let outcome = handle.wait()?;
//! ```

pub mod arena;
pub mod config;
mod hub;
pub mod item;
pub mod job;
pub mod manager;
mod worker;

pub use arena::{Arena, NodeId};
pub use config::{ProcessConfig, SYNC_STEP};
pub use item::{CostQueue, WorkItem};
pub use job::{JobOutcome, JobRequest, ResultHandle, Termination};
pub use manager::{MapSolutionFn, ProcessManager};
pub use worker::ExpandFn;

//! Job submission and the one-shot result channel handed back to callers.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

use crate::error::{ProcessError, Result};

pub const DEFAULT_MINIMAL_SOLUTIONS: usize = 100;
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_millis(10_000);

/// Everything needed to start one job.
#[derive(Debug)]
pub struct JobRequest<D, P> {
    pub seeds: Vec<D>,
    pub minimal_solutions: usize,
    pub parameter: Option<Arc<P>>,
    pub max_duration: Duration,
}

impl<D, P> JobRequest<D, P> {
    pub fn new(seeds: impl IntoIterator<Item = D>) -> Self {
        Self {
            seeds: seeds.into_iter().collect(),
            minimal_solutions: DEFAULT_MINIMAL_SOLUTIONS,
            parameter: None,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }

    /// Stop once this many solutions have reached the manager.
    pub fn with_minimal_solutions(mut self, minimal_solutions: usize) -> Self {
        self.minimal_solutions = minimal_solutions;
        self
    }

    pub fn with_parameter(self, parameter: P) -> Self {
        self.with_shared_parameter(Arc::new(parameter))
    }

    pub fn with_shared_parameter(mut self, parameter: Arc<P>) -> Self {
        self.parameter = Some(parameter);
        self
    }

    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }
}

/// Why a job stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Enough solutions were collected.
    SolutionTarget,
    /// The job ran for its maximum duration.
    Timeout,
    /// No worker had anything left to expand.
    Exhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::SolutionTarget => write!(f, "solution target reached"),
            Termination::Timeout => write!(f, "timed out"),
            Termination::Exhausted => write!(f, "search space exhausted"),
        }
    }
}

/// Result of a completed job.
#[derive(Debug, Clone)]
pub struct JobOutcome<S> {
    /// Job id, as returned by [`ResultHandle::job_id`].
    pub job: u64,
    /// Mapped solutions in ascending cost order.
    ///
    /// Capped at the request's `minimal_solutions`: when a final sync delivers
    /// more than that, only the cheapest are mapped and the rest are dropped.
    pub solutions: Vec<S>,
    pub termination: Termination,
    pub elapsed: Duration,
    /// Expansion calls made on behalf of this job.
    pub expansions: u64,
}

impl<S> JobOutcome<S> {
    /// Expansion calls per second over the job's lifetime.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.expansions as f64 / secs
        }
    }

    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Job: {}\n", self.job));
        s.push_str(&format!("Termination: {}\n", self.termination));
        s.push_str(&format!("Time: {:.2?}\n", self.elapsed));
        s.push_str(&format!("Solutions: {}\n", self.solutions.len()));
        s.push_str(&format!("Expansions: {}\n", self.expansions));
        s.push_str(&format!(
            "Throughput: {:.0} expansions/sec\n",
            self.throughput()
        ));
        s
    }
}

/// Panic raised by a worker's expand callback.
#[derive(Debug, Clone)]
pub(crate) struct WorkerFailure {
    pub(crate) worker: usize,
    pub(crate) message: String,
}

type Resolution<S> = std::result::Result<JobOutcome<S>, WorkerFailure>;

/// Sending half of a job's result cell, held by the manager.
pub(crate) struct ResultSender<S> {
    job: u64,
    sender: Sender<Resolution<S>>,
}

impl<S> ResultSender<S> {
    pub(crate) fn job(&self) -> u64 {
        self.job
    }

    /// Fulfil the cell. Consumes the sender so a job resolves at most once.
    pub(crate) fn fulfil(self, outcome: JobOutcome<S>) {
        // The caller may have dropped its handle already.
        let _ = self.sender.try_send(Ok(outcome));
    }

    /// Resolve the cell with a worker failure instead of an outcome.
    pub(crate) fn fail(self, failure: WorkerFailure) {
        let _ = self.sender.try_send(Err(failure));
    }
}

/// Create a linked sender/handle pair for a job.
pub(crate) fn result_cell<S>(job: u64) -> (ResultSender<S>, ResultHandle<S>) {
    let (sender, receiver) = bounded(1);
    (
        ResultSender { job, sender },
        ResultHandle {
            job,
            receiver: Mutex::new(receiver),
            outcome: OnceLock::new(),
        },
    )
}

/// Caller's handle to a job's eventual result.
///
/// The first successful read caches the outcome; every later read returns the
/// same value. If the job is superseded by another `process` call its sender
/// is dropped and reads fail with [`ProcessError::Abandoned`]. A job hit by
/// a panicking expand callback fails with [`ProcessError::WorkerPanicked`].
pub struct ResultHandle<S> {
    job: u64,
    receiver: Mutex<Receiver<Resolution<S>>>,
    outcome: OnceLock<Resolution<S>>,
}

impl<S> ResultHandle<S> {
    pub fn job_id(&self) -> u64 {
        self.job
    }

    fn read<'a>(&self, resolution: &'a Resolution<S>) -> Result<&'a JobOutcome<S>> {
        resolution.as_ref().map_err(|failure| ProcessError::WorkerPanicked {
            job: self.job,
            worker: failure.worker,
            message: failure.message.clone(),
        })
    }

    /// Block until the job completes.
    pub fn wait(&self) -> Result<&JobOutcome<S>> {
        if let Some(resolution) = self.outcome.get() {
            return self.read(resolution);
        }
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(resolution) = self.outcome.get() {
            return self.read(resolution);
        }
        match receiver.recv() {
            Ok(resolution) => self.read(self.outcome.get_or_init(|| resolution)),
            Err(_) => Err(ProcessError::Abandoned { job: self.job }),
        }
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<&JobOutcome<S>> {
        if let Some(resolution) = self.outcome.get() {
            return self.read(resolution);
        }
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(resolution) = self.outcome.get() {
            return self.read(resolution);
        }
        match receiver.recv_timeout(timeout) {
            Ok(resolution) => self.read(self.outcome.get_or_init(|| resolution)),
            Err(RecvTimeoutError::Timeout) => Err(ProcessError::Timeout {
                job: self.job,
                waited: timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ProcessError::Abandoned { job: self.job }),
        }
    }

    /// Poll without blocking. `Ok(None)` means the job is still running.
    pub fn try_get(&self) -> Result<Option<&JobOutcome<S>>> {
        if let Some(resolution) = self.outcome.get() {
            return self.read(resolution).map(Some);
        }
        let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(resolution) = self.outcome.get() {
            return self.read(resolution).map(Some);
        }
        match receiver.try_recv() {
            Ok(resolution) => self.read(self.outcome.get_or_init(|| resolution)).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ProcessError::Abandoned { job: self.job }),
        }
    }

    /// True once an outcome is available to read.
    pub fn is_ready(&self) -> bool {
        matches!(self.try_get(), Ok(Some(_)))
    }

    /// Block until completion and take ownership of the outcome.
    pub fn into_outcome(self) -> Result<JobOutcome<S>> {
        self.wait()?;
        let job = self.job;
        match self.outcome.into_inner() {
            Some(Ok(outcome)) => Ok(outcome),
            _ => Err(ProcessError::Abandoned { job }),
        }
    }
}

impl<S> fmt::Debug for ResultHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("job", &self.job)
            .field("resolved", &self.outcome.get().is_some_and(|r| r.is_ok()))
            .finish()
    }
}

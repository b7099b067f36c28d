//! State shared between the manager and its workers.
//!
//! All queues and the request map live behind one lock. The lock is only held
//! for the duration of a push, a request, or one coordination pass; expansion
//! and solution mapping always run outside it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{debug, error, trace};

use crate::process::config::ProcessConfig;
use crate::process::item::{CostQueue, WorkItem};
use crate::process::job::{
    JobOutcome, JobRequest, ResultHandle, ResultSender, Termination, WorkerFailure, result_cell,
};

/// Batch handed to a worker in answer to its standing request.
pub(crate) struct Delivery<D, P> {
    pub(crate) items: Vec<D>,
    pub(crate) parameter: Option<Arc<P>>,
    pub(crate) generation: u64,
}

struct Job<S> {
    result: ResultSender<S>,
    minimal_solutions: usize,
    max_duration: std::time::Duration,
    started: Instant,
}

pub(crate) struct HubState<D, P, S> {
    pending: CostQueue<D>,
    solutions: CostQueue<D>,
    requests: BTreeMap<usize, Sender<Delivery<D, P>>>,
    not_working: BTreeSet<usize>,
    parameter: Option<Arc<P>>,
    /// `Some` while a job is running.
    job: Option<Job<S>>,
    /// Set once an expand callback panicked; every later job fails immediately.
    failure: Option<WorkerFailure>,
}

/// A job that hit a termination condition, taken out of the hub so its
/// solutions can be mapped without holding the lock.
pub(crate) struct Completion<D, S> {
    result: ResultSender<S>,
    solutions: Vec<D>,
    termination: Termination,
    started: Instant,
    expansions: u64,
}

impl<D, S> Completion<D, S> {
    pub(crate) fn termination(&self) -> Termination {
        self.termination
    }

    /// Map solutions in ascending cost order and fulfil the job's result cell.
    pub(crate) fn finish<F>(self, map_solution: F) -> usize
    where
        F: FnMut(D) -> S,
    {
        let job = self.result.job();
        let solutions: Vec<S> = self.solutions.into_iter().map(map_solution).collect();
        let count = solutions.len();
        self.result.fulfil(JobOutcome {
            job,
            solutions,
            termination: self.termination,
            elapsed: self.started.elapsed(),
            expansions: self.expansions,
        });
        count
    }
}

pub(crate) struct Hub<D, P, S> {
    config: ProcessConfig,
    state: Mutex<HubState<D, P, S>>,
    /// Per-worker cancel flags, raised by the manager and cleared by the worker after flushing.
    cancel: Vec<AtomicBool>,
    generation: AtomicU64,
    expansions: AtomicU64,
    shutdown: AtomicBool,
}

impl<D, P, S> Hub<D, P, S> {
    fn lock(&self) -> MutexGuard<'_, HubState<D, P, S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.cancel.len()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().job.is_some()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self, worker_id: usize) -> bool {
        self.cancel[worker_id].load(Ordering::SeqCst)
    }

    /// Clear a worker's cancel flag after it flushed for `generation`.
    ///
    /// Returns false, leaving the flag raised, if a job started after the
    /// worker read `generation`; the worker must flush again.
    pub(crate) fn acknowledge_cancel(&self, worker_id: usize, generation: u64) -> bool {
        let _state = self.lock();
        if generation != self.generation() {
            return false;
        }
        self.cancel[worker_id].store(false, Ordering::SeqCst);
        true
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.lock().failure.is_some()
    }

    fn any_cancelling(&self) -> bool {
        self.cancel.iter().any(|flag| flag.load(Ordering::SeqCst))
    }

    /// Count one expansion if it was made for the current job.
    pub(crate) fn record_expansion(&self, generation: u64) {
        if generation == self.generation() {
            self.expansions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<D: WorkItem, P, S> Hub<D, P, S> {
    pub(crate) fn new(config: ProcessConfig) -> Self {
        let cancel = (0..config.num_workers).map(|_| AtomicBool::new(false)).collect();
        Self {
            config,
            state: Mutex::new(HubState {
                pending: CostQueue::new(),
                solutions: CostQueue::new(),
                requests: BTreeMap::new(),
                not_working: BTreeSet::new(),
                parameter: None,
                job: None,
                failure: None,
            }),
            cancel,
            generation: AtomicU64::new(0),
            expansions: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Flush both shared queues and tell every worker to drop its local work.
    fn reset(&self, state: &mut HubState<D, P, S>) {
        state.pending.clear();
        state.solutions.clear();
        for flag in &self.cancel {
            flag.store(true, Ordering::SeqCst);
        }
    }

    /// Start a new job, abandoning whichever job was running.
    pub(crate) fn begin_job(&self, request: JobRequest<D, P>) -> ResultHandle<S> {
        let mut state = self.lock();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = state.job.take() {
            debug!(job = previous.result.job(), "superseding running job");
        }
        self.reset(&mut state);

        let (result, handle) = result_cell(generation);
        if let Some(failure) = &state.failure {
            debug!(job = generation, worker = failure.worker, "refusing job after worker failure");
            result.fail(failure.clone());
            return handle;
        }
        debug!(
            job = generation,
            seeds = request.seeds.len(),
            minimal_solutions = request.minimal_solutions,
            max_duration = ?request.max_duration,
            "starting job"
        );
        state.pending.extend(request.seeds);
        state.parameter = request.parameter;
        state.job = Some(Job {
            result,
            minimal_solutions: request.minimal_solutions,
            max_duration: request.max_duration,
            started: Instant::now(),
        });
        self.expansions.store(0, Ordering::SeqCst);
        handle
    }

    /// Register a worker's standing request for more work.
    pub(crate) fn request_data(&self, worker_id: usize) -> Receiver<Delivery<D, P>> {
        let (sender, receiver) = bounded(1);
        self.lock().requests.insert(worker_id, sender);
        receiver
    }

    /// Hand a worker's backlog to the manager.
    ///
    /// Returns false (dropping the items) if the worker is being cancelled or is
    /// still working for a superseded job. `local_empty` marks the worker as not
    /// working unless its standing request was already answered.
    pub(crate) fn push_data(
        &self,
        worker_id: usize,
        generation: u64,
        pending: Vec<D>,
        solutions: Vec<D>,
        local_empty: bool,
    ) -> bool {
        let mut state = self.lock();
        if state.job.is_none() || self.is_cancelled(worker_id) || generation != self.generation() {
            return false;
        }
        trace!(
            worker = worker_id,
            pending = pending.len(),
            solutions = solutions.len(),
            "worker sync"
        );
        state.pending.extend(pending);
        state.solutions.extend(solutions);
        if local_empty && state.requests.contains_key(&worker_id) {
            state.not_working.insert(worker_id);
        } else {
            state.not_working.remove(&worker_id);
        }
        true
    }

    /// Record a panic in `worker_id`'s expand callback.
    ///
    /// The running job fails at once, and so does every job started later.
    pub(crate) fn fail(&self, worker_id: usize, message: String) {
        let mut state = self.lock();
        let failure = state.failure.get_or_insert_with(|| WorkerFailure {
            worker: worker_id,
            message,
        });
        let failure = failure.clone();
        if let Some(job) = state.job.take() {
            error!(
                job = job.result.job(),
                worker = failure.worker,
                message = %failure.message,
                "job failed"
            );
            job.result.fail(failure);
        }
        self.reset(&mut state);
    }

    /// One pass of the coordination loop: check termination, then feed requesters.
    pub(crate) fn coordinate(&self) -> Option<Completion<D, S>> {
        let mut state = self.lock();
        let completion = self.may_complete_result(&mut state);
        if completion.is_none() {
            self.may_complete_requests(&mut state);
        }
        completion
    }

    fn may_complete_result(&self, state: &mut HubState<D, P, S>) -> Option<Completion<D, S>> {
        let job = state.job.as_ref()?;
        let termination = if state.solutions.len() >= job.minimal_solutions {
            Termination::SolutionTarget
        } else if job.started.elapsed() >= job.max_duration {
            Termination::Timeout
        } else if state.not_working.len() >= self.num_workers() && state.pending.is_empty() {
            Termination::Exhausted
        } else {
            return None;
        };

        let job = state.job.take()?;
        let solutions: Vec<D> = state
            .solutions
            .drain_ascending()
            .take(job.minimal_solutions)
            .collect();
        self.reset(state);
        debug!(
            job = job.result.job(),
            %termination,
            solutions = solutions.len(),
            "job complete"
        );
        Some(Completion {
            result: job.result,
            solutions,
            termination,
            started: job.started,
            expansions: self.expansions.load(Ordering::SeqCst),
        })
    }

    fn may_complete_requests(&self, state: &mut HubState<D, P, S>) {
        if self.any_cancelling() || state.requests.is_empty() || state.pending.is_empty() {
            return;
        }

        let requesters: Vec<usize> = state.requests.keys().copied().collect();
        let mut shares: Vec<Vec<D>> = requesters.iter().map(|_| Vec::new()).collect();
        for (i, item) in state.pending.drain_ascending().enumerate() {
            shares[i % requesters.len()].push(item);
        }

        let generation = self.generation();
        for (worker_id, items) in requesters.into_iter().zip(shares) {
            if items.is_empty() {
                continue;
            }
            let Some(sender) = state.requests.remove(&worker_id) else {
                continue;
            };
            trace!(worker = worker_id, items = items.len(), "fulfilling request");
            let delivery = Delivery {
                items,
                parameter: state.parameter.clone(),
                generation,
            };
            match sender.try_send(delivery) {
                Ok(()) => {
                    state.not_working.remove(&worker_id);
                }
                Err(TrySendError::Full(delivery) | TrySendError::Disconnected(delivery)) => {
                    state.pending.extend(delivery.items);
                }
            }
        }
    }
}

#[cfg(test)]
impl<D: WorkItem, P, S> Hub<D, P, S> {
    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn solutions_len(&self) -> usize {
        self.lock().solutions.len()
    }

    pub(crate) fn is_not_working(&self, worker_id: usize) -> bool {
        self.lock().not_working.contains(&worker_id)
    }

    pub(crate) fn has_request(&self, worker_id: usize) -> bool {
        self.lock().requests.contains_key(&worker_id)
    }
}

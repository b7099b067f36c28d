//! Process manager: owns the worker pool and the coordination thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, error};

use crate::error::{ProcessError, Result};
use crate::process::config::ProcessConfig;
use crate::process::hub::Hub;
use crate::process::item::WorkItem;
use crate::process::job::{JobRequest, ResultHandle};
use crate::process::worker::{ExpandFn, Worker};

/// Caller-supplied mapping from an accepted item to the value returned in a job's result.
pub type MapSolutionFn<D, S> = dyn Fn(D) -> S + Send;

/// Wake-up sent to the coordination thread when a job starts.
enum Signal {
    Started,
}

/// Multi-worker best-first expansion scheduler.
///
/// Worker threads and the coordination thread are started once and live
/// until the manager is dropped. Only one job runs at a time; each call to
/// [`process`](Self::process) supersedes the previous one.
pub struct ProcessManager<D, P, S> {
    hub: Arc<Hub<D, P, S>>,
    signals: Option<Sender<Signal>>,
    coordinator: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl<D, P, S> ProcessManager<D, P, S>
where
    D: WorkItem + Send + 'static,
    P: Send + Sync + 'static,
    S: Send + 'static,
{
    /// Validate `config` and spawn the worker pool and coordination thread.
    pub fn new<E, M>(config: ProcessConfig, expand: E, map_solution: M) -> Result<Self>
    where
        E: Fn(&D, Option<&P>) -> Vec<D> + Send + Sync + 'static,
        M: Fn(D) -> S + Send + 'static,
    {
        config.validate()?;
        debug!(
            workers = config.num_workers,
            sync_period = ?config.effective_sync_period(),
            "starting process manager"
        );

        let hub = Arc::new(Hub::new(config));
        let expand: Arc<ExpandFn<D, P>> = Arc::new(expand);
        let (signals, signal_rx) = unbounded();

        let mut manager = Self {
            hub: Arc::clone(&hub),
            signals: Some(signals),
            coordinator: None,
            workers: Vec::with_capacity(hub.num_workers()),
        };

        // On a spawn failure `manager` is dropped here, which stops and joins
        // whatever threads were already started.
        for worker_id in 0..hub.num_workers() {
            let worker = Worker::new(worker_id, Arc::clone(&hub), Arc::clone(&expand));
            let handle = spawn(format!("process-worker-{worker_id}"), move || worker.run())?;
            manager.workers.push(handle);
        }

        let map_solution: Box<MapSolutionFn<D, S>> = Box::new(map_solution);
        let coordinator_hub = Arc::clone(&hub);
        manager.coordinator = Some(spawn("process-manager".to_string(), move || {
            coordinate(coordinator_hub, signal_rx, map_solution)
        })?);

        Ok(manager)
    }

    /// Start a job, abandoning any job still in flight.
    ///
    /// Handles returned by earlier calls will fail with
    /// [`ProcessError::Abandoned`] unless their job already completed.
    pub fn process(&self, request: JobRequest<D, P>) -> ResultHandle<S> {
        let handle = self.hub.begin_job(request);
        if let Some(signals) = &self.signals {
            let _ = signals.send(Signal::Started);
        }
        handle
    }

    pub fn is_running(&self) -> bool {
        self.hub.is_running()
    }

    /// True once an expand callback panicked. Every job then fails with
    /// [`ProcessError::WorkerPanicked`].
    pub fn is_failed(&self) -> bool {
        self.hub.is_failed()
    }

    pub fn num_workers(&self) -> usize {
        self.hub.num_workers()
    }

    pub fn config(&self) -> &ProcessConfig {
        self.hub.config()
    }
}

impl<D, P, S> Drop for ProcessManager<D, P, S> {
    fn drop(&mut self) {
        self.hub.signal_shutdown();
        // Closing the channel stops the coordination thread.
        self.signals.take();

        if let Some(coordinator) = self.coordinator.take()
            && coordinator.join().is_err()
        {
            error!("coordination thread panicked");
        }
        for (worker_id, worker) in self.workers.drain(..).enumerate() {
            if worker.join().is_err() {
                error!(worker = worker_id, "worker thread panicked");
            }
        }
        debug!("process manager stopped");
    }
}

fn spawn<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(body)
        .map_err(|source| ProcessError::Spawn { name, source })
}

/// Coordination loop: runs one pass per sync period, or immediately after a job starts.
fn coordinate<D: WorkItem, P, S>(
    hub: Arc<Hub<D, P, S>>,
    signals: Receiver<Signal>,
    map_solution: Box<MapSolutionFn<D, S>>,
) {
    let period = hub.config().effective_sync_period();
    loop {
        match signals.recv_timeout(period) {
            Ok(Signal::Started) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if hub.is_shutdown() {
            break;
        }
        if let Some(completion) = hub.coordinate() {
            let termination = completion.termination();
            let delivered = completion.finish(&*map_solution);
            debug!(%termination, solutions = delivered, "result delivered");
        }
    }
}

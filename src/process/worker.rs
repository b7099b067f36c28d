//! Worker loop: expand the cheapest local item, exchange backlog with the manager.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tracing::{debug, error, trace};

use crate::process::hub::{Delivery, Hub};
use crate::process::item::{CostQueue, WorkItem};

/// Caller-supplied expansion callback.
pub type ExpandFn<D, P> = dyn Fn(&D, Option<&P>) -> Vec<D> + Send + Sync;

pub(crate) struct Worker<D, P, S> {
    id: usize,
    hub: Arc<Hub<D, P, S>>,
    expand: Arc<ExpandFn<D, P>>,
    pending: CostQueue<D>,
    solutions: CostQueue<D>,
    request: Option<Receiver<Delivery<D, P>>>,
    parameter: Option<Arc<P>>,
    generation: u64,
    next_sync: Instant,
}

impl<D: WorkItem, P, S> Worker<D, P, S> {
    pub(crate) fn new(id: usize, hub: Arc<Hub<D, P, S>>, expand: Arc<ExpandFn<D, P>>) -> Self {
        let config = hub.config();
        let next_sync = Instant::now() + config.effective_sync_period() + config.sync_offset(id);
        let generation = hub.generation();
        Self {
            id,
            hub,
            expand,
            pending: CostQueue::new(),
            solutions: CostQueue::new(),
            request: None,
            parameter: None,
            generation,
            next_sync,
        }
    }

    /// Run until the manager shuts down or the expand callback panics.
    ///
    /// A panic fails the hub, so the running job and every later one resolve
    /// with an error instead of waiting on a worker that is gone.
    pub(crate) fn run(mut self) {
        debug!(worker = self.id, "worker started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            while !self.hub.is_shutdown() {
                self.step(Instant::now());
            }
        }));
        if let Err(payload) = outcome {
            let message = panic_message(payload.as_ref());
            error!(worker = self.id, %message, "expand callback panicked");
            self.hub.fail(self.id, message);
            return;
        }
        debug!(worker = self.id, "worker stopped");
    }

    /// One iteration of the loop.
    pub(crate) fn step(&mut self, now: Instant) {
        self.may_clear();
        self.may_request();
        self.may_push(now);
        self.may_absorb();
        if !self.expand_next() {
            self.idle_wait();
        }
    }

    fn may_clear(&mut self) {
        if !self.hub.is_cancelled(self.id) {
            return;
        }
        let generation = self.hub.generation();
        // Consume an answered request first so it is not left dangling.
        self.may_absorb();
        self.pending.clear();
        self.solutions.clear();
        self.generation = generation;
        // A job started since `generation` was read keeps the flag raised,
        // and the next step flushes again.
        if self.hub.acknowledge_cancel(self.id, generation) {
            trace!(worker = self.id, job = generation, "local queues flushed");
        }
    }

    fn may_request(&mut self) {
        if self.request.is_none() {
            self.request = Some(self.hub.request_data(self.id));
        }
    }

    fn may_push(&mut self, now: Instant) {
        if now < self.next_sync {
            return;
        }
        self.next_sync = now + self.hub.config().effective_sync_period();

        let config = self.hub.config();
        let pending = self.pending.take_share(config.pending_share);
        let solutions = self.solutions.take_share(config.solution_share);
        let local_empty = self.pending.is_empty();
        self.hub
            .push_data(self.id, self.generation, pending, solutions, local_empty);
    }

    fn may_absorb(&mut self) {
        let Some(request) = &self.request else {
            return;
        };
        match request.try_recv() {
            Ok(delivery) => self.absorb(delivery),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.request = None,
        }
    }

    fn absorb(&mut self, delivery: Delivery<D, P>) {
        trace!(worker = self.id, items = delivery.items.len(), "absorbing delivery");
        self.pending.extend(delivery.items);
        self.parameter = delivery.parameter;
        self.generation = delivery.generation;
        self.request = None;
    }

    /// Expand the cheapest local item. Returns false if there was nothing to expand.
    fn expand_next(&mut self) -> bool {
        let Some(item) = self.pending.pop() else {
            return false;
        };
        let children = (self.expand)(&item, self.parameter.as_deref());
        self.hub.record_expansion(self.generation);
        for child in children {
            if child.is_solution() {
                self.solutions.push(child);
            } else {
                self.pending.push(child);
            }
        }
        true
    }

    /// Block briefly on the standing request instead of spinning.
    fn idle_wait(&mut self) {
        let idle_wait = self.hub.config().idle_wait;
        let Some(request) = &self.request else {
            std::thread::sleep(idle_wait);
            return;
        };
        match request.recv_timeout(idle_wait) {
            Ok(delivery) => self.absorb(delivery),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.request = None,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
impl<D: WorkItem, P, S> Worker<D, P, S> {
    pub(crate) fn local_pending(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn local_solutions(&self) -> usize {
        self.solutions.len()
    }
}

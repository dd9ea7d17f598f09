//! Bounded-concurrency scheduler for conversion work.
//!
//! Units of work are closures producing an [`Outcome`]. The queue runs at
//! most `concurrency` of them at a time on the tokio runtime, keeps the
//! terminate handle of every cancellable unit in flight, and fires the
//! completion callback when nothing is running or waiting.

mod types;

pub use types::{CompletionCallback, Outcome, UnitOfWork};

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::converter::TerminateFn;
use crate::metrics;

struct QueueState {
    concurrency: usize,
    running: usize,
    backlog: VecDeque<UnitOfWork>,
    cancelled: bool,
    terminators: HashMap<u64, TerminateFn>,
    next_id: u64,
    /// Bumped by `reset`, so settlements from a previous batch are ignored.
    generation: u64,
    on_complete: Option<CompletionCallback>,
    /// Set once the completion callback fired for the current run of work.
    completion_fired: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.running == 0 && self.backlog.is_empty()
    }
}

/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct ConversionQueue {
    state: Arc<Mutex<QueueState>>,
}

impl ConversionQueue {
    /// A concurrency of zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                concurrency: concurrency.max(1),
                running: 0,
                backlog: VecDeque::new(),
                cancelled: false,
                terminators: HashMap::new(),
                next_id: 1,
                generation: 0,
                on_complete: None,
                completion_fired: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a unit and dispatches if a slot is free. Ignored once cancelled.
    ///
    /// Must be called inside a tokio runtime.
    pub fn push(&self, unit: UnitOfWork) {
        self.push_batch(std::iter::once(unit));
    }

    /// Enqueues several units under one lock, then dispatches.
    pub fn push_batch<I>(&self, units: I)
    where
        I: IntoIterator<Item = UnitOfWork>,
    {
        {
            let mut state = self.state();
            if state.cancelled {
                debug!("Queue cancelled, dropping pushed work");
                return;
            }
            let before = state.backlog.len();
            state.backlog.extend(units);
            if state.backlog.len() > before {
                state.completion_fired = false;
            }
        }
        self.dispatch();
    }

    /// Registers the callback fired each time the queue drains.
    pub fn on_all_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.state().on_complete = Some(Arc::new(callback));
    }

    /// Stops dispatching for good, drops the backlog and terminates every
    /// in-flight cancellable unit. Idempotent.
    pub fn cancel(&self) {
        let (discarded, terminators) = {
            let mut state = self.state();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            let discarded = state.backlog.len();
            state.backlog.clear();
            let terminators: Vec<_> = state.terminators.drain().collect();
            (discarded, terminators)
        };

        let mut signalled = 0;
        for (id, terminate) in terminators {
            match catch_unwind(AssertUnwindSafe(terminate)) {
                Ok(Ok(())) => signalled += 1,
                Ok(Err(e)) => warn!(unit = id, error = %e, "Failed to terminate unit"),
                Err(_) => warn!(unit = id, "Terminate handle panicked"),
            }
        }

        metrics::CANCELLATIONS.inc();
        info!(discarded, signalled, "Queue cancelled");
    }

    /// Clears cancellation and bookkeeping so the queue can run a new batch.
    pub fn reset(&self) {
        let mut state = self.state();
        state.cancelled = false;
        state.running = 0;
        state.backlog.clear();
        state.terminators.clear();
        state.generation += 1;
        state.completion_fired = false;
    }

    /// Changes the concurrency for work dispatched from now on.
    pub fn set_concurrency(&self, concurrency: usize) {
        self.state().concurrency = concurrency.max(1);
    }

    pub fn concurrency(&self) -> usize {
        self.state().concurrency
    }

    pub fn running(&self) -> usize {
        self.state().running
    }

    pub fn pending(&self) -> usize {
        self.state().backlog.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    fn dispatch(&self) {
        loop {
            let (id, generation, unit) = {
                let mut state = self.state();
                if state.cancelled || state.running >= state.concurrency {
                    return;
                }
                let Some(unit) = state.backlog.pop_front() else {
                    return;
                };
                state.running += 1;
                let id = state.next_id;
                state.next_id += 1;
                (id, state.generation, unit)
            };

            // Units run outside the lock so they may push more work.
            let future = match unit() {
                Outcome::Plain(future) => future,
                Outcome::Cancellable { outcome, terminate } => {
                    let mut state = self.state();
                    if state.cancelled {
                        drop(state);
                        if let Err(e) = terminate() {
                            warn!(unit = id, error = %e, "Failed to terminate unit");
                        }
                    } else {
                        state.terminators.insert(id, terminate);
                    }
                    outcome
                }
            };

            let queue = self.clone();
            tokio::spawn(async move {
                future.await;
                queue.settle(id, generation);
            });
        }
    }

    fn settle(&self, id: u64, generation: u64) {
        let cancelled = {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.running = state.running.saturating_sub(1);
            state.terminators.remove(&id);
            state.cancelled
        };

        if !cancelled {
            self.dispatch();
        }

        let callback = {
            let mut state = self.state();
            if state.generation != generation || !state.is_idle() || state.completion_fired {
                return;
            }
            state.completion_fired = true;
            state.on_complete.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

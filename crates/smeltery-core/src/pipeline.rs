//! Off-thread furnace stepping.
//!
//! The tick thread submits snapshots; a fixed rayon pool runs the
//! [`Simulator`] on them and pushes results onto an MPSC queue; the tick
//! thread drains the queue and applies results itself. Live furnace state
//! is therefore only ever written from the tick thread.
//!
//! A furnace has at most one computation in flight. The in-flight set is
//! owned by the tick thread: it gains an id on submit and loses it when the
//! id's result is drained, whatever the outcome.

use crate::furnace::FurnaceSnapshot;
use crate::id::FurnaceId;
use crate::stepper::{ComputedDelta, Simulator, StepError};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Worker pool parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub worker_threads: usize,
    /// Wait bound used when the pipeline is dropped without an explicit
    /// shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of [`AsyncOffloadPipeline::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    /// A computation for this furnace has not been drained yet.
    AlreadyInFlight,
    ShuttingDown,
}

/// Why a worker produced no delta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerFailure {
    #[error(transparent)]
    Step(#[from] StepError),
    #[error("simulator panicked: {0}")]
    Panicked(String),
    #[error("cancelled by shutdown")]
    Cancelled,
}

/// Counts from one [`AsyncOffloadPipeline::drain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: usize,
    pub failed: usize,
}

type WorkResult = (FurnaceId, Result<ComputedDelta, WorkerFailure>);

/// Run one step, turning a panic into a [`WorkerFailure`].
pub fn run_guarded(simulator: &dyn Simulator, snapshot: &FurnaceSnapshot) -> Result<ComputedDelta, WorkerFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| simulator.step(snapshot))) {
        Ok(result) => result.map_err(WorkerFailure::from),
        Err(payload) => Err(WorkerFailure::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Outstanding work counter
// ---------------------------------------------------------------------------

/// Jobs spawned but not yet finished. Lets shutdown wait with a bound.
#[derive(Debug, Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn begin(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn end(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let (count, _) = self
            .idle
            .wait_timeout_while(count, timeout, |c| *c > 0)
            .unwrap_or_else(PoisonError::into_inner);
        *count == 0
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Worker pool plus result queue. Owned by the tick thread.
pub struct AsyncOffloadPipeline {
    simulator: Arc<dyn Simulator>,
    pool: Option<rayon::ThreadPool>,
    sender: Sender<WorkResult>,
    receiver: Receiver<WorkResult>,
    in_flight: HashSet<FurnaceId>,
    outstanding: Arc<Outstanding>,
    cancelled: Arc<AtomicBool>,
    config: PipelineConfig,
}

impl std::fmt::Debug for AsyncOffloadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOffloadPipeline")
            .field("running", &self.is_running())
            .field("in_flight", &self.in_flight.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AsyncOffloadPipeline {
    pub fn new(simulator: Arc<dyn Simulator>, config: PipelineConfig) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|i| format!("smeltery-worker-{i}"))
            .build()?;
        let (sender, receiver) = mpsc::channel();
        tracing::debug!(workers = config.worker_threads, "offload pipeline started");
        Ok(Self {
            simulator,
            pool: Some(pool),
            sender,
            receiver,
            in_flight: HashSet::new(),
            outstanding: Arc::new(Outstanding::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queue a snapshot for computation.
    pub fn submit(&mut self, snapshot: FurnaceSnapshot) -> Submission {
        let Some(pool) = self.pool.as_ref() else {
            return Submission::ShuttingDown;
        };
        if self.cancelled.load(Ordering::Acquire) {
            return Submission::ShuttingDown;
        }
        let id = snapshot.id;
        if !self.in_flight.insert(id) {
            return Submission::AlreadyInFlight;
        }

        let simulator = Arc::clone(&self.simulator);
        let sender = self.sender.clone();
        let outstanding = Arc::clone(&self.outstanding);
        let cancelled = Arc::clone(&self.cancelled);
        outstanding.begin();
        pool.spawn(move || {
            let result = if cancelled.load(Ordering::Acquire) {
                Err(WorkerFailure::Cancelled)
            } else {
                run_guarded(simulator.as_ref(), &snapshot)
            };
            // The receiver is gone only after shutdown; the result is moot.
            let _ = sender.send((id, result));
            outstanding.end();
        });
        Submission::Accepted
    }

    /// Apply up to `max` queued results on the calling thread.
    ///
    /// Results for furnaces no longer tracked as in flight are dropped.
    /// Failed computations are logged and leave the furnace untouched.
    pub fn drain<F>(&mut self, max: usize, mut apply: F) -> DrainReport
    where
        F: FnMut(FurnaceId, ComputedDelta),
    {
        let mut report = DrainReport::default();
        if self.cancelled.load(Ordering::Acquire) {
            return report;
        }
        while report.applied + report.failed < max {
            let Ok((id, result)) = self.receiver.try_recv() else {
                break;
            };
            if !self.in_flight.remove(&id) {
                continue;
            }
            match result {
                Ok(delta) => {
                    apply(id, delta);
                    report.applied += 1;
                }
                Err(failure) => {
                    tracing::warn!(furnace = ?id, %failure, "furnace step failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, id: FurnaceId) -> bool {
        self.in_flight.contains(&id)
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some() && !self.cancelled.load(Ordering::Acquire)
    }

    /// Block until every spawned job has posted its result, or `timeout`
    /// passes. Returns true if idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.outstanding.wait_idle(timeout)
    }

    /// Stop accepting work, wait up to `timeout` for running jobs, then
    /// discard everything still queued. Jobs that have not started yet are
    /// cancelled. Returns true if all jobs finished within the bound.
    ///
    /// Idempotent.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(pool) = self.pool.take() else {
            return true;
        };
        self.cancelled.store(true, Ordering::Release);
        let clean = self.outstanding.wait_idle(timeout);
        // Dropping the pool lets its threads exit once their current job
        // returns; it does not block.
        drop(pool);

        let discarded = self.receiver.try_iter().count();
        let abandoned = self.in_flight.len();
        self.in_flight.clear();
        if clean {
            tracing::info!(discarded, "offload pipeline stopped");
        } else {
            tracing::warn!(
                discarded,
                abandoned,
                timeout_ms = timeout.as_millis() as u64,
                "offload pipeline stopped with jobs still running"
            );
        }
        clean
    }
}

impl Drop for AsyncOffloadPipeline {
    fn drop(&mut self) {
        let timeout = self.config.shutdown_timeout;
        self.shutdown(timeout);
    }
}

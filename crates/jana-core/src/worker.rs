//! Thread body: request assignment, fire, measure, report (§4.6).

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use jana_types::NumaLocation;
use parking_lot::Mutex;

use crate::arrow::FireOutcome;
use crate::constants::IDLE_BACKOFF;
use crate::error::EngineError;
use crate::policy::{FailureDecision, FailurePolicy};
use crate::scheduler::{FireResult, Scheduler};
use crate::topology::{ArrowId, Topology};

/// Timing accumulators a worker reports, in nanoseconds.
#[derive(Default)]
pub struct WorkerStats {
    pub useful_nanos: AtomicU64,
    pub retry_nanos: AtomicU64,
    pub idle_nanos: AtomicU64,
    pub scheduler_nanos: AtomicU64,
    pub events_fired: AtomicU64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            useful_nanos: self.useful_nanos.load(Ordering::Relaxed),
            retry_nanos: self.retry_nanos.load(Ordering::Relaxed),
            idle_nanos: self.idle_nanos.load(Ordering::Relaxed),
            scheduler_nanos: self.scheduler_nanos.load(Ordering::Relaxed),
            events_fired: self.events_fired.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerStatsSnapshot {
    pub useful_nanos: u64,
    pub retry_nanos: u64,
    pub idle_nanos: u64,
    pub scheduler_nanos: u64,
    pub events_fired: u64,
}

/// State shared by every worker and owned by the `ProcessingController`.
pub struct SharedControl {
    pub stop: AtomicBool,
    pub paused: AtomicBool,
    pub policy: Box<dyn FailurePolicy>,
    pub exceptions: Mutex<Vec<String>>,
    pub exit_code: AtomicI32,
    topology: Arc<Topology>,
}

impl SharedControl {
    pub fn new(policy: Box<dyn FailurePolicy>, topology: Arc<Topology>) -> Self {
        Self {
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            policy,
            exceptions: Mutex::new(Vec::new()),
            exit_code: AtomicI32::new(0),
            topology,
        }
    }

    /// Transitions the topology to Draining (§5): sources stop emitting
    /// immediately; already-queued events keep flowing to completion as
    /// workers keep firing downstream arrows until the topology drains on
    /// its own. Idempotent and safe to call from any thread, including a
    /// signal handler or a `FailurePolicy` decision made on a worker thread.
    pub fn request_stop(&self) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            self.topology.drain_sources();
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn record_failure(&self, error: EngineError) -> FailureDecision {
        let decision = self.policy.decide(&error);
        if self.exit_code.load(Ordering::Relaxed) == 0 {
            self.exit_code.store(1, Ordering::Relaxed);
        }
        self.exceptions.lock().push(error.to_string());
        tracing::error!(error = %error, ?decision, "arrow fire failed");
        if decision == FailureDecision::Stop {
            self.request_stop();
        }
        decision
    }
}

pub struct Worker {
    pub id: usize,
    pub stats: Arc<WorkerStats>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        id: usize,
        topology: Arc<Topology>,
        scheduler: Arc<dyn Scheduler>,
        control: Arc<SharedControl>,
        location: NumaLocation,
        pin: Option<core_affinity::CoreId>,
    ) -> Self {
        let stats = Arc::new(WorkerStats::default());
        let stats_thread = stats.clone();
        let handle = std::thread::Builder::new()
            .name(format!("jana-worker-{id}"))
            .spawn(move || {
                if let Some(core) = pin {
                    core_affinity::set_for_current(core);
                }
                run_loop(id, topology, scheduler, control, location, stats_thread);
            })
            .expect("failed to spawn worker thread");
        Self {
            id,
            stats,
            handle: Some(handle),
        }
    }

    pub fn join(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

fn run_loop(
    id: usize,
    topology: Arc<Topology>,
    scheduler: Arc<dyn Scheduler>,
    control: Arc<SharedControl>,
    location: NumaLocation,
    stats: Arc<WorkerStats>,
) {
    let mut prior: Option<ArrowId> = None;
    let mut last_result: Option<FireResult> = None;

    loop {
        // A stop request overrides a pause so draining can proceed; it does
        // not itself end the loop here (§5: sources stop emitting, but
        // queues already populated keep draining to completion).
        while control.paused.load(Ordering::Acquire) && !control.is_stopping() {
            std::thread::sleep(IDLE_BACKOFF);
        }
        if topology.is_finished() {
            break;
        }

        let t0 = Instant::now();
        let assignment = scheduler.next_assignment(&topology, id, prior, last_result);
        stats
            .scheduler_nanos
            .fetch_add(t0.elapsed().as_nanos() as u64, Ordering::Relaxed);

        match assignment {
            None => {
                prior = None;
                last_result = None;
                std::thread::sleep(IDLE_BACKOFF);
                stats
                    .idle_nanos
                    .fetch_add(IDLE_BACKOFF.as_nanos() as u64, Ordering::Relaxed);
            }
            Some(arrow_id) => {
                let t1 = Instant::now();
                let outcome = topology.fire(arrow_id, location);
                let elapsed = t1.elapsed().as_nanos() as u64;

                match outcome {
                    Ok(FireOutcome::Success) => {
                        stats.useful_nanos.fetch_add(elapsed, Ordering::Relaxed);
                        stats.events_fired.fetch_add(1, Ordering::Relaxed);
                        scheduler.on_release(&topology, id, arrow_id);
                        prior = Some(arrow_id);
                        last_result = Some(FireResult::KeepGoing);
                    }
                    Ok(FireOutcome::ComeBackLater) => {
                        stats.retry_nanos.fetch_add(elapsed, Ordering::Relaxed);
                        scheduler.on_release(&topology, id, arrow_id);
                        prior = None;
                        last_result = Some(FireResult::ComeBackLater);
                    }
                    Ok(FireOutcome::Finished) => {
                        scheduler.on_release(&topology, id, arrow_id);
                        prior = None;
                        last_result = Some(FireResult::Finished);
                    }
                    Err(e) => {
                        scheduler.on_release(&topology, id, arrow_id);
                        match control.record_failure(e) {
                            FailureDecision::Continue | FailureDecision::Drop => {
                                prior = None;
                                last_result = None;
                            }
                            FailureDecision::Stop => break,
                        }
                    }
                }
            }
        }
    }
}

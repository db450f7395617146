//! Dataflow stages: source / map / tap / split / fold / sink (§4.4).
//!
//! A single tagged enum with one `fire` entry point stands in for what the
//! original engine spread across several arrow base classes (§9 design
//! notes): user callbacks are supplied as trait objects, dispatch on the
//! variant happens once, inside `fire`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use jana_types::{EventIdentity, Level, NumaLocation};
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::event::Event;
use crate::pool::EventPool;
use crate::topology::{ArrowId, Topology};

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;
pub type CallbackResult = Result<(), CallbackError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitStatus {
    Success,
    FailTryAgain,
    FailFinished,
}

/// A single-threaded producer of events.
pub trait Source: Send {
    fn open(&mut self) -> CallbackResult {
        Ok(())
    }
    fn close(&mut self) -> CallbackResult {
        Ok(())
    }
    /// Populates `event` (via `insert`/`register_factory`) and returns its
    /// status. Must be idempotent on `FailTryAgain` — the engine may retry
    /// the same (cleared) event slot.
    fn emit(&mut self, event: &mut Event) -> Result<EmitStatus, CallbackError>;
}

/// A per-event transform or observer. Declared `Send + Sync` because a
/// parallel arrow invokes `process` concurrently across worker threads; any
/// shared state must use interior mutability. `begin_run`/`end_run` are the
/// non-expert ("legacy") hooks of §6.1 — default no-ops for callers that
/// don't need them.
pub trait Processor: Send + Sync {
    fn init(&self) -> CallbackResult {
        Ok(())
    }
    fn begin_run(&self, _event: &EventIdentity) -> CallbackResult {
        Ok(())
    }
    fn end_run(&self) -> CallbackResult {
        Ok(())
    }
    fn process(&self, event: &mut Event) -> CallbackResult;
    fn finish(&self) -> CallbackResult {
        Ok(())
    }
}

/// Emits `N` child events for each parent consumed; single-threaded, may
/// hold state between fires.
pub trait Unfolder: Send {
    fn unfold(&mut self, parent: &mut Event, pool: &EventPool) -> Result<Vec<Event>, CallbackError>;
}

/// Collects children into parents, completing a parent once all its
/// children have arrived; single-threaded, holds state between fires.
/// `pool` is provided so an implementation that folds several children into
/// one representative event can return the rest to the pool instead of
/// leaking them out of circulation.
pub trait Fold: Send {
    fn fold(&mut self, child: Event, pool: &EventPool) -> Result<Option<Event>, CallbackError>;
}

pub(crate) enum ArrowKind {
    Source {
        source: Mutex<Box<dyn Source>>,
        pool: Arc<EventPool>,
        emitted: AtomicU64,
        max_events: u64, // 0 = unlimited
        skip: u64,
        opened: AtomicUsize, // 0/1 flag, avoids requiring Mutex for open()
        level: Level,
        last_run: Mutex<Option<u32>>,
    },
    Map {
        processor: Arc<dyn Processor>,
        last_run: Mutex<Option<u32>>,
        initialized: AtomicUsize,
    },
    Tap {
        processor: Arc<dyn Processor>,
        last_run: Mutex<Option<u32>>,
        initialized: AtomicUsize,
    },
    Split {
        unfolder: Mutex<Box<dyn Unfolder>>,
        pool: Arc<EventPool>,
    },
    Fold {
        fold: Mutex<Box<dyn Fold>>,
        pool: Arc<EventPool>,
    },
    Sink {
        processor: Option<Arc<dyn Processor>>,
        pool: Arc<EventPool>,
        initialized: AtomicUsize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowState {
    Inactive,
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Success,
    ComeBackLater,
    Finished,
}

struct RuntimeState {
    status: ArrowState,
    thread_count: usize,
    running_upstreams: usize,
}

/// A stage in the dataflow graph.
pub struct Arrow {
    pub name: String,
    pub is_parallel: bool,
    pub chunksize: usize,
    pub(crate) inputs: Vec<crate::topology::QueueId>,
    pub(crate) outputs: Vec<crate::topology::QueueId>,
    pub(crate) upstream_ids: Vec<ArrowId>,
    pub(crate) downstream_ids: Vec<ArrowId>,
    pub(crate) kind: ArrowKind,
    state: Mutex<RuntimeState>,
}

impl Arrow {
    pub(crate) fn new(
        name: impl Into<String>,
        is_parallel: bool,
        chunksize: usize,
        inputs: Vec<crate::topology::QueueId>,
        outputs: Vec<crate::topology::QueueId>,
        kind: ArrowKind,
    ) -> Self {
        let is_source = matches!(kind, ArrowKind::Source { .. });
        Self {
            name: name.into(),
            is_parallel,
            chunksize: chunksize.max(1),
            inputs,
            outputs,
            upstream_ids: Vec::new(),
            downstream_ids: Vec::new(),
            kind,
            state: Mutex::new(RuntimeState {
                status: if is_source {
                    ArrowState::Active
                } else {
                    ArrowState::Inactive
                },
                thread_count: 0,
                running_upstreams: 0,
            }),
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self.kind, ArrowKind::Source { .. })
    }

    pub fn is_sink(&self) -> bool {
        matches!(self.kind, ArrowKind::Sink { .. })
    }

    /// Total events emitted so far, for a source arrow; `None` otherwise.
    pub fn emitted_count(&self) -> Option<u64> {
        match &self.kind {
            ArrowKind::Source { emitted, .. } => Some(emitted.load(Ordering::Acquire)),
            _ => None,
        }
    }

    pub fn status(&self) -> ArrowState {
        self.state.lock().status
    }

    pub fn thread_count(&self) -> usize {
        self.state.lock().thread_count
    }

    pub(crate) fn set_active_if_inactive(&self) {
        let mut st = self.state.lock();
        if st.status == ArrowState::Inactive {
            st.status = ArrowState::Active;
        }
    }

    pub(crate) fn try_claim(&self) -> bool {
        let mut st = self.state.lock();
        if st.status != ArrowState::Active {
            return false;
        }
        if !self.is_parallel && st.thread_count >= 1 {
            return false;
        }
        st.thread_count += 1;
        true
    }

    pub(crate) fn release_claim(&self) {
        let mut st = self.state.lock();
        st.thread_count = st.thread_count.saturating_sub(1);
    }

    pub(crate) fn set_upstream_count(&self, n: usize) {
        self.state.lock().running_upstreams = n;
    }

    pub(crate) fn decrement_upstreams(&self) -> usize {
        let mut st = self.state.lock();
        st.running_upstreams = st.running_upstreams.saturating_sub(1);
        st.running_upstreams
    }

    pub(crate) fn running_upstreams(&self) -> usize {
        self.state.lock().running_upstreams
    }

    pub(crate) fn mark_finished(&self) -> bool {
        let mut st = self.state.lock();
        if st.status == ArrowState::Finished {
            return false;
        }
        st.status = ArrowState::Finished;
        true
    }

    /// Executes one fire of this arrow against `topology`'s queues and pool.
    pub(crate) fn fire(&self, topology: &Topology, id: ArrowId, location: NumaLocation) -> EngineResult<FireOutcome> {
        match &self.kind {
            ArrowKind::Source {
                source,
                pool,
                emitted,
                max_events,
                skip,
                opened,
                level,
                last_run,
            } => self.fire_source(
                topology, id, location, source, pool, emitted, *max_events, *skip, opened, *level, last_run,
            ),
            ArrowKind::Map {
                processor,
                last_run,
                initialized,
            }
            | ArrowKind::Tap {
                processor,
                last_run,
                initialized,
            } => self.fire_transform(topology, id, location, processor, last_run, initialized),
            ArrowKind::Split { unfolder, pool } => self.fire_split(topology, id, location, unfolder, pool),
            ArrowKind::Fold { fold, pool } => self.fire_fold(topology, id, location, fold, pool),
            ArrowKind::Sink {
                processor,
                pool,
                initialized,
            } => self.fire_sink(topology, id, location, processor.as_deref(), pool, initialized),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fire_source(
        &self,
        topology: &Topology,
        id: ArrowId,
        location: NumaLocation,
        source: &Mutex<Box<dyn Source>>,
        pool: &Arc<EventPool>,
        emitted: &AtomicU64,
        max_events: u64,
        skip: u64,
        opened: &AtomicUsize,
        level: Level,
        last_run: &Mutex<Option<u32>>,
    ) -> EngineResult<FireOutcome> {
        if opened.swap(1, Ordering::AcqRel) == 0 {
            source
                .lock()
                .open()
                .map_err(|e| wrap_init(&self.name, e))?;
        }

        let out = self.outputs.first().copied().ok_or_else(|| {
            EngineError::InvalidWiring(format!("source '{}' has no output queue", self.name))
        })?;
        let reserved = topology.queue(out).reserve(1, 1, location);
        if reserved == 0 {
            return Ok(FireOutcome::ComeBackLater);
        }

        let Some(mut event) = pool.get(location) else {
            topology.queue(out).unreserve(reserved, location);
            return Err(EngineError::BackpressureStall(std::time::Duration::from_millis(0)));
        };

        let mut guard = source.lock();
        let status = guard.emit(&mut event).map_err(|e| wrap(&self.name, "emit", e));
        drop(guard);

        match status {
            Ok(EmitStatus::Success) => {
                let new_run = event.run_number();
                {
                    let mut lr = last_run.lock();
                    if let Some(prev) = *lr {
                        if new_run < prev {
                            let err = jana_types::DomainError::RunNumberRegressed {
                                previous: prev,
                                new: new_run,
                            };
                            pool.put(event, location);
                            topology.queue(out).unreserve(reserved, location);
                            return Err(wrap(&self.name, "emit", Box::new(err)));
                        }
                    }
                    *lr = Some(new_run);
                }
                let n = emitted.fetch_add(1, Ordering::AcqRel) + 1;
                if n <= skip {
                    pool.put(event, location);
                    topology.queue(out).unreserve(reserved, location);
                    return Ok(FireOutcome::Success);
                }
                let event_number = n - skip;
                let is_barrier = event.take_pending_sequential();
                event.stamp(EventIdentity {
                    event_number,
                    run_number: event.run_number(),
                    level,
                    is_sequential: is_barrier,
                });
                topology
                    .queue(out)
                    .push_and_unreserve(vec![event], reserved, location);
                if max_events != 0 && n - skip >= max_events {
                    self.finish_and_propagate(topology, id);
                    return Ok(FireOutcome::Finished);
                }
                Ok(FireOutcome::Success)
            }
            Ok(EmitStatus::FailTryAgain) => {
                pool.put(event, location);
                topology.queue(out).unreserve(reserved, location);
                Ok(FireOutcome::ComeBackLater)
            }
            Ok(EmitStatus::FailFinished) => {
                pool.put(event, location);
                topology.queue(out).unreserve(reserved, location);
                source
                    .lock()
                    .close()
                    .map_err(|e| wrap(&self.name, "close", e))?;
                self.finish_and_propagate(topology, id);
                Ok(FireOutcome::Finished)
            }
            Err(e) => {
                pool.put(event, location);
                topology.queue(out).unreserve(reserved, location);
                Err(e)
            }
        }
    }

    fn fire_transform(
        &self,
        topology: &Topology,
        id: ArrowId,
        location: NumaLocation,
        processor: &Arc<dyn Processor>,
        last_run: &Mutex<Option<u32>>,
        initialized: &AtomicUsize,
    ) -> EngineResult<FireOutcome> {
        let input = self.inputs[0];
        let output = self.outputs[0];

        // Reserve downstream room before pulling anything, so a chunk is
        // never pulled off input without somewhere to go (§4.3).
        let reserved = topology.queue(output).reserve(self.chunksize, self.chunksize, location);
        if reserved == 0 {
            return Ok(FireOutcome::ComeBackLater);
        }

        let mut events = topology.queue(input).pop(1, reserved, location);
        if events.is_empty() {
            topology.queue(output).unreserve(reserved, location);
            return self.finish_if_drained(topology, id, location);
        }

        if initialized.swap(1, Ordering::AcqRel) == 0 {
            if let Err(e) = processor.init().map_err(|e| wrap_init(&self.name, e)) {
                topology.queue(output).unreserve(reserved, location);
                topology.queue(input).push_and_unreserve(events, 0, location);
                return Err(e);
            }
        }

        for event in events.iter_mut() {
            let outcome = if event.is_sequential() {
                // Raise the flag before draining, not after: `enter_parallel_fire`
                // refuses new parallel work once `barrier_active` is set, so
                // draining down to just this fire is the only way in for anyone
                // else from this point on.
                topology.enter_barrier();
                topology.await_barrier_drain(&self.name);
                let result = self.run_processor_callbacks(processor, last_run, event);
                topology.exit_barrier();
                result
            } else {
                self.run_processor_callbacks(processor, last_run, event)
            };
            if let Err(e) = outcome {
                topology.queue(output).unreserve(reserved, location);
                return Err(e);
            }
        }

        let unused = reserved - events.len();
        if unused > 0 {
            topology.queue(output).unreserve(unused, location);
        }
        topology
            .queue(output)
            .push_and_unreserve(events, events.len(), location);
        Ok(FireOutcome::Success)
    }

    fn run_processor_callbacks(
        &self,
        processor: &Arc<dyn Processor>,
        last_run: &Mutex<Option<u32>>,
        event: &mut Event,
    ) -> EngineResult<()> {
        {
            let mut lr = last_run.lock();
            if *lr != Some(event.run_number()) {
                if lr.is_some() {
                    processor
                        .end_run()
                        .map_err(|e| wrap(&self.name, "end_run", e))?;
                }
                processor
                    .begin_run(&event.identity())
                    .map_err(|e| wrap(&self.name, "begin_run", e))?;
                *lr = Some(event.run_number());
            }
        }
        processor
            .process(event)
            .map_err(|e| wrap(&self.name, "process", e))
    }

    fn fire_split(
        &self,
        topology: &Topology,
        id: ArrowId,
        location: NumaLocation,
        unfolder: &Mutex<Box<dyn Unfolder>>,
        pool: &Arc<EventPool>,
    ) -> EngineResult<FireOutcome> {
        let input = self.inputs[0];
        let output = self.outputs[0];
        let mut parents = topology.queue(input).pop(1, 1, location);
        let Some(mut parent) = parents.pop() else {
            return self.finish_if_drained(topology, id, location);
        };

        let mut children = unfolder
            .lock()
            .unfold(&mut parent, pool)
            .map_err(|e| wrap(&self.name, "unfold", e))?;
        let parent_number = parent.event_number();
        let parent_level = parent.level();
        if let Some(bad) = children.iter().find(|c| !parent_level.can_parent(c.level())) {
            let err = jana_types::DomainError::InvalidLevelNesting(parent_level, bad.level());
            pool.put(parent, location);
            for child in children {
                pool.put(child, location);
            }
            return Err(wrap(&self.name, "unfold", Box::new(err)));
        }
        for child in children.iter_mut() {
            child.set_parent(Some(parent_number));
        }
        let n = children.len();
        let reserved = reserve_exact(topology, output, n, location);
        topology
            .queue(output)
            .push_and_unreserve(children, reserved, location);
        pool.put(parent, location);
        Ok(FireOutcome::Success)
    }

    fn fire_fold(
        &self,
        topology: &Topology,
        id: ArrowId,
        location: NumaLocation,
        fold: &Mutex<Box<dyn Fold>>,
        pool: &Arc<EventPool>,
    ) -> EngineResult<FireOutcome> {
        let input = self.inputs[0];
        let output = self.outputs[0];
        let mut children = topology.queue(input).pop(1, 1, location);
        let Some(child) = children.pop() else {
            return self.finish_if_drained(topology, id, location);
        };

        if let Some(parent) = fold.lock().fold(child, pool).map_err(|e| wrap(&self.name, "fold", e))? {
            let reserved = reserve_exact(topology, output, 1, location);
            topology
                .queue(output)
                .push_and_unreserve(vec![parent], reserved, location);
        }
        Ok(FireOutcome::Success)
    }

    fn fire_sink(
        &self,
        topology: &Topology,
        id: ArrowId,
        location: NumaLocation,
        processor: Option<&dyn Processor>,
        pool: &Arc<EventPool>,
        initialized: &AtomicUsize,
    ) -> EngineResult<FireOutcome> {
        let input = self.inputs[0];
        let mut events = topology.queue(input).pop(1, self.chunksize, location);
        if events.is_empty() {
            return self.finish_if_drained(topology, id, location);
        }
        if let Some(p) = processor {
            if initialized.swap(1, Ordering::AcqRel) == 0 {
                p.init().map_err(|e| wrap_init(&self.name, e))?;
            }
        }
        for mut event in events.drain(..) {
            if let Some(p) = processor {
                let outcome = if event.is_sequential() {
                    topology.enter_barrier();
                    topology.await_barrier_drain(&self.name);
                    let result = p.process(&mut event).map_err(|e| wrap(&self.name, "process", e));
                    topology.exit_barrier();
                    result
                } else {
                    p.process(&mut event).map_err(|e| wrap(&self.name, "process", e))
                };
                outcome?;
            }
            topology.record_retired(event.identity());
            pool.put(event, location);
        }
        Ok(FireOutcome::Success)
    }

    fn finish_if_drained(&self, topology: &Topology, id: ArrowId, location: NumaLocation) -> EngineResult<FireOutcome> {
        let inputs_empty = self.inputs.iter().all(|q| topology.queue(*q).is_empty(location));
        if !self.is_source() && inputs_empty && self.running_upstreams() == 0 {
            self.finish_and_propagate(topology, id);
            return Ok(FireOutcome::Finished);
        }
        Ok(FireOutcome::ComeBackLater)
    }

    pub(crate) fn finish_and_propagate(&self, topology: &Topology, id: ArrowId) {
        topology.finish_arrow(id);
    }

    /// Invokes the embedder's `finish()` hook exactly once, at the point this
    /// arrow first transitions to `Finished` (§6's Processor interface).
    /// Errors are logged, not propagated: by the time an arrow finishes there
    /// is no in-flight event or worker `fire` call left to fail.
    pub(crate) fn call_finish_callback(&self) {
        let processor = match &self.kind {
            ArrowKind::Map { processor, .. } | ArrowKind::Tap { processor, .. } => Some(processor.as_ref()),
            ArrowKind::Sink { processor, .. } => processor.as_deref(),
            ArrowKind::Source { .. } | ArrowKind::Split { .. } | ArrowKind::Fold { .. } => None,
        };
        if let Some(p) = processor {
            if let Err(e) = p.finish() {
                tracing::warn!(arrow = %self.name, error = %e, "processor finish() failed");
            }
        }
    }
}

/// Reserves exactly `n` downstream slots, retrying with a bounded backoff if
/// the queue is momentarily full. A split/fold arrow is single-threaded, so
/// blocking its own progress here cannot deadlock the rest of the topology —
/// it only throttles how fast this one arrow produces children/parents.
fn reserve_exact(topology: &Topology, output: crate::topology::QueueId, n: usize, location: NumaLocation) -> usize {
    if n == 0 {
        return 0;
    }
    let mut have = topology.queue(output).reserve(n, n, location);
    let mut attempts = 0;
    while have < n && attempts < 10_000 {
        std::thread::sleep(crate::constants::IDLE_BACKOFF);
        have += topology.queue(output).reserve(n - have, n - have, location);
        attempts += 1;
    }
    have
}

fn wrap(component: &str, callback: &str, source: CallbackError) -> EngineError {
    EngineError::CallbackException {
        component: component.to_string(),
        plugin: "embedder".to_string(),
        callback: callback.to_string(),
        source,
    }
}

/// Like `wrap`, but for the one-time setup callbacks (`Source::open`,
/// `Processor::init`) rather than per-event ones — these are a component
/// failing to come up at all, not a single callback misbehaving on one
/// event, so they get their own `EngineError` kind.
fn wrap_init(component: &str, source: CallbackError) -> EngineError {
    EngineError::ComponentInitFailure {
        component: component.to_string(),
        source,
    }
}

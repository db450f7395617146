//! End-to-end scenarios against a real `ProcessingController`, one per §8
//! property: exact counts on a bounded source, manual stop on an unbounded
//! one, barrier cadence, queue-pressure backpressure, scheduler rebalance,
//! factory memoization, split/fold round-tripping, identity invariants, and
//! the two §7 failure-injection providers (`BrokenSource`, `FlakyProcessor`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jana_core::{ControllerConfig, ProcessingController, RoundRobinScheduler, StopOnAnyPolicy, TopologyBuilder};
use jana_policies::ContinuePolicy;
use jana_providers::{
    BarrierCheckingProcessor, BrokenSource, CollectingFold, CountingProcessor, CountingSource,
    FanoutUnfolder, FlakyProcessor, SquaredFactory, StallingSource,
};
use jana_types::Level;

fn wait_until_finished(controller: &ProcessingController, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while !controller.is_finished() {
        if start.elapsed() > timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    true
}

#[test]
fn bounded_source_is_consumed_exactly_once_each() {
    let pool = Arc::new(jana_core::EventPool::new(1, 64, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 32);
    let source = builder.add_source(
        "source",
        Box::new(CountingSource::bounded(200)),
        pool.clone(),
        queue,
        200,
        0,
        Level::PhysicsEvent,
        8,
    );
    let processor = Arc::new(CountingProcessor::new());
    let sink = builder.add_sink("sink", Some(processor.clone()), pool, true, queue, 8);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(4);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    assert_eq!(processor.processed_count(), 200);
    assert_eq!(controller.topology().retired_count(), 200);
    assert_eq!(processor.init_count(), 1);
    assert_eq!(processor.finish_count(), 1);
}

#[test]
fn unbounded_source_stops_on_request() {
    let pool = Arc::new(jana_core::EventPool::new(1, 64, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 32);
    let source = builder.add_source(
        "source",
        Box::new(CountingSource::unbounded()),
        pool.clone(),
        queue,
        0,
        0,
        Level::PhysicsEvent,
        8,
    );
    let processor = Arc::new(CountingProcessor::new());
    let sink = builder.add_sink("sink", Some(processor.clone()), pool, true, queue, 8);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = Arc::new(ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    ));
    controller.run(2);
    std::thread::sleep(Duration::from_millis(100));
    assert!(!controller.is_finished());
    controller.request_stop();
    controller.wait_until_stopped();

    let emitted = controller.topology().arrow(source).emitted_count().unwrap();
    assert!(processor.processed_count() > 0);
    assert_eq!(processor.processed_count(), emitted);
    assert_eq!(processor.finish_count(), 1);
}

#[test]
fn barrier_events_see_a_consistent_global_count() {
    let pool = Arc::new(jana_core::EventPool::new(1, 64, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 32);
    let source = builder.add_source(
        "source",
        Box::new(CountingSource::bounded(400).with_barrier_every(10)),
        pool.clone(),
        queue,
        400,
        0,
        Level::PhysicsEvent,
        8,
    );
    let processor = Arc::new(BarrierCheckingProcessor::new(10));
    let sink_queue = builder.add_queue("sink-q", 1, 32);
    let map = builder.add_map("check", processor.clone(), true, queue, sink_queue, 8);
    let sink = builder.add_sink("sink", None, pool, true, sink_queue, 8);
    builder.connect(source, map);
    builder.connect(map, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(4);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    assert_eq!(processor.violations(), 0);
}

/// A source that always succeeds, used (unlike `StallingSource`, which never
/// actually emits anything) to put real events in flight so the pool's
/// in-flight bound can be observed directly.
struct SlowCountingSource {
    emitted: u64,
}

impl jana_core::Source for SlowCountingSource {
    fn emit(&mut self, _event: &mut jana_core::Event) -> Result<jana_core::EmitStatus, jana_core::arrow::CallbackError> {
        self.emitted += 1;
        std::thread::sleep(Duration::from_millis(2));
        Ok(jana_core::EmitStatus::Success)
    }
}

/// A sink whose processor stalls, so popped events accumulate downstream
/// instead of draining straight back to the pool, the way spec.md's scenario
/// 4 requires to actually exercise the `max_inflight_events` bound.
struct StallingProcessor;

impl jana_core::Processor for StallingProcessor {
    fn process(&self, _event: &mut jana_core::Event) -> jana_core::arrow::CallbackResult {
        std::thread::sleep(Duration::from_millis(20));
        Ok(())
    }
}

#[test]
fn stalling_source_produces_backpressure_not_a_crash() {
    let pool = Arc::new(jana_core::EventPool::new(1, 8, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 2);
    let source = builder.add_source(
        "source",
        Box::new(StallingSource),
        pool.clone(),
        queue,
        0,
        0,
        Level::PhysicsEvent,
        1,
    );
    let processor = Arc::new(CountingProcessor::new());
    let sink = builder.add_sink("sink", Some(processor), pool, true, queue, 1);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(1);
    std::thread::sleep(Duration::from_millis(100));
    assert!(!controller.is_finished());
    controller.request_stop();
    controller.wait_until_stopped();
}

/// spec.md scenario 4, literally: source chunksize 1, processor chunksize 1,
/// `max_inflight_events` 3 — the number of events checked out of the pool at
/// once must never exceed 3, however many workers are racing to fire.
#[test]
fn in_flight_events_never_exceed_the_pool_bound() {
    const MAX_INFLIGHT: usize = 3;
    let pool = Arc::new(jana_core::EventPool::new(1, MAX_INFLIGHT, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, MAX_INFLIGHT);
    let source = builder.add_source(
        "source",
        Box::new(SlowCountingSource { emitted: 0 }),
        pool.clone(),
        queue,
        30,
        0,
        Level::PhysicsEvent,
        1,
    );
    let sink = builder.add_sink("sink", Some(Arc::new(StallingProcessor)), pool.clone(), true, queue, 1);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = Arc::new(ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    ));
    controller.run(4);

    let mut max_observed = 0usize;
    while !controller.is_finished() {
        let in_flight = MAX_INFLIGHT - pool.available(jana_types::NumaLocation::DEFAULT);
        max_observed = max_observed.max(in_flight);
        assert!(in_flight <= MAX_INFLIGHT, "in-flight count {in_flight} exceeded bound {MAX_INFLIGHT}");
        std::thread::sleep(Duration::from_millis(1));
    }
    controller.wait_until_stopped();

    assert!(max_observed > 0, "test never observed any events in flight");
    assert!(max_observed <= MAX_INFLIGHT);
}

#[test]
fn fixed_scheduler_rebalance_moves_worker_slots() {
    use jana_core::FixedScheduler;

    let pool = Arc::new(jana_core::EventPool::new(1, 32, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let q1 = builder.add_queue("q1", 1, 16);
    let q2 = builder.add_queue("q2", 1, 16);
    let source1 = builder.add_source(
        "source1",
        Box::new(CountingSource::bounded(50)),
        pool.clone(),
        q1,
        50,
        0,
        Level::PhysicsEvent,
        4,
    );
    let source2 = builder.add_source(
        "source2",
        Box::new(CountingSource::bounded(50)),
        pool.clone(),
        q2,
        50,
        0,
        Level::PhysicsEvent,
        4,
    );
    let sink1 = builder.add_sink("sink1", None, pool.clone(), false, q1, 4);
    let sink2 = builder.add_sink("sink2", None, pool, false, q2, 4);
    builder.connect(source1, sink1);
    builder.connect(source2, sink2);
    let topology = builder.build().unwrap();

    let scheduler = Arc::new(FixedScheduler::new(vec![sink1, sink1]));
    scheduler.rebalance(sink1, sink2, 1);

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler,
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(2);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();
}

/// Reads the `squared` factory twice per event, the way two independent
/// consumers sharing one processor step would.
struct TwiceReadingProcessor {
    mismatches: AtomicU64,
}

impl jana_core::Processor for TwiceReadingProcessor {
    fn process(&self, event: &mut jana_core::Event) -> jana_core::arrow::CallbackResult {
        let first = event.get::<u64>("")?.to_vec();
        let second = event.get::<u64>("")?.to_vec();
        if first != second {
            self.mismatches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[test]
fn factory_runs_once_regardless_of_consumer_count() {
    let calls = Arc::new(AtomicU64::new(0));
    let calls_for_blueprint = calls.clone();
    let blueprint: jana_core::pool::EventBlueprint = Arc::new(move |event| {
        event.register_factory("squared", SquaredFactory::new(calls_for_blueprint.clone()));
    });
    let pool = Arc::new(jana_core::EventPool::new(1, 32, blueprint));

    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 16);
    let source = builder.add_source(
        "source",
        Box::new(CountingSource::bounded(50)),
        pool.clone(),
        queue,
        50,
        0,
        Level::PhysicsEvent,
        4,
    );
    let processor = Arc::new(TwiceReadingProcessor {
        mismatches: AtomicU64::new(0),
    });
    let sink = builder.add_sink("sink", Some(processor.clone()), pool, true, queue, 4);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(2);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    assert_eq!(processor.mismatches.load(Ordering::SeqCst), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 50);
}

#[test]
fn split_and_fold_round_trip_every_parent_through_its_children() {
    let pool = Arc::new(jana_core::EventPool::new(1, 128, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let parents_q = builder.add_queue("parents", 1, 16);
    let children_q = builder.add_queue("children", 1, 16);
    let folded_q = builder.add_queue("folded", 1, 16);

    let source = builder.add_source(
        "source",
        Box::new(CountingSource::bounded(50)),
        pool.clone(),
        parents_q,
        50,
        0,
        Level::PhysicsEvent,
        4,
    );
    let split = builder.add_split(
        "split",
        Box::new(FanoutUnfolder::new(3)),
        pool.clone(),
        parents_q,
        children_q,
    );
    let fold = builder.add_fold(
        "fold",
        Box::new(CollectingFold::new(3)),
        pool.clone(),
        children_q,
        folded_q,
    );
    let processor = Arc::new(CountingProcessor::new());
    let sink = builder.add_sink("sink", Some(processor.clone()), pool, true, folded_q, 4);
    builder.connect(source, split);
    builder.connect(split, fold);
    builder.connect(fold, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(4);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    // Every parent unfolds into exactly 3 children tagged with its event
    // number, and the fold collapses each trio back into a single retired
    // event, so one parent in means one event out.
    assert_eq!(processor.processed_count(), 50);
    assert_eq!(controller.topology().retired_count(), 50);
}

/// A source that emits run number 1, then drops to run number 0 on its
/// second event, to exercise the run-number-regression check the engine
/// applies to every source's emitted identity.
struct RegressingRunSource {
    emitted: u64,
}

impl jana_core::Source for RegressingRunSource {
    fn emit(&mut self, event: &mut jana_core::Event) -> Result<jana_core::EmitStatus, jana_core::arrow::CallbackError> {
        if self.emitted >= 3 {
            return Ok(jana_core::EmitStatus::FailFinished);
        }
        self.emitted += 1;
        event.set_run_number(if self.emitted == 2 { 0 } else { 1 });
        Ok(jana_core::EmitStatus::Success)
    }
}

#[test]
fn source_run_number_regression_is_reported_as_a_callback_exception() {
    let pool = Arc::new(jana_core::EventPool::new(1, 16, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 8);
    let source = builder.add_source(
        "source",
        Box::new(RegressingRunSource { emitted: 0 }),
        pool.clone(),
        queue,
        0,
        0,
        Level::PhysicsEvent,
        1,
    );
    let sink = builder.add_sink("sink", None, pool, true, queue, 1);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(1);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    assert!(controller
        .exceptions()
        .iter()
        .any(|e| e.contains("run number went backwards")));
}

/// An unfolder that mis-stamps a child at the same level as its parent,
/// violating the hierarchical nesting order the engine checks in `Split`.
struct SameLevelUnfolder;

impl jana_core::Unfolder for SameLevelUnfolder {
    fn unfold(
        &mut self,
        parent: &mut jana_core::Event,
        pool: &jana_core::EventPool,
    ) -> Result<Vec<jana_core::Event>, jana_core::arrow::CallbackError> {
        let mut child = pool
            .get(parent.location())
            .ok_or_else(|| jana_components::fail("pool exhausted"))?;
        child.stamp_as_child(parent.event_number() + 1000, parent.run_number(), parent.level());
        Ok(vec![child])
    }
}

#[test]
fn split_rejects_a_child_at_the_same_level_as_its_parent() {
    let pool = Arc::new(jana_core::EventPool::new(1, 16, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let parents_q = builder.add_queue("parents", 1, 8);
    let children_q = builder.add_queue("children", 1, 8);

    let source = builder.add_source(
        "source",
        Box::new(CountingSource::bounded(1)),
        pool.clone(),
        parents_q,
        1,
        0,
        Level::PhysicsEvent,
        1,
    );
    let split = builder.add_split("split", Box::new(SameLevelUnfolder), pool.clone(), parents_q, children_q);
    let sink = builder.add_sink("sink", None, pool, true, children_q, 1);
    builder.connect(source, split);
    builder.connect(split, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(1);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    assert!(controller
        .exceptions()
        .iter()
        .any(|e| e.contains("cannot parent")));
}

#[test]
fn a_source_that_fails_to_open_reports_component_init_failure_and_stops() {
    let pool = Arc::new(jana_core::EventPool::new(1, 8, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 4);
    let source = builder.add_source(
        "broken-source",
        Box::new(BrokenSource),
        pool.clone(),
        queue,
        0,
        0,
        Level::PhysicsEvent,
        1,
    );
    let sink = builder.add_sink("sink", None, pool, true, queue, 1);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(StopOnAnyPolicy),
            affinity: false,
        },
    );
    controller.run(1);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    assert_eq!(controller.topology().retired_count(), 0);
    assert_ne!(controller.exit_code(), 0);
    assert!(controller
        .exceptions()
        .iter()
        .any(|e| e.contains("failed to initialize") && e.contains("broken-source")));
}

#[test]
fn flaky_processor_failures_are_recorded_and_the_run_continues_past_them() {
    let pool = Arc::new(jana_core::EventPool::new(1, 32, Arc::new(|_| {})));
    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("q", 1, 16);
    let source = builder.add_source(
        "source",
        Box::new(CountingSource::bounded(50)),
        pool.clone(),
        queue,
        50,
        0,
        Level::PhysicsEvent,
        1,
    );
    // Fails every 10th event it sees; with chunksize 1 each fire handles
    // exactly one event, so a failure never drags a sibling down with it.
    let sink = builder.add_sink("sink", Some(Arc::new(FlakyProcessor::new(10))), pool, true, queue, 1);
    builder.connect(source, sink);
    let topology = builder.build().unwrap();

    let controller = ProcessingController::initialize(
        topology,
        ControllerConfig {
            scheduler: Arc::new(RoundRobinScheduler::new()),
            policy: Box::new(ContinuePolicy),
            affinity: false,
        },
    );
    controller.run(2);
    assert!(wait_until_finished(&controller, Duration::from_secs(10)));
    controller.wait_until_stopped();

    // Events 10, 20, 30, 40, 50 fail; the other 45 retire normally, and the
    // run reaches completion rather than stopping at the first failure.
    assert_eq!(controller.exceptions().len(), 5);
    assert!(controller
        .exceptions()
        .iter()
        .all(|e| e.contains("simulated processing failure")));
    assert_eq!(controller.topology().retired_count(), 45);
}

//! jana-cli: demo binary wiring a one-source, one-sink topology and driving
//! it through `ProcessingController` to completion or Ctrl-C.

use std::sync::Arc;

use clap::Parser;
use jana_core::{cpu::ThreadCount, ControllerConfig, ProcessingController, RoundRobinScheduler, TopologyBuilder};
use jana_infra::{logging, Parameters, Ticker};
use jana_policies::ContinuePolicy;
use jana_providers::{CountingProcessor, CountingSource};
use jana_types::Level;

/// CLI flags layered over `Parameters::from_env()`: a flag the user actually
/// passes overrides the environment, which overrides the built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "jana-cli", about = "Run a demo event-processing topology")]
struct Args {
    /// Number of worker threads, or overrides `JANA_NTHREADS`.
    #[arg(long)]
    nthreads: Option<usize>,

    /// Number of events the demo source emits; overrides `JANA_NEVENTS`.
    #[arg(long)]
    nevents: Option<u64>,

    /// Pin workers to CPU cores; overrides `JANA_AFFINITY`.
    #[arg(long)]
    affinity: Option<bool>,
}

fn main() {
    let args = Args::parse();
    let mut params = Parameters::from_env();
    if let Some(n) = args.nthreads {
        params.nthreads = ThreadCount::Count(n);
    }
    if let Some(n) = args.nevents {
        params.nevents = n;
    }
    if let Some(a) = args.affinity {
        params.affinity = a;
    }

    logging::init(params.loglevel);

    let pool = Arc::new(jana_core::EventPool::new(1, params.max_inflight_events, Arc::new(|_event| {})));

    let mut builder = TopologyBuilder::new();
    let queue = builder.add_queue("source-to-sink", 1, params.max_inflight_events);

    let source = builder.add_source(
        "demo-source",
        Box::new(CountingSource::bounded(params.nevents)),
        pool.clone(),
        queue,
        params.nevents,
        params.nskip,
        Level::PhysicsEvent,
        params.event_source_chunksize,
    );

    let processor = Arc::new(CountingProcessor::new());
    let sink = builder.add_sink(
        "demo-sink",
        Some(processor.clone()),
        pool.clone(),
        true,
        queue,
        params.event_processor_chunksize,
    );
    builder.connect(source, sink);

    let topology = builder.build().expect("demo topology is well-formed");

    let config = ControllerConfig {
        scheduler: Arc::new(RoundRobinScheduler::new()),
        policy: Box::new(ContinuePolicy),
        affinity: params.affinity,
    };
    let controller = Arc::new(ProcessingController::initialize(topology, config));

    let stop_controller = controller.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, requesting stop");
        stop_controller.request_stop();
    })
    .expect("failed to install ctrl-c handler");

    let mut ticker = Ticker::spawn(controller.clone(), params.ticker_interval, params.extended_report);

    controller.run(params.nthreads.resolve());
    while !controller.is_finished() {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    controller.wait_until_stopped();
    ticker.stop();

    let report = controller.measure_performance();
    tracing::info!(
        events_retired = report.events_retired,
        rate_hz = report.rate_hz,
        wall_time = ?report.wall_time,
        "run complete"
    );
    println!(
        "processed {} events in {:?} ({:.1} Hz)",
        processor.processed_count(),
        report.wall_time,
        report.rate_hz
    );

    std::process::exit(controller.exit_code());
}

//! jana-core: the parallel event-processing engine.
//!
//! Components, leaves first: `event` (the message unit), `factory` (the
//! lazy per-event computation graph), `pool` (NUMA-partitioned event free
//! lists), `queue` (bounded MPMC mailboxes), `arrow` (dataflow stages),
//! `topology` (the wired graph), `scheduler` (assigns workers to arrows),
//! `worker` (the thread body), `controller` (the public façade).
//!
//! `error` and `policy` define the failure taxonomy and the pluggable
//! reaction to it; `resource` is the convenience wrapper for cross-event
//! shared state; `cpu` caches hardware thread counts.

pub mod arrow;
pub mod constants;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod event;
pub mod factory;
pub mod policy;
pub mod pool;
pub mod queue;
pub mod resource;
pub mod scheduler;
pub mod topology;
pub mod worker;

pub use arrow::{Arrow, EmitStatus, Fold, Processor, Source, Unfolder};
pub use controller::{ControllerConfig, PerformanceReport, ProcessingController};
pub use error::{EngineError, EngineResult};
pub use event::Event;
pub use factory::{Factory, FactorySet, FactoryStatus};
pub use policy::{FailureDecision, FailurePolicy, StopOnAnyPolicy};
pub use pool::EventPool;
pub use queue::Queue;
pub use scheduler::{FixedScheduler, RoundRobinScheduler, Scheduler};
pub use topology::{ArrowId, QueueId, Topology, TopologyBuilder, TopologyStatus};
pub use worker::Worker;

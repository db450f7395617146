//! Engine-wide constants.

/// Logical engine version, surfaced through `ProcessingController::version`
/// so embedders can log what they're running against.
pub const ENGINE_VERSION: &str = "J2.0";

/// Default bound on in-flight events when an embedder doesn't set
/// `jana:max_inflight_events`.
pub const DEFAULT_MAX_INFLIGHT_EVENTS: usize = 256;

/// Default queue capacity per NUMA location when an arrow doesn't specify one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// How long an idle worker sleeps before re-polling the scheduler.
pub const IDLE_BACKOFF: std::time::Duration = std::time::Duration::from_micros(500);

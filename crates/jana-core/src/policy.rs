//! The engine-wide reaction to a per-event failure (§7).

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Log the failure and keep processing other events.
    Continue,
    /// Drop the event that caused the failure, keep the rest of the run going.
    Drop,
    /// Transition the topology to Draining, same as `request_stop`.
    Stop,
}

/// Decides what the engine does after a worker catches an error firing an
/// arrow. Implementations are shared across all workers and must be
/// thread-safe.
pub trait FailurePolicy: Send + Sync {
    fn decide(&self, error: &EngineError) -> FailureDecision;
}

/// The engine's default: stop on any failure.
pub struct StopOnAnyPolicy;

impl FailurePolicy for StopOnAnyPolicy {
    fn decide(&self, _error: &EngineError) -> FailureDecision {
        FailureDecision::Stop
    }
}

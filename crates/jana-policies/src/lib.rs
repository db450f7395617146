//! Failure-reaction policies built on top of `jana_core::policy::FailurePolicy` (§7).
//!
//! The engine only ships `StopOnAnyPolicy` (the default). This crate adds
//! the other two reactions §7 names — continue, and drop-with-a-budget —
//! plus a small decision log an embedder can inspect after a run.

use std::sync::atomic::{AtomicUsize, Ordering};

use jana_core::error::EngineError;
use jana_core::policy::{FailureDecision, FailurePolicy};

/// Never stops the run; every failure is logged and the event dropped.
pub struct ContinuePolicy;

impl FailurePolicy for ContinuePolicy {
    fn decide(&self, _error: &EngineError) -> FailureDecision {
        FailureDecision::Continue
    }
}

/// Drops failing events, but stops once more than `max_failures` have
/// accumulated — a middle ground between "stop on any" and "never stop".
pub struct DropUntilPolicy {
    max_failures: usize,
    seen: AtomicUsize,
}

impl DropUntilPolicy {
    pub fn new(max_failures: usize) -> Self {
        Self {
            max_failures,
            seen: AtomicUsize::new(0),
        }
    }

    pub fn failures_seen(&self) -> usize {
        self.seen.load(Ordering::Relaxed)
    }
}

impl FailurePolicy for DropUntilPolicy {
    fn decide(&self, _error: &EngineError) -> FailureDecision {
        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if n > self.max_failures {
            FailureDecision::Stop
        } else {
            FailureDecision::Drop
        }
    }
}

/// Stops only on structural errors (bad wiring, missing factories); per-event
/// failures (a callback exception, a timeout) are dropped. This matches a
/// common embedder need: don't let one bad event take down a long run, but
/// still fail fast on a misconfigured topology.
pub struct DropPerEventPolicy;

impl FailurePolicy for DropPerEventPolicy {
    fn decide(&self, error: &EngineError) -> FailureDecision {
        if error.is_per_event() {
            FailureDecision::Drop
        } else {
            FailureDecision::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn per_event_error() -> EngineError {
        EngineError::TimeoutExceeded {
            event_number: 1,
            budget: Duration::from_secs(1),
        }
    }

    fn structural_error() -> EngineError {
        EngineError::InvalidWiring("dangling queue".into())
    }

    #[test]
    fn continue_policy_never_stops() {
        let policy = ContinuePolicy;
        assert_eq!(policy.decide(&per_event_error()), FailureDecision::Continue);
        assert_eq!(policy.decide(&structural_error()), FailureDecision::Continue);
    }

    #[test]
    fn drop_until_policy_stops_after_budget() {
        let policy = DropUntilPolicy::new(2);
        assert_eq!(policy.decide(&per_event_error()), FailureDecision::Drop);
        assert_eq!(policy.decide(&per_event_error()), FailureDecision::Drop);
        assert_eq!(policy.decide(&per_event_error()), FailureDecision::Stop);
        assert_eq!(policy.failures_seen(), 3);
    }

    #[test]
    fn drop_per_event_stops_only_on_structural_errors() {
        let policy = DropPerEventPolicy;
        assert_eq!(policy.decide(&per_event_error()), FailureDecision::Drop);
        assert_eq!(policy.decide(&structural_error()), FailureDecision::Stop);
    }
}

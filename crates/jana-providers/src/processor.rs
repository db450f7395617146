//! Reference `Processor` implementations.

use std::sync::atomic::{AtomicU64, Ordering};

use jana_components::{CallbackError, CallbackResult, Processor};
use jana_core::Event;

/// Counts `init`, `process`, and `finish` invocations. The textbook
/// processor for asserting exact event counts against a bounded source.
#[derive(Default)]
pub struct CountingProcessor {
    pub inits: AtomicU64,
    pub processed: AtomicU64,
    pub finishes: AtomicU64,
}

impl CountingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn init_count(&self) -> u64 {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn finish_count(&self) -> u64 {
        self.finishes.load(Ordering::SeqCst)
    }
}

impl Processor for CountingProcessor {
    fn init(&self) -> CallbackResult {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process(&self, _event: &mut Event) -> CallbackResult {
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&self) -> CallbackResult {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Demonstrates the barrier invariant of scenario 3: increments a shared
/// counter on every barrier (sequential) event, and on non-barrier events
/// asserts the counter equals `event_number / every`.
pub struct BarrierCheckingProcessor {
    every: u64,
    global: AtomicU64,
    violations: AtomicU64,
}

impl BarrierCheckingProcessor {
    pub fn new(every: u64) -> Self {
        Self {
            every,
            global: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::SeqCst)
    }
}

impl Processor for BarrierCheckingProcessor {
    fn process(&self, event: &mut Event) -> CallbackResult {
        if event.is_sequential() {
            self.global.fetch_add(1, Ordering::SeqCst);
        } else {
            let expected = event.event_number() / self.every;
            if self.global.load(Ordering::SeqCst) != expected {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// Fails every `nth` event it sees, to exercise `CallbackException` and the
/// configured `FailurePolicy`.
pub struct FlakyProcessor {
    nth: u64,
    seen: AtomicU64,
}

impl FlakyProcessor {
    pub fn new(nth: u64) -> Self {
        Self {
            nth,
            seen: AtomicU64::new(0),
        }
    }
}

impl Processor for FlakyProcessor {
    fn process(&self, _event: &mut Event) -> CallbackResult {
        let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if self.nth != 0 && n % self.nth == 0 {
            return Err(transient_failure());
        }
        Ok(())
    }
}

fn transient_failure() -> CallbackError {
    jana_components::fail("simulated processing failure")
}

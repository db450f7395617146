//! Reference `Source` implementations.

use jana_components::{fail, CallbackError, EmitStatus, Source};
use jana_core::Event;

/// Emits events 1..=`total` (or forever if `total` is `None`), optionally
/// flagging every `barrier_every`-th event as sequential. Mirrors the bounded
/// and barrier-cadence scenarios directly.
pub struct CountingSource {
    emitted: u64,
    total: Option<u64>,
    barrier_every: Option<u64>,
    run_number: u32,
}

impl CountingSource {
    pub fn bounded(total: u64) -> Self {
        Self {
            emitted: 0,
            total: Some(total),
            barrier_every: None,
            run_number: 1,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            emitted: 0,
            total: None,
            barrier_every: None,
            run_number: 1,
        }
    }

    pub fn with_barrier_every(mut self, n: u64) -> Self {
        self.barrier_every = Some(n);
        self
    }

    pub fn with_run_number(mut self, run_number: u32) -> Self {
        self.run_number = run_number;
        self
    }
}

impl Source for CountingSource {
    fn emit(&mut self, event: &mut Event) -> Result<EmitStatus, CallbackError> {
        if let Some(total) = self.total {
            if self.emitted >= total {
                return Ok(EmitStatus::FailFinished);
            }
        }
        self.emitted += 1;
        event.set_run_number(self.run_number);
        if let Some(every) = self.barrier_every {
            if every != 0 && self.emitted % every == 0 {
                event.mark_sequential();
            }
        }
        Ok(EmitStatus::Success)
    }
}

/// A source that always fails with `FailTryAgain`, useful for exercising
/// queue-pressure / backpressure paths in isolation.
pub struct StallingSource;

impl Source for StallingSource {
    fn emit(&mut self, _event: &mut Event) -> Result<EmitStatus, CallbackError> {
        Ok(EmitStatus::FailTryAgain)
    }
}

/// A source whose `open` fails, to exercise the `ComponentInitFailure` path —
/// a component that never comes up at all, as opposed to one that comes up
/// and then fails a per-event callback.
pub struct BrokenSource;

impl Source for BrokenSource {
    fn open(&mut self) -> Result<(), CallbackError> {
        Err(fail("could not open data file"))
    }

    fn emit(&mut self, _event: &mut Event) -> Result<EmitStatus, CallbackError> {
        Ok(EmitStatus::FailFinished)
    }
}

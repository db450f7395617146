//! A reference `Factory` demonstrating the create-on-demand memoization
//! contract of §4.1 (scenario 6: two consumers, one `process` call).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jana_components::CallbackError;
use jana_core::factory::Factory;
use jana_types::EventIdentity;

pub struct SquaredFactory {
    pub calls: Arc<AtomicU64>,
}

impl SquaredFactory {
    pub fn new(calls: Arc<AtomicU64>) -> Self {
        Self { calls }
    }
}

impl Factory for SquaredFactory {
    type Output = u64;

    fn process(&mut self, event: &EventIdentity) -> Result<Vec<u64>, CallbackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![event.event_number * event.event_number])
    }
}

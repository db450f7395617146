use serde::{Deserialize, Serialize};

use crate::level::Level;

/// The immutable identity stamped onto an event when a source emits it.
///
/// Once emitted, these fields never change for the lifetime of the event;
/// only the factory set attached to the event is mutable, and only by the
/// worker thread that currently owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIdentity {
    pub event_number: u64,
    pub run_number: u32,
    pub level: Level,
    /// "Barrier" flag: an event carrying this must be processed in isolation.
    pub is_sequential: bool,
}

impl EventIdentity {
    pub fn new(event_number: u64, run_number: u32, level: Level) -> Self {
        Self {
            event_number,
            run_number,
            level,
            is_sequential: false,
        }
    }

    pub fn sequential(mut self) -> Self {
        self.is_sequential = true;
        self
    }
}

//! The message unit flowing between arrows (§3, §4.2).

use jana_types::{EventIdentity, Level, NumaLocation};

use crate::error::EngineResult;
use crate::factory::FactorySet;

/// An event: an immutable identity plus a mutable, per-event factory cache.
///
/// A single worker has exclusive access to an `Event` between acquiring it
/// from an upstream queue and pushing it to a downstream queue; nothing here
/// needs to be internally synchronized.
pub struct Event {
    identity: EventIdentity,
    factories: FactorySet,
    location: NumaLocation,
    /// Event number of the enclosing higher-level event, for hierarchical
    /// levels (e.g. a `PhysicsEvent`'s parent `Timeslice`). Retiring a parent
    /// is deferred by the `EventPool` until its children have retired.
    parent_event_number: Option<u64>,
    /// Set by a source's `emit` via `mark_sequential` before the engine
    /// stamps the event's final identity; consumed once by `fire_source`.
    pending_sequential: bool,
}

impl Event {
    pub(crate) fn new(location: NumaLocation) -> Self {
        Self {
            identity: EventIdentity::new(0, 0, Level::None),
            factories: FactorySet::new(),
            location,
            parent_event_number: None,
            pending_sequential: false,
        }
    }

    pub(crate) fn stamp(&mut self, identity: EventIdentity) {
        self.identity = identity;
    }

    /// Called from within `Source::emit` to flag the event currently being
    /// produced as a barrier event (§3, §4.4's "is_sequential").
    pub fn mark_sequential(&mut self) {
        self.pending_sequential = true;
    }

    pub(crate) fn take_pending_sequential(&mut self) -> bool {
        std::mem::replace(&mut self.pending_sequential, false)
    }

    /// Called from within `Source::emit` to set the run number the engine
    /// should stamp onto the event (defaults to the previous run if unset).
    pub fn set_run_number(&mut self, run_number: u32) {
        self.identity.run_number = run_number;
    }

    /// Called from within `Unfolder::unfold` to stamp the identity of a
    /// freshly-pooled child event. The `Split` arrow sets the child's
    /// parent link separately once `unfold` returns (§4.2, §4.4).
    pub fn stamp_as_child(&mut self, event_number: u64, run_number: u32, level: Level) {
        self.identity = EventIdentity::new(event_number, run_number, level);
    }

    pub(crate) fn set_parent(&mut self, parent_event_number: Option<u64>) {
        self.parent_event_number = parent_event_number;
    }

    pub(crate) fn factories_mut(&mut self) -> &mut FactorySet {
        &mut self.factories
    }

    pub fn event_number(&self) -> u64 {
        self.identity.event_number
    }

    pub fn run_number(&self) -> u32 {
        self.identity.run_number
    }

    pub fn level(&self) -> Level {
        self.identity.level
    }

    pub fn is_sequential(&self) -> bool {
        self.identity.is_sequential
    }

    pub fn identity(&self) -> EventIdentity {
        self.identity
    }

    pub fn location(&self) -> NumaLocation {
        self.location
    }

    pub fn parent_event_number(&self) -> Option<u64> {
        self.parent_event_number
    }

    /// Registers a factory that will be exercised lazily on `get`.
    pub fn register_factory<F: crate::factory::Factory + 'static>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) {
        self.factories.register(name, factory);
    }

    /// Returns the memoized outputs of the factory for `(T, tag)`, running
    /// it on first demand (§4.1's create-on-demand protocol).
    pub fn get<T: 'static>(&mut self, tag: &str) -> EngineResult<&[T]> {
        let identity = self.identity;
        self.factories.get::<T>(&identity, tag)
    }

    /// Inserts data directly, bypassing `process` (§4.1).
    pub fn insert<T: Send + 'static>(&mut self, objs: Vec<T>, tag: &str) {
        self.factories.insert(objs, tag);
    }

    /// Clears every factory's memoized output; called when the event is
    /// retired and returned to its pool.
    pub(crate) fn clear_data(&mut self) {
        self.factories.clear_all();
        self.parent_event_number = None;
        self.take_pending_sequential();
    }
}

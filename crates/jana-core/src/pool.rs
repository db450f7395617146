//! NUMA-partitioned free list of preallocated events (§4.2).

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;
use jana_types::NumaLocation;

use crate::event::Event;

/// A closure applied exactly once to each freshly constructed `Event`,
/// typically used to register the factories the topology needs. It is not
/// re-applied when an event is recycled — factories persist across reuse and
/// are only cleared, never reconstructed, matching the "init runs once per
/// factory object" contract of §4.1.
pub type EventBlueprint = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// Bounded, NUMA-sharded free list of events. `max_inflight_events` is the
/// total bound across all locations and is the engine's principal
/// backpressure knob.
pub struct EventPool {
    shards: Vec<ArrayQueue<Event>>,
    blueprint: EventBlueprint,
}

impl EventPool {
    pub fn new(locations: usize, max_inflight_events: usize, blueprint: EventBlueprint) -> Self {
        let locations = locations.max(1);
        let per_shard = (max_inflight_events.max(locations) + locations - 1) / locations;
        let shards = (0..locations)
            .map(|loc| {
                let queue = ArrayQueue::new(per_shard.max(1));
                for _ in 0..per_shard.max(1) {
                    let mut ev = Event::new(NumaLocation(loc));
                    blueprint(&mut ev);
                    let _ = queue.push(ev);
                }
                queue
            })
            .collect();
        Self { shards, blueprint }
    }

    fn shard(&self, location: NumaLocation) -> &ArrayQueue<Event> {
        &self.shards[location.index() % self.shards.len()]
    }

    /// Returns a cleared, ready-to-use event, or `None` if the pool is
    /// exhausted at this location (the caller should observe backpressure).
    pub fn get(&self, location: NumaLocation) -> Option<Event> {
        self.shard(location).pop()
    }

    /// Clears the event's factory caches and returns it to the free list.
    pub fn put(&self, mut event: Event, location: NumaLocation) {
        event.clear_data();
        // The shard was sized to hold every event ever handed out from it,
        // so this can only fail if an event is returned to the wrong shard.
        if self.shard(location).push(event).is_err() {
            tracing::warn!(?location, "event pool shard overflow on put; dropping event");
        }
    }

    pub fn capacity(&self, location: NumaLocation) -> usize {
        self.shard(location).capacity()
    }

    pub fn available(&self, location: NumaLocation) -> usize {
        self.shard(location).len()
    }

    pub fn total_capacity(&self) -> usize {
        self.shards.iter().map(|s| s.capacity()).sum()
    }

    pub fn locations(&self) -> usize {
        self.shards.len()
    }

    #[allow(dead_code)]
    fn blueprint(&self) -> &EventBlueprint {
        &self.blueprint
    }
}

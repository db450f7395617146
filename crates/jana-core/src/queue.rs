//! Bounded multi-producer multi-consumer mailbox connecting arrows (§4.3).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use jana_types::NumaLocation;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};

struct Shard<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    reserved: AtomicUsize,
}

impl<T> Shard<T> {
    fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }
}

/// A bounded MPMC queue, internally sharded by NUMA location. Per-location
/// FIFO order is preserved; no ordering is guaranteed across locations.
pub struct Queue<T: Send> {
    name: String,
    shards: Vec<Shard<T>>,
}

impl<T: Send> Queue<T> {
    pub fn new(name: impl Into<String>, locations: usize, capacity_per_location: usize) -> Self {
        let locations = locations.max(1);
        let shards = (0..locations)
            .map(|_| Shard {
                items: Mutex::new(VecDeque::with_capacity(capacity_per_location)),
                capacity: capacity_per_location,
                reserved: AtomicUsize::new(0),
            })
            .collect();
        Self {
            name: name.into(),
            shards,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn shard(&self, location: NumaLocation) -> &Shard<T> {
        &self.shards[location.index() % self.shards.len()]
    }

    /// Non-blocking. Bypasses the reserve/unreserve protocol every arrow fire
    /// uses, so a rejection here is a bug in the caller, not ordinary
    /// backpressure — every in-engine caller reserves room before it pops an
    /// input, so the only way to hit this is to push more than was reserved.
    pub fn try_push(&self, items: Vec<T>, location: NumaLocation) -> EngineResult<()> {
        let shard = self.shard(location);
        let mut guard = shard.items.lock();
        let used = guard.len() + shard.reserved();
        if used + items.len() > shard.capacity {
            return Err(EngineError::QueueOverflow {
                queue: self.name.clone(),
                capacity: shard.capacity,
            });
        }
        guard.extend(items);
        Ok(())
    }

    /// Returns up to `max` items, at least `min` if available; returns an
    /// empty vec without blocking if fewer than `min` are present.
    pub fn pop(&self, min: usize, max: usize, location: NumaLocation) -> Vec<T> {
        let shard = self.shard(location);
        let mut guard = shard.items.lock();
        if guard.len() < min {
            return Vec::new();
        }
        let n = max.min(guard.len());
        guard.drain(..n).collect()
    }

    /// Earmarks up to `count` (bounded by `max` and available room) slots
    /// without publishing items yet. Returns the number actually reserved.
    pub fn reserve(&self, count: usize, max: usize, location: NumaLocation) -> usize {
        let shard = self.shard(location);
        let guard = shard.items.lock();
        let room = shard.capacity.saturating_sub(guard.len() + shard.reserved());
        let granted = count.min(max).min(room);
        drop(guard);
        shard.reserved.fetch_add(granted, Ordering::AcqRel);
        granted
    }

    /// Releases a reservation without publishing anything.
    pub fn unreserve(&self, count: usize, location: NumaLocation) {
        self.shard(location).reserved.fetch_sub(count, Ordering::AcqRel);
    }

    /// Publishes `items` and releases `reserved` slots in one step.
    pub fn push_and_unreserve(&self, items: Vec<T>, reserved: usize, location: NumaLocation) {
        let shard = self.shard(location);
        let mut guard = shard.items.lock();
        guard.extend(items);
        drop(guard);
        shard.reserved.fetch_sub(reserved, Ordering::AcqRel);
    }

    pub fn size(&self, location: NumaLocation) -> usize {
        self.shard(location).items.lock().len()
    }

    pub fn reserved_count(&self, location: NumaLocation) -> usize {
        self.shard(location).reserved()
    }

    pub fn capacity(&self, location: NumaLocation) -> usize {
        self.shard(location).capacity
    }

    pub fn is_empty(&self, location: NumaLocation) -> bool {
        self.size(location) == 0
    }

    pub fn locations(&self) -> usize {
        self.shards.len()
    }
}

//! Convenience wrapper for cross-event shared state (§5).
//!
//! Queues and pools are the only mutable cross-thread state the engine
//! itself manages; anything an embedder's factories/processors want to
//! share across events (a histogram, a calibration cache) must be held in a
//! service object with explicit locking. `LockedResource` is that object.

use std::ops::{Deref, DerefMut};
use parking_lot::Mutex;

pub struct LockedResource<T> {
    inner: Mutex<T>,
}

impl<T> LockedResource<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn lock(&self) -> impl DerefMut<Target = T> + '_ {
        self.inner.lock()
    }
}

impl<T> Deref for LockedResource<T> {
    type Target = Mutex<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_gives_exclusive_mutable_access() {
        let counter = LockedResource::new(0u32);
        counter.with(|c| *c += 1);
        counter.with(|c| *c += 1);
        assert_eq!(*counter.lock(), 2);
    }
}

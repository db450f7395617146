//! Reference `Unfolder`/`Fold` implementations demonstrating hierarchical
//! levels (§4.2, §4.4): one parent fans out into a fixed number of children,
//! and a fold step waits for every child of a given parent before completing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use jana_components::{fail, CallbackError, Fold, Unfolder};
use jana_core::{Event, EventPool};
use jana_types::Level;

/// Splits each parent consumed into `fanout` `Subevent` children, stamping
/// each with a process-wide-unique event number.
pub struct FanoutUnfolder {
    fanout: usize,
    next_child_number: AtomicU64,
}

impl FanoutUnfolder {
    pub fn new(fanout: usize) -> Self {
        Self {
            fanout,
            next_child_number: AtomicU64::new(0),
        }
    }
}

impl Unfolder for FanoutUnfolder {
    fn unfold(&mut self, parent: &mut Event, pool: &EventPool) -> Result<Vec<Event>, CallbackError> {
        let mut children = Vec::with_capacity(self.fanout);
        for _ in 0..self.fanout {
            let mut child = pool
                .get(parent.location())
                .ok_or_else(|| fail("event pool exhausted while unfolding a parent"))?;
            let number = self.next_child_number.fetch_add(1, Ordering::SeqCst) + 1;
            child.stamp_as_child(number, parent.run_number(), Level::Subevent);
            children.push(child);
        }
        Ok(children)
    }
}

/// Groups children by `parent_event_number`; once `expected_children` for a
/// given parent have arrived, returns the first as the completed parent
/// marker and puts the remaining children back in the pool.
pub struct CollectingFold {
    expected_children: usize,
    pending: HashMap<u64, Vec<Event>>,
}

impl CollectingFold {
    pub fn new(expected_children: usize) -> Self {
        Self {
            expected_children,
            pending: HashMap::new(),
        }
    }
}

impl Fold for CollectingFold {
    fn fold(&mut self, child: Event, pool: &EventPool) -> Result<Option<Event>, CallbackError> {
        let parent_number = child
            .parent_event_number()
            .ok_or_else(|| fail("child event arrived at fold with no parent link"))?;
        let location = child.location();
        let bucket = self.pending.entry(parent_number).or_default();
        bucket.push(child);

        if bucket.len() < self.expected_children {
            return Ok(None);
        }

        let mut group = self.pending.remove(&parent_number).expect("just inserted above");
        let representative = group.remove(0);
        for leftover in group {
            pool.put(leftover, location);
        }
        Ok(Some(representative))
    }
}

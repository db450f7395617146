//! Assigns idle workers to runnable arrows (§4.5).

use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;

use crate::arrow::ArrowState;
use crate::topology::{ArrowId, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireResult {
    KeepGoing,
    ComeBackLater,
    Finished,
}

/// `next_assignment(worker_id, prior_assignment, last_result) -> Option<ArrowId>`.
pub trait Scheduler: Send + Sync {
    fn next_assignment(
        &self,
        topology: &Topology,
        worker_id: usize,
        prior: Option<ArrowId>,
        last_result: Option<FireResult>,
    ) -> Option<ArrowId>;

    fn on_release(&self, _topology: &Topology, _worker_id: usize, _arrow: ArrowId) {}
}

/// Default strategy: rotate through the arrow list, keeping a worker on its
/// prior assignment while it keeps reporting `KeepGoing`.
pub struct RoundRobinScheduler {
    cursor: AtomicUsize,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RoundRobinScheduler {
    fn next_assignment(
        &self,
        topology: &Topology,
        _worker_id: usize,
        prior: Option<ArrowId>,
        last_result: Option<FireResult>,
    ) -> Option<ArrowId> {
        if let (Some(prior), Some(FireResult::KeepGoing)) = (prior, last_result) {
            if topology.arrow(prior).try_claim() {
                return Some(prior);
            }
        }
        if let Some(prior) = prior {
            topology.arrow(prior).release_claim();
        }

        let n = topology.arrow_count();
        if n == 0 {
            return None;
        }
        let start = self.cursor.load(Ordering::Relaxed);
        for offset in 0..n {
            let idx = (start + offset) % n;
            let id = ArrowId(idx);
            let arrow = topology.arrow(id);
            if arrow.status() == ArrowState::Active && arrow.try_claim() {
                self.cursor.store((idx + 1) % n, Ordering::Relaxed);
                return Some(id);
            }
        }
        None
    }

    fn on_release(&self, topology: &Topology, _worker_id: usize, arrow: ArrowId) {
        topology.arrow(arrow).release_claim();
    }
}

/// Manual worker-id -> arrow mapping, with atomic `rebalance`.
pub struct FixedScheduler {
    assignments: Mutex<Vec<ArrowId>>,
}

impl FixedScheduler {
    pub fn new(assignments: Vec<ArrowId>) -> Self {
        Self {
            assignments: Mutex::new(assignments),
        }
    }

    /// Atomically moves `delta` worker slots from `from` to `to`.
    pub fn rebalance(&self, from: ArrowId, to: ArrowId, delta: usize) {
        let mut assignments = self.assignments.lock();
        let mut moved = 0;
        for slot in assignments.iter_mut() {
            if moved >= delta {
                break;
            }
            if *slot == from {
                *slot = to;
                moved += 1;
            }
        }
    }
}

impl Scheduler for FixedScheduler {
    fn next_assignment(
        &self,
        topology: &Topology,
        worker_id: usize,
        prior: Option<ArrowId>,
        last_result: Option<FireResult>,
    ) -> Option<ArrowId> {
        if let (Some(prior), Some(FireResult::KeepGoing)) = (prior, last_result) {
            if topology.arrow(prior).try_claim() {
                return Some(prior);
            }
        }
        if let Some(prior) = prior {
            topology.arrow(prior).release_claim();
        }

        let assignments = self.assignments.lock();
        let target = *assignments.get(worker_id % assignments.len().max(1))?;
        drop(assignments);
        let arrow = topology.arrow(target);
        if arrow.status() == ArrowState::Active && arrow.try_claim() {
            Some(target)
        } else {
            None
        }
    }

    fn on_release(&self, topology: &Topology, _worker_id: usize, arrow: ArrowId) {
        topology.arrow(arrow).release_claim();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyBuilder;

    fn empty_topology() -> Topology {
        TopologyBuilder::new().build().unwrap()
    }

    #[test]
    fn round_robin_returns_none_on_empty_topology() {
        let topo = empty_topology();
        let sched = RoundRobinScheduler::new();
        assert_eq!(sched.next_assignment(&topo, 0, None, None), None);
    }
}

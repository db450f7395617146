use serde::{Deserialize, Serialize};

/// Nesting tier in the event hierarchy, e.g. `Timeslice` -> `PhysicsEvent` -> `Subevent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Run,
    Block,
    Timeslice,
    PhysicsEvent,
    Subevent,
    None,
}

impl Default for Level {
    fn default() -> Self {
        Level::None
    }
}

impl Level {
    /// True if `self` may be the hierarchical parent of `child` (§4.2): a
    /// parent must sit strictly above its child in the declared
    /// Run > Block > Timeslice > PhysicsEvent > Subevent nesting order.
    /// `None` never parents and is never parented.
    pub fn can_parent(self, child: Level) -> bool {
        self != Level::None && child != Level::None && self < child
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

use serde::{Deserialize, Serialize};

/// A partition of pool and queue storage aligned to a memory affinity domain.
///
/// `NumaLocation(0)` is always valid; engines that don't care about NUMA
/// topology can simply use a single location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NumaLocation(pub usize);

impl NumaLocation {
    pub const DEFAULT: NumaLocation = NumaLocation(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl Default for NumaLocation {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<usize> for NumaLocation {
    fn from(v: usize) -> Self {
        NumaLocation(v)
    }
}

impl std::fmt::Display for NumaLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "numa{}", self.0)
    }
}

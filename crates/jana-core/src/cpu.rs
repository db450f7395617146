//! Hardware thread count and CPU pinning helpers.
//!
//! Mirrors the original engine's one-time cached CPU query (`JCpuInfo`)
//! rather than re-querying the OS on every `scale` call.

use once_cell::sync::OnceCell;

static LOGICAL_CORES: OnceCell<usize> = OnceCell::new();

/// Cached `std::thread::available_parallelism()`, falling back to 1 if the
/// platform can't report it.
pub fn available_parallelism() -> usize {
    *LOGICAL_CORES.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Resolves the `nthreads` parameter's `"Ncores"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCount {
    Count(usize),
    AllCores,
}

impl ThreadCount {
    pub fn resolve(self) -> usize {
        match self {
            ThreadCount::Count(n) => n.max(1),
            ThreadCount::AllCores => available_parallelism(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_cores_resolves_to_a_positive_count() {
        assert!(ThreadCount::AllCores.resolve() >= 1);
    }

    #[test]
    fn explicit_count_resolves_unchanged() {
        assert_eq!(ThreadCount::Count(4).resolve(), 4);
    }
}

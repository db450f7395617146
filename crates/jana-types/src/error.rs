use thiserror::Error;

/// Errors surfaced by the shared domain types themselves, as opposed to
/// engine-level failures (see `jana_core::error::EngineError`).
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DomainError {
    #[error("run number went backwards: saw {new} after {previous}")]
    RunNumberRegressed { previous: u32, new: u32 },

    #[error("invalid level transition: {0:?} cannot parent {1:?}")]
    InvalidLevelNesting(crate::level::Level, crate::level::Level),
}

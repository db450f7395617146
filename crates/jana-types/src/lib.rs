//! Shared identity and addressing types used across the engine and its
//! satellite crates: event identity, nesting level, NUMA location, and the
//! domain-level error type.

pub mod error;
pub mod identity;
pub mod level;
pub mod numa;

pub use error::DomainError;
pub use identity::EventIdentity;
pub use level::Level;
pub use numa::NumaLocation;

//! jana-components: the interfaces an embedder implements (§6).
//!
//! The engine crate owns `Source`, `Processor`, `Fold`, and `Unfolder`
//! because the worker loop has to call them directly; this crate re-exports
//! them as the stable, embedder-facing surface, alongside a small
//! convenience for turning a plain message into the boxed error every
//! callback returns.

pub mod error;

pub use error::fail;
pub use jana_core::arrow::{CallbackError, CallbackResult, EmitStatus, Fold, Processor, Source, Unfolder};
pub use jana_core::factory::Factory;

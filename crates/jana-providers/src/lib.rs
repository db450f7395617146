//! jana-providers: reference `Source`/`Processor`/`Factory` implementations
//! used by the demo binary and the engine's own integration tests.

pub mod factory;
pub mod hierarchy;
pub mod processor;
pub mod source;

pub use factory::SquaredFactory;
pub use hierarchy::{CollectingFold, FanoutUnfolder};
pub use processor::{BarrierCheckingProcessor, CountingProcessor, FlakyProcessor};
pub use source::{BrokenSource, CountingSource, StallingSource};

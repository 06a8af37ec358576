pub mod cycle;
pub mod dedupe;
pub mod error;
pub mod evaluator;
pub mod resolver;
pub mod store;

#[cfg(test)]
pub(crate) mod memory;

pub use cycle::{AlertCycle, CycleReport, Dispatch, EngineConfig, TickOutcome};
pub use error::EngineError;

//! Engine facade: wires config, queue, worker pool and progress
//! aggregation together and drives jobs through fetch and conversion.

mod runner;
mod types;

pub use runner::Engine;
pub use types::{EngineError, EngineStatus};

//! Queue manager: owns the ordered job table and is the sole mutator
//! of job state.

mod error;
mod events;
mod manager;

pub use error::QueueError;
pub use events::QueueEvent;
pub use manager::{QueueCounts, QueueManager};

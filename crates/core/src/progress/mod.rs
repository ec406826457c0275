//! Progress aggregation: folds the queue's event stream into a
//! read-only snapshot for display layers.

mod aggregator;
mod types;

pub use aggregator::ProgressAggregator;
pub use types::{JobProgress, QueueSnapshot, QueueSummary};

//! Test doubles for the fetcher and converter adapters.

mod mock_converter;
mod mock_fetcher;

pub use mock_converter::{MockConverter, RecordedConversion};
pub use mock_fetcher::MockFetcher;

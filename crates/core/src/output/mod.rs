//! Output destination resolution.

mod layout;

pub use layout::{sanitize_name, unique_path, OutputError, OutputLayout};

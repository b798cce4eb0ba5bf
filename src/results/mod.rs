//! Result types and container for search results
//!
//! This module defines the rows a search produces, the extension filter
//! applied to them, and the run-scoped container that deduplicates them.

mod container;
pub mod export;
mod filter;
mod types;

pub use container::ResultSet;
pub use export::{render, OutputFormat};
pub use filter::ExtensionFilter;
pub use types::*;

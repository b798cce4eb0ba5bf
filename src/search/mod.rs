//! Search orchestration module
//!
//! Runs one statement per term against a data source, deduplicates the
//! rows by absolute path and filters them by extension.

mod error;
mod executor;
mod models;

pub use error::SearchError;
pub use executor::IndexSearch;
pub use models::*;

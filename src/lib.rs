//! index-query: per-term full-text queries against the Windows Search index
//!
//! Builds one statement per search term, runs them in order over a single
//! connection, and aggregates the rows into a list of files deduplicated by
//! absolute path and filtered by extension.

pub mod config;
pub mod query;
pub mod results;
pub mod search;
pub mod source;

pub use config::Settings;
pub use query::{Column, QueryBuildError, QueryBuilder, TermQuery};
pub use results::{ExtensionFilter, ResultRow};
pub use search::{CancellationToken, IndexSearch, SearchError, SearchOutcome, SearchRequest};
pub use source::{ConnectionProvider, SearchConnection, SearchCursor, SourceError};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

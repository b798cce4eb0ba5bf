//! Aggregation errors

use crate::source::SourceError;
use thiserror::Error;

/// Fatal errors that abort an aggregation run
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The provider could not open a connection
    #[error("failed to connect to {provider}: {source}")]
    Connection {
        provider: String,
        #[source]
        source: SourceError,
    },

    /// A statement could not be opened, or its first row could not be reached
    #[error("failed to run query for {term:?}\n\t{query}\n\t: {source}")]
    Query {
        term: String,
        query: String,
        #[source]
        source: SourceError,
    },

    /// The run was cancelled
    #[error("search cancelled after {completed_terms} of {total_terms} terms")]
    Cancelled {
        completed_terms: usize,
        total_terms: usize,
    },
}

impl SearchError {
    /// Statement text for query errors
    pub fn query(&self) -> Option<&str> {
        match self {
            Self::Query { query, .. } => Some(query),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

//! Result type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A matching file, attributed to the term that first found it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Search term whose statement discovered the file
    pub term: String,
    /// Directory containing the file
    pub folder: String,
    /// Name of the file
    pub file_name: String,
    /// Extra projected columns, by property name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ResultRow {
    /// Create a new result row
    pub fn new(term: impl Into<String>, folder: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            folder: folder.into(),
            file_name: file_name.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Attach an extra column value
    pub fn with_extra(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(column.into(), value.into());
        self
    }

    /// The (term, folder, file name) triple
    pub fn as_tuple(&self) -> (&str, &str, &str) {
        (&self.term, &self.folder, &self.file_name)
    }
}

/// Per-term timing information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermTiming {
    /// Search term
    pub term: String,
    /// Time spent on the term's statement in milliseconds
    pub time_ms: u64,
    /// Rows the index returned, before dedup and filtering
    pub rows_seen: usize,
    /// Rows emitted for this term
    pub rows_emitted: usize,
}

/// A cursor that failed to advance during a row walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceFailure {
    /// Search term being walked
    pub term: String,
    /// Statement text
    pub query: String,
    /// Index of the row the cursor failed to leave
    pub row: usize,
    /// Error reported by the data source
    pub message: String,
    /// Whether the term's walk was given up after this failure
    pub abandoned: bool,
}

//! Search request and related data models

use crate::query::{Column, QueryBuildError, QueryBuilder, TermQuery};
use crate::results::{AdvanceFailure, ExtensionFilter, ResultRow, ResultSet, TermTiming};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A complete, validated search: one statement per term
#[derive(Debug, Clone)]
pub struct SearchRequest {
    root_path: String,
    terms: Vec<String>,
    columns: Vec<Column>,
    queries: Vec<TermQuery>,
    extensions: ExtensionFilter,
}

impl SearchRequest {
    /// Build a request scoped to `root_path` for `terms`
    pub fn new<S: AsRef<str>>(
        root_path: impl Into<String>,
        terms: &[S],
        extensions: ExtensionFilter,
    ) -> Result<Self, QueryBuildError> {
        let root_path = root_path.into();
        let builder = QueryBuilder::new(root_path.clone());
        let queries = builder.build(terms)?;

        Ok(Self {
            root_path,
            terms: terms.iter().map(|t| t.as_ref().to_string()).collect(),
            columns: builder.projection().to_vec(),
            queries,
            extensions,
        })
    }

    /// Project additional columns, rebuilding the statements
    pub fn with_columns<I, C>(mut self, extra: I) -> Result<Self, QueryBuildError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        let builder = QueryBuilder::new(self.root_path.clone())
            .columns(self.columns.iter().cloned())
            .columns(extra);
        self.queries = builder.build(&self.terms)?;
        self.columns = builder.projection().to_vec();
        Ok(self)
    }

    /// Directory the search is scoped to
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Statements in term order
    pub fn queries(&self) -> &[TermQuery] {
        &self.queries
    }

    /// Projected columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Projected columns beyond the required ones
    pub fn extra_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_required())
    }

    /// Accepted extensions
    pub fn extensions(&self) -> &ExtensionFilter {
        &self.extensions
    }
}

/// Result of a completed aggregation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Matching files, in term order then discovery order
    pub rows: Vec<ResultRow>,
    /// Per-term timings
    pub timings: Vec<TermTiming>,
    /// Non-fatal cursor advance failures
    pub advance_failures: Vec<AdvanceFailure>,
    /// Terms whose statement returned no rows
    pub skipped_terms: Vec<String>,
}

impl SearchOutcome {
    /// The rows, dropping diagnostics
    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl From<ResultSet> for SearchOutcome {
    fn from(set: ResultSet) -> Self {
        let (rows, timings, advance_failures, skipped_terms) = set.into_parts();
        Self {
            rows,
            timings,
            advance_failures,
            skipped_terms,
        }
    }
}

/// Cooperative cancellation flag, checked between terms and between rows
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

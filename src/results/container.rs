//! Result set for aggregating and deduplicating per-term results

use super::types::*;
use std::collections::HashSet;

/// Rows collected during one aggregation run
///
/// Every absolute path is claimed at most once; the first term to claim a
/// path owns it for the rest of the run. Rows keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Absolute paths already seen, for deduplication
    seen: HashSet<String>,
    /// Emitted rows, in discovery order
    rows: Vec<ResultRow>,
    /// Per-term timings
    timings: Vec<TermTiming>,
    /// Cursor advance failures
    advance_failures: Vec<AdvanceFailure>,
    /// Terms whose statement returned no rows
    skipped_terms: Vec<String>,
}

impl ResultSet {
    /// Create a new empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an absolute path, returning false if it was already seen
    pub fn claim(&mut self, path: &str) -> bool {
        if self.is_claimed(path) {
            false
        } else {
            self.seen.insert(path.to_string());
            true
        }
    }

    /// Check whether a path has been claimed
    pub fn is_claimed(&self, path: &str) -> bool {
        self.seen.contains(path)
    }

    /// Append a row
    pub fn push(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    /// Record term timing
    pub fn add_timing(&mut self, timing: TermTiming) {
        self.timings.push(timing);
    }

    /// Record a failed cursor advance
    pub fn add_advance_failure(&mut self, failure: AdvanceFailure) {
        self.advance_failures.push(failure);
    }

    /// Record a term that produced no rows
    pub fn add_skipped(&mut self, term: impl Into<String>) {
        self.skipped_terms.push(term.into());
    }

    /// Emitted rows
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Get timings
    pub fn timings(&self) -> &[TermTiming] {
        &self.timings
    }

    /// Get advance failures
    pub fn advance_failures(&self) -> &[AdvanceFailure] {
        &self.advance_failures
    }

    /// Get skipped terms
    pub fn skipped_terms(&self) -> &[String] {
        &self.skipped_terms
    }

    /// Number of emitted rows
    pub fn result_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of distinct paths seen, emitted or not
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Split into rows, timings, advance failures and skipped terms
    pub fn into_parts(self) -> (Vec<ResultRow>, Vec<TermTiming>, Vec<AdvanceFailure>, Vec<String>) {
        (self.rows, self.timings, self.advance_failures, self.skipped_terms)
    }
}

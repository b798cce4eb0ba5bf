//! Search execution and aggregation

use super::error::SearchError;
use super::models::{CancellationToken, SearchOutcome, SearchRequest};
use crate::config::ConnectionSettings;
use crate::query::Column;
use crate::results::{AdvanceFailure, ResultRow, ResultSet, TermTiming};
use crate::source::{ConnectionProvider, SearchConnection, SearchCursor, SourceError};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Search executor that runs every term of a request over one connection
pub struct IndexSearch {
    /// Data source provider
    provider: Arc<dyn ConnectionProvider>,
    /// Connection settings handed to the provider
    settings: ConnectionSettings,
}

impl IndexSearch {
    /// Create a new search executor
    pub fn new(provider: Arc<dyn ConnectionProvider>, settings: ConnectionSettings) -> Self {
        Self { provider, settings }
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Execute a request
    pub fn execute(&self, request: &SearchRequest) -> Result<SearchOutcome, SearchError> {
        self.execute_with_cancel(request, &CancellationToken::new())
    }

    /// Execute a request, stopping early once `cancel` is triggered
    ///
    /// Terms run strictly in order over a single connection. Any fatal error
    /// discards the rows gathered so far. The connection and any open cursor
    /// are released on every exit path.
    pub fn execute_with_cancel(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let start = Instant::now();
        let provider = self.provider.name().to_string();

        let connection = self
            .provider
            .open(&self.settings)
            .map_err(|source| SearchError::Connection {
                provider: provider.clone(),
                source,
            })?;
        let mut connection = ConnectionGuard::new(connection, provider);
        connection.set_command_timeout(self.settings.timeout());

        let total = request.queries().len();
        info!(
            "Executing {} queries under {} on {}",
            total,
            request.root_path(),
            connection.provider
        );

        let mut results = ResultSet::new();
        for (idx, query) in request.queries().iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                Err(SearchError::Cancelled {
                    completed_terms: idx,
                    total_terms: total,
                })
            } else {
                self.run_term(&mut connection, request, idx, cancel, &mut results)
            };

            if let Err(e) = outcome {
                warn!(
                    "Search aborted on term {:?}, discarding {} rows: {}",
                    query.term,
                    results.result_count(),
                    e
                );
                return Err(e);
            }
        }

        info!(
            "Search returned {} files ({} distinct paths seen) in {:?}",
            results.result_count(),
            results.seen_count(),
            start.elapsed()
        );
        Ok(results.into())
    }

    /// Walk the result set of a single term
    fn run_term(
        &self,
        connection: &mut ConnectionGuard,
        request: &SearchRequest,
        idx: usize,
        cancel: &CancellationToken,
        results: &mut ResultSet,
    ) -> Result<(), SearchError> {
        let start = Instant::now();
        let query = &request.queries()[idx];
        let query_error = |source: SourceError| SearchError::Query {
            term: query.term.clone(),
            query: query.text.clone(),
            source,
        };

        let cursor = connection.open_cursor(&query.text).map_err(query_error)?;
        let mut cursor = CursorGuard(cursor);

        if let Err(e) = cursor.move_first() {
            // An empty result set refuses to position; that is not a failure
            if cursor.is_at_end() {
                debug!("No results for term {:?}", query.term);
                results.add_skipped(query.term.clone());
                results.add_timing(TermTiming {
                    term: query.term.clone(),
                    time_ms: start.elapsed().as_millis() as u64,
                    rows_seen: 0,
                    rows_emitted: 0,
                });
                return Ok(());
            }
            return Err(query_error(e));
        }

        let max_failures = self.settings.max_advance_failures.max(1);
        let emitted_before = results.result_count();
        let mut position = 0usize;
        let mut rows_seen = 0usize;
        let mut fresh = true;
        let mut consecutive_failures = 0u32;

        while !cursor.is_at_end() {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled {
                    completed_terms: idx,
                    total_terms: request.queries().len(),
                });
            }
            if fresh {
                rows_seen += 1;
            }

            let path = cursor
                .field(Column::ItemPathDisplay.as_str())
                .map_err(query_error)?
                .as_text();

            match path {
                Some(path) => {
                    if results.claim(&path) {
                        let extension = cursor
                            .field(Column::FileExtension.as_str())
                            .map_err(query_error)?
                            .as_text()
                            .unwrap_or_default();

                        if request.extensions().accepts(&extension) {
                            let row =
                                read_row(&*cursor, request, &query.term).map_err(query_error)?;
                            results.push(row);
                        }
                    }
                }
                None => warn!(
                    "Row {} of term {:?} has no path, skipping",
                    position, query.term
                ),
            }

            match cursor.move_next() {
                Ok(()) => {
                    position += 1;
                    fresh = true;
                    consecutive_failures = 0;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    fresh = false;
                    let abandoned = consecutive_failures >= max_failures;
                    warn!(
                        "Failed to move next in query \n\t{}\n\t: {}",
                        query.text, e
                    );
                    results.add_advance_failure(AdvanceFailure {
                        term: query.term.clone(),
                        query: query.text.clone(),
                        row: position,
                        message: e.to_string(),
                        abandoned,
                    });
                    if abandoned {
                        warn!(
                            "Giving up on term {:?} after {} failed advances from row {}",
                            query.term, consecutive_failures, position
                        );
                        break;
                    }
                }
            }
        }

        let rows_emitted = results.result_count() - emitted_before;
        debug!(
            "Term {:?} returned {} rows, {} emitted, in {:?}",
            query.term,
            rows_seen,
            rows_emitted,
            start.elapsed()
        );
        results.add_timing(TermTiming {
            term: query.term.clone(),
            time_ms: start.elapsed().as_millis() as u64,
            rows_seen,
            rows_emitted,
        });

        Ok(())
    }
}

/// Build the output row for the cursor's current position
fn read_row(
    cursor: &dyn SearchCursor,
    request: &SearchRequest,
    term: &str,
) -> Result<ResultRow, SourceError> {
    let folder = cursor
        .field(Column::ItemFolderPathDisplay.as_str())?
        .as_text()
        .unwrap_or_default();
    let name = cursor
        .field(Column::ItemName.as_str())?
        .as_text()
        .unwrap_or_default();

    let mut row = ResultRow::new(term, folder, name);
    for column in request.extra_columns() {
        if let Some(value) = cursor.field(column.as_str())?.as_text() {
            row = row.with_extra(column.as_str(), value);
        }
    }
    Ok(row)
}

/// Owns the connection for a run and closes it when dropped
struct ConnectionGuard {
    inner: Box<dyn SearchConnection>,
    provider: String,
}

impl ConnectionGuard {
    fn new(inner: Box<dyn SearchConnection>, provider: String) -> Self {
        Self { inner, provider }
    }
}

impl Deref for ConnectionGuard {
    type Target = dyn SearchConnection;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ConnectionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        match self.inner.close() {
            Ok(()) => debug!("Closed connection to {}", self.provider),
            Err(e) => warn!("Failed to close connection to {}: {}", self.provider, e),
        }
    }
}

/// Owns a cursor for one term and closes it when dropped
struct CursorGuard<'a>(Box<dyn SearchCursor + 'a>);

impl<'a> Deref for CursorGuard<'a> {
    type Target = dyn SearchCursor + 'a;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl<'a> DerefMut for CursorGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Failed to close cursor: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::ExtensionFilter;
    use crate::source::memory::SourceStats;
    use crate::source::{
        Document, FaultPlan, FieldValue, MemoryIndex, MemoryProvider, Record, RowCursor,
    };
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn docs() -> MemoryIndex {
        MemoryIndex::new(vec![
            Document::new(r"C:\docs\a.pdf", "invoice report"),
            Document::new(r"C:\docs\b.txt", "invoice"),
            Document::new(r"C:\docs\c.pdf", "report"),
        ])
    }

    fn request(terms: &[&str]) -> SearchRequest {
        SearchRequest::new(r"C:\docs", terms, ExtensionFilter::new([".pdf"])).unwrap()
    }

    fn search(provider: &MemoryProvider) -> IndexSearch {
        IndexSearch::new(Arc::new(provider.clone()), ConnectionSettings::default())
    }

    #[test]
    fn test_dedup_and_filter() {
        let provider = MemoryProvider::new(docs());
        let outcome = search(&provider).execute(&request(&["invoice", "report"])).unwrap();

        let rows: Vec<_> = outcome.rows.iter().map(ResultRow::as_tuple).collect();
        assert_eq!(
            rows,
            vec![("invoice", r"C:\docs", "a.pdf"), ("report", r"C:\docs", "c.pdf")]
        );
        assert_eq!(outcome.timings.len(), 2);
        assert_eq!(outcome.timings[0].rows_seen, 2);
        assert_eq!(outcome.timings[0].rows_emitted, 1);
        assert_eq!(provider.stats().outstanding(), (0, 0));
    }

    #[test]
    fn test_empty_term_is_skipped() {
        let provider = MemoryProvider::new(docs());
        let outcome = search(&provider)
            .execute(&request(&["nothing", "report"]))
            .unwrap();

        assert_eq!(outcome.skipped_terms, vec!["nothing"]);
        assert_eq!(outcome.len(), 2);
        assert_eq!(outcome.rows[0].term, "report");
    }

    #[test]
    fn test_open_failure_aborts_and_releases() {
        let provider = MemoryProvider::new(docs()).with_faults(FaultPlan::new().fail_open("report"));
        let err = search(&provider)
            .execute(&request(&["invoice", "report"]))
            .unwrap_err();

        match &err {
            SearchError::Query { term, query, .. } => {
                assert_eq!(term, "report");
                assert!(query.ends_with("CONTAINS('report')"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.stats().outstanding(), (0, 0));
    }

    #[test]
    fn test_positioning_failure_is_fatal() {
        let provider =
            MemoryProvider::new(docs()).with_faults(FaultPlan::new().fail_positioning("invoice"));
        let err = search(&provider)
            .execute(&request(&["invoice", "report"]))
            .unwrap_err();

        assert!(matches!(err, SearchError::Query { ref term, .. } if term == "invoice"));
        assert_eq!(provider.stats().outstanding(), (0, 0));
    }

    #[test]
    fn test_connection_failure() {
        let provider = MemoryProvider::new(docs()).with_faults(FaultPlan::new().fail_connect());
        let err = search(&provider).execute(&request(&["invoice"])).unwrap_err();
        assert!(matches!(err, SearchError::Connection { .. }));
    }

    #[test]
    fn test_transient_advance_failure_continues() {
        let provider =
            MemoryProvider::new(docs()).with_faults(FaultPlan::new().fail_advance("invoice", 0, 2));
        let outcome = search(&provider)
            .execute(&request(&["invoice", "report"]))
            .unwrap();

        assert_eq!(outcome.advance_failures.len(), 2);
        assert!(outcome.advance_failures.iter().all(|f| !f.abandoned && f.row == 0));
        let names: Vec<_> = outcome.rows.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "c.pdf"]);
        assert_eq!(outcome.timings[0].rows_seen, 2);
    }

    #[test]
    fn test_persistent_advance_failure_abandons_term() {
        let provider =
            MemoryProvider::new(docs()).with_faults(FaultPlan::new().fail_advance("invoice", 0, 100));
        let settings = ConnectionSettings {
            max_advance_failures: 3,
            ..Default::default()
        };
        let outcome = IndexSearch::new(Arc::new(provider.clone()), settings)
            .execute(&request(&["invoice", "report"]))
            .unwrap();

        assert_eq!(outcome.advance_failures.len(), 3);
        assert!(outcome.advance_failures[2].abandoned);
        let rows: Vec<_> = outcome.rows.iter().map(ResultRow::as_tuple).collect();
        assert_eq!(
            rows,
            vec![("invoice", r"C:\docs", "a.pdf"), ("report", r"C:\docs", "c.pdf")]
        );
        assert_eq!(provider.stats().outstanding(), (0, 0));
    }

    #[test]
    fn test_cancelled_before_start() {
        let provider = MemoryProvider::new(docs());
        let token = CancellationToken::new();
        token.cancel();

        let err = search(&provider)
            .execute_with_cancel(&request(&["invoice", "report"]), &token)
            .unwrap_err();

        assert!(matches!(
            err,
            SearchError::Cancelled {
                completed_terms: 0,
                total_terms: 2
            }
        ));
        assert_eq!(provider.stats().outstanding(), (0, 0));
    }

    #[test]
    fn test_extra_columns_are_copied() {
        let index = MemoryIndex::new(vec![
            Document::new(r"C:\docs\a.pdf", "invoice").with_property("System.Size", "2048"),
        ]);
        let provider = MemoryProvider::new(index);
        let request = request(&["invoice"]).with_columns(["System.Size"]).unwrap();

        let outcome = search(&provider).execute(&request).unwrap();
        assert_eq!(outcome.rows[0].extra["System.Size"], "2048");
    }

    /// Serves the same rows for every statement, optionally cancelling a
    /// token whenever the cursor advances
    struct FixedRows {
        rows: Vec<Record>,
        cancel_on_advance: Option<CancellationToken>,
        stats: Arc<SourceStats>,
    }

    impl FixedRows {
        fn new(rows: Vec<Record>) -> Self {
            Self {
                rows,
                cancel_on_advance: None,
                stats: Arc::new(SourceStats::default()),
            }
        }
    }

    impl ConnectionProvider for FixedRows {
        fn name(&self) -> &str {
            "fixed"
        }

        fn open(
            &self,
            _settings: &ConnectionSettings,
        ) -> Result<Box<dyn SearchConnection>, SourceError> {
            self.stats.connections_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedConnection {
                rows: self.rows.clone(),
                cancel_on_advance: self.cancel_on_advance.clone(),
                stats: self.stats.clone(),
            }))
        }
    }

    struct FixedConnection {
        rows: Vec<Record>,
        cancel_on_advance: Option<CancellationToken>,
        stats: Arc<SourceStats>,
    }

    impl SearchConnection for FixedConnection {
        fn command_timeout(&self) -> Option<Duration> {
            None
        }

        fn set_command_timeout(&mut self, _timeout: Option<Duration>) {}

        fn open_cursor<'a>(
            &'a mut self,
            _query: &str,
        ) -> Result<Box<dyn SearchCursor + 'a>, SourceError> {
            self.stats.cursors_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FixedCursor {
                inner: RowCursor::new(self.rows.clone()),
                cancel_on_advance: self.cancel_on_advance.clone(),
                stats: self.stats.clone(),
            }))
        }

        fn close(&mut self) -> Result<(), SourceError> {
            self.stats.connections_closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedCursor {
        inner: RowCursor,
        cancel_on_advance: Option<CancellationToken>,
        stats: Arc<SourceStats>,
    }

    impl SearchCursor for FixedCursor {
        fn is_at_end(&self) -> bool {
            self.inner.is_at_end()
        }

        fn move_first(&mut self) -> Result<(), SourceError> {
            self.inner.move_first()
        }

        fn move_next(&mut self) -> Result<(), SourceError> {
            if let Some(token) = &self.cancel_on_advance {
                token.cancel();
            }
            self.inner.move_next()
        }

        fn field(&self, name: &str) -> Result<FieldValue, SourceError> {
            self.inner.field(name)
        }

        fn close(&mut self) -> Result<(), SourceError> {
            self.inner.close()?;
            self.stats.cursors_closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record(path: Option<&str>, name: &str) -> Record {
        let mut record = Record::new();
        record.insert(
            Column::ItemPathDisplay.as_str().to_string(),
            path.map(FieldValue::from).unwrap_or_default(),
        );
        record.insert(Column::ItemName.as_str().to_string(), FieldValue::from(name));
        record.insert(
            Column::ItemFolderPathDisplay.as_str().to_string(),
            FieldValue::from(r"C:\docs"),
        );
        record.insert(Column::FileExtension.as_str().to_string(), FieldValue::from(".pdf"));
        record
    }

    #[test]
    fn test_cancelled_between_rows() {
        let token = CancellationToken::new();
        let provider = Arc::new(FixedRows {
            cancel_on_advance: Some(token.clone()),
            ..FixedRows::new(vec![
                record(Some(r"C:\docs\a.pdf"), "a.pdf"),
                record(Some(r"C:\docs\b.pdf"), "b.pdf"),
            ])
        });

        let err = IndexSearch::new(provider.clone(), ConnectionSettings::default())
            .execute_with_cancel(&request(&["invoice", "report"]), &token)
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(matches!(
            err,
            SearchError::Cancelled {
                completed_terms: 0,
                total_terms: 2
            }
        ));
        assert_eq!(provider.stats.outstanding(), (0, 0));
    }

    #[test]
    fn test_row_without_path_is_skipped() {
        let provider = Arc::new(FixedRows::new(vec![
            record(None, "ghost.pdf"),
            record(Some(r"C:\docs\a.pdf"), "a.pdf"),
        ]));

        let outcome = IndexSearch::new(provider.clone(), ConnectionSettings::default())
            .execute(&request(&["invoice"]))
            .unwrap();

        let names: Vec<_> = outcome.rows.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf"]);
        assert_eq!(outcome.timings[0].rows_seen, 2);
        assert_eq!(outcome.timings[0].rows_emitted, 1);
        assert!(outcome.advance_failures.is_empty());
        assert_eq!(provider.stats.outstanding(), (0, 0));
    }

    #[test]
    fn test_unavailable_provider() {
        struct Offline;
        impl ConnectionProvider for Offline {
            fn name(&self) -> &str {
                "offline"
            }
            fn open(
                &self,
                _settings: &ConnectionSettings,
            ) -> Result<Box<dyn SearchConnection>, SourceError> {
                Err(SourceError::Unavailable("offline".to_string()))
            }
        }

        let search = IndexSearch::new(Arc::new(Offline), ConnectionSettings::default());
        assert_eq!(search.provider_name(), "offline");
        let err = search.execute(&request(&["x"])).unwrap_err();
        assert!(matches!(
            err,
            SearchError::Connection {
                source: SourceError::Unavailable(_),
                ..
            }
        ));
    }
}

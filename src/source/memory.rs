//! In-memory index backend
//!
//! Evaluates the generated statements against a fixed list of documents.
//! Used for fixtures, offline runs and tests; supports injecting the
//! failures a real index can produce.

use super::cursor::{Record, RowCursor};
use super::traits::{ConnectionProvider, FieldValue, SearchConnection, SearchCursor, SourceError};
use crate::config::ConnectionSettings;
use crate::query::{unescape_literal, Column};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

static SELECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*SELECT\s+(.+?)\s+FROM\s+SystemIndex\b").unwrap());
static SCOPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)SCOPE\s*=\s*'file:((?:[^']|'')*)'").unwrap());
static CONTAINS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)CONTAINS\s*\(\s*'((?:[^']|'')*)'\s*\)").unwrap());

/// A file known to the in-memory index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    /// Absolute path, `\` or `/` separated
    pub path: String,
    /// Searchable text content
    pub content: String,
    /// Extra index properties, by property name
    pub properties: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Attach an extra property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// File name component of the path
    pub fn file_name(&self) -> &str {
        split_path(&self.path).1
    }

    /// Directory component of the path
    pub fn folder(&self) -> &str {
        split_path(&self.path).0
    }

    /// Extension with leading dot, if any
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rfind('.').map(|idx| &name[idx..])
    }

    fn value_of(&self, column: &Column) -> FieldValue {
        match column {
            Column::ItemName => FieldValue::from(self.file_name()),
            Column::ItemPathDisplay => FieldValue::from(self.path.as_str()),
            Column::ItemFolderPathDisplay => FieldValue::from(self.folder()),
            Column::FileExtension => self.extension().map(FieldValue::from).unwrap_or_default(),
            Column::Custom(name) => self.properties.get(name).cloned().unwrap_or_default(),
        }
    }

    fn in_scope(&self, scope: &str) -> bool {
        let path = normalize(&self.path);
        let scope = normalize(scope);
        let scope = scope.trim_end_matches('\\');
        match path.strip_prefix(scope) {
            Some(rest) => rest.is_empty() || rest.starts_with('\\'),
            None => false,
        }
    }

    fn contains(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.content.to_lowercase().contains(&term) || self.file_name().to_lowercase().contains(&term)
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rfind(|c: char| c == '\\' || c == '/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

fn normalize(path: &str) -> String {
    path.replace('/', "\\").to_lowercase()
}

/// Failures to inject, keyed by search term
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    fail_connect: bool,
    open_failures: HashSet<String>,
    positioning_failures: HashSet<String>,
    /// term -> (row index, number of failed advances from that row)
    advance_failures: HashMap<String, Vec<(usize, u32)>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to open connections
    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Fail opening the cursor for `term`
    pub fn fail_open(mut self, term: impl Into<String>) -> Self {
        self.open_failures.insert(term.into());
        self
    }

    /// Fail `move_first` for `term` even though rows exist
    pub fn fail_positioning(mut self, term: impl Into<String>) -> Self {
        self.positioning_failures.insert(term.into());
        self
    }

    /// Fail advancing from row `row` of `term` `times` times
    pub fn fail_advance(mut self, term: impl Into<String>, row: usize, times: u32) -> Self {
        self.advance_failures
            .entry(term.into())
            .or_default()
            .push((row, times));
        self
    }
}

/// Open/close counters, shared by everything a provider hands out
#[derive(Debug, Default)]
pub struct SourceStats {
    pub connections_opened: AtomicUsize,
    pub connections_closed: AtomicUsize,
    pub cursors_opened: AtomicUsize,
    pub cursors_closed: AtomicUsize,
}

impl SourceStats {
    /// Connections and cursors opened but not yet closed
    pub fn outstanding(&self) -> (usize, usize) {
        (
            self.connections_opened.load(Ordering::SeqCst)
                - self.connections_closed.load(Ordering::SeqCst),
            self.cursors_opened.load(Ordering::SeqCst) - self.cursors_closed.load(Ordering::SeqCst),
        )
    }
}

/// A set of documents answering index statements
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryIndex {
    pub documents: Vec<Document>,
}

impl MemoryIndex {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Load an index from a YAML fixture
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let index: MemoryIndex = serde_yaml::from_str(&content)?;
        Ok(index)
    }

    /// Evaluate a statement, returning the term it searched for and the matching rows
    pub fn evaluate(&self, query: &str) -> Result<(String, Vec<Record>), SourceError> {
        let columns: Vec<Column> = SELECT_RE
            .captures(query)
            .ok_or_else(|| SourceError::Open(format!("unsupported statement: {}", query)))?[1]
            .split(',')
            .map(|c| Column::from(c.trim()))
            .collect();
        let scope = SCOPE_RE
            .captures(query)
            .map(|cap| unescape_literal(&cap[1]))
            .ok_or_else(|| SourceError::Open("statement has no SCOPE clause".to_string()))?;
        let term = CONTAINS_RE
            .captures(query)
            .map(|cap| unescape_literal(&cap[1]))
            .ok_or_else(|| SourceError::Open("statement has no CONTAINS predicate".to_string()))?;

        let rows = self
            .documents
            .iter()
            .filter(|doc| doc.in_scope(&scope) && doc.contains(&term))
            .map(|doc| {
                columns
                    .iter()
                    .map(|column| (column.as_str().to_string(), doc.value_of(column)))
                    .collect::<Record>()
            })
            .collect();

        Ok((term, rows))
    }
}

/// Provider handing out connections to a [`MemoryIndex`]
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    index: Arc<MemoryIndex>,
    faults: Arc<FaultPlan>,
    stats: Arc<SourceStats>,
}

impl MemoryProvider {
    pub fn new(index: MemoryIndex) -> Self {
        Self {
            index: Arc::new(index),
            faults: Arc::new(FaultPlan::default()),
            stats: Arc::new(SourceStats::default()),
        }
    }

    /// Inject failures
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = Arc::new(faults);
        self
    }

    /// Open/close counters
    pub fn stats(&self) -> &SourceStats {
        &self.stats
    }
}

impl ConnectionProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, settings: &ConnectionSettings) -> Result<Box<dyn SearchConnection>, SourceError> {
        if self.faults.fail_connect {
            return Err(SourceError::Open("connection refused".to_string()));
        }
        self.stats.connections_opened.fetch_add(1, Ordering::SeqCst);
        debug!("Opened memory connection over {} documents", self.index.documents.len());
        Ok(Box::new(MemoryConnection {
            index: self.index.clone(),
            faults: self.faults.clone(),
            stats: self.stats.clone(),
            timeout: settings.timeout(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    index: Arc<MemoryIndex>,
    faults: Arc<FaultPlan>,
    stats: Arc<SourceStats>,
    timeout: Option<Duration>,
    closed: bool,
}

impl SearchConnection for MemoryConnection {
    fn command_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    fn open_cursor<'a>(&'a mut self, query: &str) -> Result<Box<dyn SearchCursor + 'a>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        let (term, rows) = self.index.evaluate(query)?;
        if self.faults.open_failures.contains(&term) {
            return Err(SourceError::Open(format!("index refused statement for {:?}", term)));
        }

        self.stats.cursors_opened.fetch_add(1, Ordering::SeqCst);
        let advance_faults = self
            .faults
            .advance_failures
            .get(&term)
            .map(|faults| faults.iter().copied().collect())
            .unwrap_or_default();

        Ok(Box::new(MemoryCursor {
            inner: RowCursor::new(rows),
            fail_positioning: self.faults.positioning_failures.contains(&term),
            advance_faults,
            stats: self.stats.clone(),
        }))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.closed = true;
        self.stats.connections_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryCursor {
    inner: RowCursor,
    fail_positioning: bool,
    advance_faults: HashMap<usize, u32>,
    stats: Arc<SourceStats>,
}

impl SearchCursor for MemoryCursor {
    fn is_at_end(&self) -> bool {
        self.inner.is_at_end()
    }

    fn move_first(&mut self) -> Result<(), SourceError> {
        if self.fail_positioning {
            return Err(SourceError::Backend("provider lost the rowset".to_string()));
        }
        self.inner.move_first()
    }

    fn move_next(&mut self) -> Result<(), SourceError> {
        let position = self.inner.position();
        if let Some(remaining) = self.advance_faults.get_mut(&position) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::Advance(format!(
                    "transient failure leaving row {}",
                    position
                )));
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;

    fn index() -> MemoryIndex {
        MemoryIndex::new(vec![
            Document::new(r"C:\docs\a.pdf", "Invoice and report"),
            Document::new(r"C:\docs\b.txt", "invoice draft"),
            Document::new(r"C:\docsarchive\old.pdf", "invoice"),
            Document::new(r"C:\other\c.pdf", "invoice"),
        ])
    }

    #[test]
    fn test_document_parts() {
        let doc = Document::new(r"C:\docs\sub\report.final.pdf", "");
        assert_eq!(doc.folder(), r"C:\docs\sub");
        assert_eq!(doc.file_name(), "report.final.pdf");
        assert_eq!(doc.extension(), Some(".pdf"));
        assert_eq!(Document::new(r"C:\docs\Makefile", "").extension(), None);
    }

    #[test]
    fn test_evaluate_scope_and_contains() {
        let queries = QueryBuilder::new(r"C:\docs").build(&["invoice"]).unwrap();
        let (term, rows) = index().evaluate(&queries[0].text).unwrap();

        assert_eq!(term, "invoice");
        let paths: Vec<_> = rows
            .iter()
            .map(|r| r["System.ItemPathDisplay"].as_text().unwrap())
            .collect();
        assert_eq!(paths, vec![r"C:\docs\a.pdf", r"C:\docs\b.txt"]);
        assert_eq!(rows[0]["System.FileExtension"], FieldValue::from(".pdf"));
        assert_eq!(rows[0]["System.ItemFolderPathDisplay"], FieldValue::from(r"C:\docs"));
    }

    #[test]
    fn test_evaluate_unescapes_term() {
        let index = MemoryIndex::new(vec![Document::new(r"C:\docs\n.txt", "letter to o'brien")]);
        let queries = QueryBuilder::new(r"C:\docs").build(&["o'brien"]).unwrap();
        let (term, rows) = index.evaluate(&queries[0].text).unwrap();
        assert_eq!(term, "o'brien");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_custom_column_defaults_to_null() {
        let index = MemoryIndex::new(vec![
            Document::new(r"C:\docs\a.pdf", "x").with_property("System.Size", FieldValue::Integer(10)),
            Document::new(r"C:\docs\b.pdf", "x"),
        ]);
        let queries = QueryBuilder::new(r"C:\docs")
            .columns(["System.Size"])
            .build(&["x"])
            .unwrap();
        let (_, rows) = index.evaluate(&queries[0].text).unwrap();
        assert_eq!(rows[0]["System.Size"], FieldValue::Integer(10));
        assert!(rows[1]["System.Size"].is_null());
    }

    #[test]
    fn test_unsupported_statement() {
        assert!(matches!(
            index().evaluate("DELETE FROM SystemIndex"),
            Err(SourceError::Open(_))
        ));
    }

    #[test]
    fn test_faults_and_stats() {
        let provider = MemoryProvider::new(index()).with_faults(
            FaultPlan::new()
                .fail_open("report")
                .fail_advance("invoice", 0, 1),
        );
        let settings = ConnectionSettings::default();
        let mut conn = provider.open(&settings).unwrap();

        let queries = QueryBuilder::new(r"C:\docs").build(&["invoice", "report"]).unwrap();
        {
            let mut cursor = conn.open_cursor(&queries[0].text).unwrap();
            assert!(matches!(cursor.move_next(), Err(SourceError::Advance(_))));
            cursor.move_next().unwrap();
            cursor.close().unwrap();
        }
        assert!(matches!(conn.open_cursor(&queries[1].text), Err(SourceError::Open(_))));
        conn.close().unwrap();

        assert_eq!(provider.stats().outstanding(), (0, 0));
    }

    #[test]
    fn test_fixture_from_yaml() {
        let yaml = r#"
documents:
  - path: 'C:\docs\a.pdf'
    content: invoice
  - path: 'C:\docs\b.pdf'
    properties:
      System.Size: 2048
"#;
        let index: MemoryIndex = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(index.documents.len(), 2);
        assert_eq!(index.documents[1].properties["System.Size"], FieldValue::Integer(2048));
        assert_eq!(index.documents[1].content, "");
    }
}

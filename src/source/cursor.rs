//! Buffered cursor over materialized rows

use super::traits::{FieldValue, SearchCursor, SourceError};
use std::collections::BTreeMap;

/// One row: column name -> value
pub type Record = BTreeMap<String, FieldValue>;

/// Cursor over rows already fetched from a backend
///
/// Opens positioned on the first row, like an ADO recordset.
#[derive(Debug, Default)]
pub struct RowCursor {
    rows: Vec<Record>,
    position: usize,
    closed: bool,
}

impl RowCursor {
    /// Create a cursor positioned on the first row
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Number of rows in the set
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Current row index
    pub fn position(&self) -> usize {
        self.position
    }

    fn ensure_open(&self) -> Result<(), SourceError> {
        if self.closed {
            Err(SourceError::Closed)
        } else {
            Ok(())
        }
    }
}

impl SearchCursor for RowCursor {
    fn is_at_end(&self) -> bool {
        self.closed || self.position >= self.rows.len()
    }

    fn move_first(&mut self) -> Result<(), SourceError> {
        self.ensure_open()?;
        if self.is_empty() {
            return Err(SourceError::NoCurrentRow);
        }
        self.position = 0;
        Ok(())
    }

    fn move_next(&mut self) -> Result<(), SourceError> {
        self.ensure_open()?;
        if self.position >= self.rows.len() {
            return Err(SourceError::NoCurrentRow);
        }
        self.position += 1;
        Ok(())
    }

    fn field(&self, name: &str) -> Result<FieldValue, SourceError> {
        self.ensure_open()?;
        let row = self.rows.get(self.position).ok_or(SourceError::NoCurrentRow)?;
        row.get(name)
            .cloned()
            .ok_or_else(|| SourceError::MissingField(name.to_string()))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.ensure_open()?;
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

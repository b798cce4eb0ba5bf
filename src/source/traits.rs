//! Connection and cursor traits and types

use crate::config::ConnectionSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a data source
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("data source {0} is not available on this system")]
    Unavailable(String),

    #[error("failed to open: {0}")]
    Open(String),

    #[error("no current row")]
    NoCurrentRow,

    #[error("failed to advance cursor: {0}")]
    Advance(String),

    #[error("field {0} not present in result set")]
    MissingField(String),

    #[error("cursor or connection already closed")]
    Closed,

    #[error("backend error: {0}")]
    Backend(String),
}

/// A single field value read from the current row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Text form of the value, `None` for null
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s),
            // Windows PowerShell serializes DBNull as an empty object
            serde_json::Value::Object(map) if map.is_empty() => Self::Null,
            other => Self::Text(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => Ok(()),
        }
    }
}

/// Opens connections to a searchable data source
pub trait ConnectionProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Open a connection using the given settings
    fn open(&self, settings: &ConnectionSettings) -> Result<Box<dyn SearchConnection>, SourceError>;

    /// Check if this provider can work on the current system
    fn is_available(&self) -> bool {
        true
    }
}

/// An open connection to a data source
pub trait SearchConnection {
    /// Command timeout applied to statements, `None` waits indefinitely
    fn command_timeout(&self) -> Option<Duration>;

    /// Set the command timeout
    fn set_command_timeout(&mut self, timeout: Option<Duration>);

    /// Open a cursor over the results of `query`
    fn open_cursor<'a>(&'a mut self, query: &str) -> Result<Box<dyn SearchCursor + 'a>, SourceError>;

    /// Close the connection
    fn close(&mut self) -> Result<(), SourceError>;
}

/// A position-based cursor over a result set
///
/// The caller advances explicitly. Reaching the end is reported by
/// [`SearchCursor::is_at_end`], not by an error.
pub trait SearchCursor {
    /// True when positioned past the last row, or when the set is empty
    fn is_at_end(&self) -> bool;

    /// Position on the first row; fails on an empty set
    fn move_first(&mut self) -> Result<(), SourceError>;

    /// Advance to the next row
    fn move_next(&mut self) -> Result<(), SourceError>;

    /// Read a field of the current row
    fn field(&self, name: &str) -> Result<FieldValue, SourceError>;

    /// Release the cursor
    fn close(&mut self) -> Result<(), SourceError>;
}

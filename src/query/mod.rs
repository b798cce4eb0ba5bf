//! Query building module
//!
//! Turns a root directory and a list of search terms into one
//! Windows Search SQL statement per term:
//!
//! ```text
//! SELECT System.ItemName, ... FROM SystemIndex
//!   WHERE SCOPE='file:C:\docs' AND CONTAINS('invoice')
//! ```
//!
//! One statement per term keeps every result attributable to the term
//! that found it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Catalog every statement selects from
pub const CATALOG: &str = "SystemIndex";

/// Errors raised while building queries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuildError {
    #[error("root path is empty")]
    EmptyRoot,

    #[error("search term #{0} is empty")]
    EmptyTerm(usize),

    #[error("no search terms given")]
    NoTerms,

    #[error("search term {0:?} contains a control character")]
    ControlCharacterInTerm(String),

    #[error("search term {0:?} contains a double quote, which delimits full-text phrases")]
    DelimiterInTerm(String),

    #[error("root path {0:?} contains a control character")]
    ControlCharacterInRoot(String),

    #[error("invalid column name {0:?}")]
    InvalidColumn(String),
}

/// An index property projected by the query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Column {
    /// Name of the file
    ItemName,
    /// Absolute path of the file
    ItemPathDisplay,
    /// Directory containing the file
    ItemFolderPathDisplay,
    /// File extension, with leading dot
    FileExtension,
    /// Any other index property
    Custom(String),
}

impl Column {
    /// Columns every query projects, in projection order
    pub const REQUIRED: [Column; 4] = [
        Column::ItemName,
        Column::ItemPathDisplay,
        Column::ItemFolderPathDisplay,
        Column::FileExtension,
    ];

    /// Property name as understood by the index
    pub fn as_str(&self) -> &str {
        match self {
            Self::ItemName => "System.ItemName",
            Self::ItemPathDisplay => "System.ItemPathDisplay",
            Self::ItemFolderPathDisplay => "System.ItemFolderPathDisplay",
            Self::FileExtension => "System.FileExtension",
            Self::Custom(name) => name,
        }
    }

    /// Whether this is one of the four columns the aggregator reads
    pub fn is_required(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    fn validate(&self) -> Result<(), QueryBuildError> {
        let name = self.as_str();
        let valid = !name.is_empty()
            && name
                .split('.')
                .all(|part| {
                    !part.is_empty()
                        && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                });
        if valid {
            Ok(())
        } else {
            Err(QueryBuildError::InvalidColumn(name.to_string()))
        }
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        match name.as_str() {
            "System.ItemName" => Self::ItemName,
            "System.ItemPathDisplay" => Self::ItemPathDisplay,
            "System.ItemFolderPathDisplay" => Self::ItemFolderPathDisplay,
            "System.FileExtension" => Self::FileExtension,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<Column> for String {
    fn from(column: Column) -> Self {
        column.as_str().to_string()
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated statement together with the term it searches for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermQuery {
    /// The search term, unescaped
    pub term: String,
    /// Statement text sent to the index
    pub text: String,
}

/// Builder for per-term index statements
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    root_path: String,
    columns: Vec<Column>,
}

impl QueryBuilder {
    /// Create a builder scoped to `root_path`, projecting the required columns
    pub fn new(root_path: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            columns: Column::REQUIRED.to_vec(),
        }
    }

    /// Project additional columns after the required ones
    pub fn columns<I, C>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        for column in extra {
            let column = column.into();
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }

    /// Projected columns, required ones first
    pub fn projection(&self) -> &[Column] {
        &self.columns
    }

    /// Build one statement per term, in term order
    pub fn build<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<TermQuery>, QueryBuildError> {
        self.validate_root()?;
        for column in &self.columns {
            column.validate()?;
        }
        if terms.is_empty() {
            return Err(QueryBuildError::NoTerms);
        }

        let base = self.base_statement();
        terms
            .iter()
            .enumerate()
            .map(|(idx, term)| {
                let term = term.as_ref();
                validate_term(idx, term)?;
                Ok(TermQuery {
                    term: term.to_string(),
                    text: format!("{} AND CONTAINS('{}')", base, escape_literal(term)),
                })
            })
            .collect()
    }

    fn validate_root(&self) -> Result<(), QueryBuildError> {
        if self.root_path.trim().is_empty() {
            return Err(QueryBuildError::EmptyRoot);
        }
        if self.root_path.chars().any(char::is_control) {
            return Err(QueryBuildError::ControlCharacterInRoot(self.root_path.clone()));
        }
        Ok(())
    }

    fn base_statement(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(Column::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {} FROM {} WHERE SCOPE='file:{}'",
            columns,
            CATALOG,
            escape_literal(&self.root_path)
        )
    }
}

fn validate_term(idx: usize, term: &str) -> Result<(), QueryBuildError> {
    if term.trim().is_empty() {
        return Err(QueryBuildError::EmptyTerm(idx));
    }
    if term.chars().any(char::is_control) {
        return Err(QueryBuildError::ControlCharacterInTerm(term.to_string()));
    }
    // CONTAINS parses its argument as full-text syntax, where `"` opens a phrase
    if term.contains('"') {
        return Err(QueryBuildError::DelimiterInTerm(term.to_string()));
    }
    Ok(())
}

/// Escape a value for use inside a single-quoted literal
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Reverse of [`escape_literal`]
pub fn unescape_literal(value: &str) -> String {
    value.replace("''", "'")
}

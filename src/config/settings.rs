//! Settings structures for index-query configuration

use crate::query::QueryBuildError;
use crate::results::{ExtensionFilter, OutputFormat};
use crate::search::SearchRequest;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// OLE DB connection string for the Windows Search index
pub const DEFAULT_PROVIDER: &str =
    "Provider=Search.CollatorDSO;Extended Properties='Application=Windows';";

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub connection: ConnectionSettings,
    pub output: OutputSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Merge with environment variables (INDEXQUERY_* prefix)
    pub fn merge_env(&mut self) {
        self.merge_from(|key| std::env::var(key).ok());
    }

    /// Merge overrides looked up by variable name
    pub fn merge_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("INDEXQUERY_ROOT") {
            self.search.root_path = val;
        }
        if let Some(val) = lookup("INDEXQUERY_TERMS") {
            self.search.terms = split_list(&val);
        }
        if let Some(val) = lookup("INDEXQUERY_EXTENSIONS") {
            self.search.extensions = split_list(&val);
        }
        if let Some(val) = lookup("INDEXQUERY_CASE_SENSITIVE") {
            self.search.case_sensitive = val.parse().unwrap_or(false);
        }
        if let Some(val) = lookup("INDEXQUERY_BACKEND") {
            if let Ok(backend) = serde_yaml::from_str(&val) {
                self.connection.backend = backend;
            }
        }
        if let Some(val) = lookup("INDEXQUERY_PROVIDER") {
            self.connection.provider = val;
        }
        if let Some(val) = lookup("INDEXQUERY_SHELL") {
            self.connection.shell = val;
        }
        if let Some(val) = lookup("INDEXQUERY_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                self.connection.command_timeout = secs;
            }
        }
        if let Some(val) = lookup("INDEXQUERY_FIXTURE") {
            self.connection.fixture = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("INDEXQUERY_FORMAT") {
            if let Ok(format) = serde_yaml::from_str(&val) {
                self.output.format = format;
            }
        }
        if let Some(val) = lookup("INDEXQUERY_LOG") {
            self.logging.level = val;
        }
    }

    /// Build the search request these settings describe
    pub fn search_request(&self) -> Result<SearchRequest, QueryBuildError> {
        SearchRequest::new(&self.search.root_path, &self.search.terms, self.extension_filter())
            .and_then(|request| request.with_columns(self.search.columns.iter().cloned()))
    }

    /// Extension filter for the configured extensions
    pub fn extension_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.search.extensions).case_sensitive(self.search.case_sensitive)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// What to search for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Directory the search is scoped to
    pub root_path: String,
    /// Search terms, one statement each
    pub terms: Vec<String>,
    /// Accepted file extensions (leading dot optional)
    pub extensions: Vec<String>,
    /// Compare extensions case-sensitively
    pub case_sensitive: bool,
    /// Extra index properties to project
    pub columns: Vec<String>,
}

/// Data source backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The Windows Search index
    #[default]
    WindowsSearch,
    /// A YAML fixture evaluated in memory
    Memory,
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Backend to query
    pub backend: Backend,
    /// Connection string handed to the provider
    pub provider: String,
    /// PowerShell executable used by the Windows Search backend
    pub shell: String,
    /// Command timeout in seconds, 0 disables it
    pub command_timeout: u64,
    /// Fixture file for the memory backend
    pub fixture: Option<PathBuf>,
    /// Consecutive failed advances from one row before its term is abandoned
    pub max_advance_failures: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            provider: DEFAULT_PROVIDER.to_string(),
            shell: "powershell".to_string(),
            command_timeout: 30,
            fixture: None,
            max_advance_failures: 16,
        }
    }
}

impl ConnectionSettings {
    /// Command timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        match self.command_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by RUST_LOG
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

//! Windows Search backend
//!
//! Talks to the `Search.CollatorDSO` OLE DB provider through ADODB, driven
//! by a PowerShell script. Each statement runs in its own script invocation.
//! The script walks the recordset itself and reports the rows together with
//! any failed advances as UTF-8 JSON; a [`WindowsCursor`] replays both.

use super::cursor::{Record, RowCursor};
use super::traits::{ConnectionProvider, FieldValue, SearchConnection, SearchCursor, SourceError};
use crate::config::ConnectionSettings;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Provider for the Windows Search index
#[derive(Debug, Clone)]
pub struct WindowsSearchProvider {
    shell: String,
    available: OnceLock<bool>,
}

impl WindowsSearchProvider {
    pub fn new() -> Self {
        Self {
            shell: "powershell".to_string(),
            available: OnceLock::new(),
        }
    }

    /// Use a different PowerShell executable (e.g. `pwsh`)
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self.available = OnceLock::new();
        self
    }

    /// PowerShell executable the scripts run under
    pub fn shell(&self) -> &str {
        &self.shell
    }

    fn check_availability(shell: &str) -> bool {
        if !cfg!(windows) {
            return false;
        }
        Command::new(shell)
            .args(["-NoProfile", "-NonInteractive", "-Command", "exit 0"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

impl Default for WindowsSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionProvider for WindowsSearchProvider {
    fn name(&self) -> &str {
        "windows_search"
    }

    fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| Self::check_availability(&self.shell))
    }

    fn open(&self, settings: &ConnectionSettings) -> Result<Box<dyn SearchConnection>, SourceError> {
        if !self.is_available() {
            return Err(SourceError::Unavailable(self.name().to_string()));
        }

        // Open once up front so a bad provider string fails here rather than on the first term
        let check = format!(
            "$ErrorActionPreference = 'Stop'\n\
             $connection = New-Object -ComObject ADODB.Connection\n\
             $connection.Open('{}')\n\
             $connection.Close()\n",
            escape_ps(&settings.provider)
        );
        run_script(&self.shell, &check)?;
        debug!("Connected to Windows Search via {}", self.shell);

        Ok(Box::new(WindowsSearchConnection {
            shell: self.shell.clone(),
            provider: settings.provider.clone(),
            timeout: settings.timeout(),
            max_advance_failures: settings.max_advance_failures.max(1),
            closed: false,
        }))
    }
}

struct WindowsSearchConnection {
    shell: String,
    provider: String,
    timeout: Option<Duration>,
    max_advance_failures: u32,
    closed: bool,
}

impl SearchConnection for WindowsSearchConnection {
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
        let script =
            render_query_script(&self.provider, self.timeout, self.max_advance_failures, query);
        let stdout = run_script(&self.shell, &script)?;
        let cursor = parse_rowset(&stdout)?;
        debug!(
            "Windows Search returned {} rows with {} failed advances",
            cursor.inner.len(),
            cursor.pending_failures()
        );
        Ok(Box::new(cursor))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.closed = true;
        Ok(())
    }
}

/// Rows fetched by the script, replaying the advances that failed while
/// the script walked the recordset
struct WindowsCursor {
    inner: RowCursor,
    /// row index -> messages of failed advances from that row, in order
    advance_errors: HashMap<usize, VecDeque<String>>,
}

impl WindowsCursor {
    fn pending_failures(&self) -> usize {
        self.advance_errors.values().map(VecDeque::len).sum()
    }
}

impl SearchCursor for WindowsCursor {
    fn is_at_end(&self) -> bool {
        self.inner.is_at_end()
    }

    fn move_first(&mut self) -> Result<(), SourceError> {
        self.inner.move_first()
    }

    fn move_next(&mut self) -> Result<(), SourceError> {
        let position = self.inner.position();
        if let Some(message) = self
            .advance_errors
            .get_mut(&position)
            .and_then(VecDeque::pop_front)
        {
            return Err(SourceError::Advance(message));
        }
        self.inner.move_next()
    }

    fn field(&self, name: &str) -> Result<FieldValue, SourceError> {
        self.inner.field(name)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.inner.close()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Rowset {
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
    advance_errors: Vec<ScriptAdvanceError>,
}

#[derive(Debug, Deserialize)]
struct ScriptAdvanceError {
    row: usize,
    message: String,
}

fn run_script(shell: &str, script: &str) -> Result<String, SourceError> {
    let output = Command::new(shell)
        .args(["-NoProfile", "-NonInteractive", "-Command", script])
        .output()
        .map_err(|e| SourceError::Open(format!("failed to start {}: {}", shell, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!("{} exited with {}: {}", shell, output.status, stderr);
        return Err(SourceError::Open(stderr));
    }
    decode_stdout(output.stdout)
}

/// Decode script output, which must be UTF-8
fn decode_stdout(stdout: Vec<u8>) -> Result<String, SourceError> {
    let text = String::from_utf8(stdout)
        .map_err(|e| SourceError::Backend(format!("rowset is not valid UTF-8: {}", e)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Escape a value for a PowerShell single-quoted string
fn escape_ps(value: &str) -> String {
    value.replace('\'', "''")
}

/// ADO `CommandTimeout` in seconds, `0` meaning no timeout
fn timeout_secs(timeout: Option<Duration>) -> u64 {
    timeout.map(|t| t.as_secs().max(1)).unwrap_or(0)
}

fn render_query_script(
    provider: &str,
    timeout: Option<Duration>,
    max_advance_failures: u32,
    query: &str,
) -> String {
    format!(
        r#"$ErrorActionPreference = 'Stop'
[Console]::OutputEncoding = New-Object System.Text.UTF8Encoding $false
$connection = New-Object -ComObject ADODB.Connection
$connection.Open('{provider}')
$connection.CommandTimeout = {timeout}
$rows = New-Object System.Collections.ArrayList
$advanceErrors = New-Object System.Collections.ArrayList
try {{
    $recordset = New-Object -ComObject ADODB.Recordset
    $recordset.Open('{query}', $connection)
    :walk while (-not $recordset.EOF) {{
        $row = [ordered]@{{}}
        foreach ($field in $recordset.Fields) {{
            $value = $field.Value
            if ($value -is [System.DBNull]) {{ $value = $null }}
            $row[$field.Name] = $value
        }}
        $position = $rows.Add([pscustomobject]$row)
        $failures = 0
        while ($true) {{
            try {{
                $recordset.MoveNext()
                break
            }} catch {{
                [void]$advanceErrors.Add([pscustomobject]@{{ row = $position; message = $_.Exception.Message }})
                $failures += 1
                if ($failures -ge {max_failures}) {{ break walk }}
            }}
        }}
    }}
    $recordset.Close()
}} finally {{
    $connection.Close()
}}
$rowset = [pscustomobject]@{{ rows = $rows.ToArray(); advance_errors = $advanceErrors.ToArray() }}
ConvertTo-Json -InputObject $rowset -Compress -Depth 4
"#,
        provider = escape_ps(provider),
        timeout = timeout_secs(timeout),
        max_failures = max_advance_failures,
        query = escape_ps(query),
    )
}

fn parse_rowset(stdout: &str) -> Result<WindowsCursor, SourceError> {
    let stdout = stdout.trim();
    let rowset: Rowset = if stdout.is_empty() {
        Rowset::default()
    } else {
        serde_json::from_str(stdout)
            .map_err(|e| SourceError::Backend(format!("unreadable rowset: {}", e)))?
    };

    let rows: Vec<Record> = rowset
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(|(k, v)| (k, v.into())).collect())
        .collect();

    let mut advance_errors: HashMap<usize, VecDeque<String>> = HashMap::new();
    for error in rowset.advance_errors {
        advance_errors
            .entry(error.row)
            .or_default()
            .push_back(error.message);
    }

    Ok(WindowsCursor {
        inner: RowCursor::new(rows),
        advance_errors,
    })
}

//! Rendering result rows for output

use super::types::ResultRow;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Output format for result rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Tab-separated, one row per line
    #[default]
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Render rows in the given format
pub fn render(rows: &[ResultRow], format: OutputFormat) -> Result<String> {
    let extra = extra_columns(rows);
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(rows)?,
        OutputFormat::Csv => {
            let mut csv = String::from("term,folder,file_name");
            for column in &extra {
                csv.push(',');
                csv.push_str(&csv_field(column));
            }
            csv.push('\n');
            for row in rows {
                csv.push_str(&format!(
                    "{},{},{}",
                    csv_field(&row.term),
                    csv_field(&row.folder),
                    csv_field(&row.file_name)
                ));
                for column in &extra {
                    csv.push(',');
                    csv.push_str(&csv_field(row.extra.get(*column).map(String::as_str).unwrap_or("")));
                }
                csv.push('\n');
            }
            csv
        }
        OutputFormat::Text => {
            let mut text = String::new();
            for row in rows {
                text.push_str(&format!("{}\t{}\t{}", row.term, row.folder, row.file_name));
                for column in &extra {
                    text.push('\t');
                    text.push_str(row.extra.get(*column).map(String::as_str).unwrap_or(""));
                }
                text.push('\n');
            }
            text
        }
    })
}

fn extra_columns(rows: &[ResultRow]) -> BTreeSet<&String> {
    rows.iter().flat_map(|row| row.extra.keys()).collect()
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<ResultRow> {
        vec![
            ResultRow::new("invoice", r"C:\docs", "a.pdf"),
            ResultRow::new("report", r"C:\docs", "say \"hi\".pdf").with_extra("System.Size", "12"),
        ]
    }

    #[test]
    fn test_render_text() {
        let text = render(&rows(), OutputFormat::Text).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "invoice\tC:\\docs\ta.pdf\t");
        assert_eq!(lines[1], "report\tC:\\docs\tsay \"hi\".pdf\t12");
    }

    #[test]
    fn test_render_csv() {
        let csv = render(&rows(), OutputFormat::Csv).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "term,folder,file_name,\"System.Size\"");
        assert_eq!(lines[1], "\"invoice\",\"C:\\docs\",\"a.pdf\",\"\"");
        assert_eq!(lines[2], "\"report\",\"C:\\docs\",\"say \"\"hi\"\".pdf\",\"12\"");
    }

    #[test]
    fn test_render_json() {
        let json = render(&rows(), OutputFormat::Json).unwrap();
        let parsed: Vec<ResultRow> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rows());
        assert!(!json.contains("\"extra\": {}"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}

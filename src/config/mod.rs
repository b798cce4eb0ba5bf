//! Configuration module for index-query
//!
//! Handles loading settings from YAML files and environment variables.

mod settings;

pub use settings::*;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming an explicit settings file
pub const SETTINGS_PATH_VAR: &str = "INDEXQUERY_SETTINGS_PATH";

/// Default settings file locations, in lookup order
pub fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("settings.yml"),
        PathBuf::from("config/settings.yml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("index-query/settings.yml"));
    }
    paths
}

/// Load settings from `explicit`, the environment, or the default locations
///
/// Environment overrides are applied last in every case.
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("settings file {} does not exist", path.display());
        }
        return load_from(path);
    }

    if let Ok(path) = std::env::var(SETTINGS_PATH_VAR) {
        let path = PathBuf::from(path);
        if path.exists() {
            return load_from(&path);
        }
    }

    for path in default_paths() {
        if path.exists() {
            return load_from(&path);
        }
    }

    info!("No settings file found, using defaults");
    let mut settings = Settings::default();
    settings.merge_env();
    Ok(settings)
}

fn load_from(path: &Path) -> Result<Settings> {
    info!("Loading settings from: {}", path.display());
    let mut settings = Settings::from_file(path)?;
    settings.merge_env();
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "search:\n  root_path: 'D:\\work'\n  terms: [budget]").unwrap();

        let settings = load(Some(file.path())).unwrap();
        assert_eq!(settings.search.root_path, r"D:\work");
        assert_eq!(settings.search.terms, vec!["budget"]);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        assert!(load(Some(Path::new("/nonexistent/index-query.yml"))).is_err());
    }
}

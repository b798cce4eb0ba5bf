//! Extension filter

use serde::{Deserialize, Serialize};

/// Set of accepted file extensions
///
/// A leading dot is optional on both sides: `pdf` and `.pdf` are the same
/// extension. Matching ignores ASCII case unless made case-sensitive.
/// An empty filter accepts nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionFilter {
    /// Extensions without their leading dot, as given
    extensions: Vec<String>,
    case_sensitive: bool,
}

impl ExtensionFilter {
    /// Create a filter from a list of extensions
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for ext in extensions {
            filter.insert(ext.as_ref());
        }
        filter
    }

    /// Set case sensitivity
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Add an extension
    pub fn insert(&mut self, ext: &str) {
        if let Some(ext) = strip(ext) {
            if !self.extensions.iter().any(|e| e == ext) {
                self.extensions.push(ext.to_string());
            }
        }
    }

    /// Check whether `ext` is accepted
    pub fn accepts(&self, ext: &str) -> bool {
        let Some(ext) = strip(ext) else {
            return false;
        };
        self.extensions.iter().any(|e| {
            if self.case_sensitive {
                e == ext
            } else {
                e.eq_ignore_ascii_case(ext)
            }
        })
    }

    /// Number of extensions
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

fn strip(ext: &str) -> Option<&str> {
    let ext = ext.trim().trim_start_matches('.');
    (!ext.is_empty()).then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_dot_optional() {
        let filter = ExtensionFilter::new([".pdf", "txt"]);
        assert!(filter.accepts(".pdf"));
        assert!(filter.accepts("pdf"));
        assert!(filter.accepts(".txt"));
        assert!(!filter.accepts(".doc"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_case_insensitive_by_default() {
        let filter = ExtensionFilter::new([".PDF"]);
        assert!(filter.accepts(".pdf"));
        assert!(filter.accepts(".Pdf"));
    }

    #[test]
    fn test_case_sensitive() {
        let filter = ExtensionFilter::new([".PDF"]).case_sensitive(true);
        assert!(filter.accepts(".PDF"));
        assert!(!filter.accepts(".pdf"));
    }

    #[test]
    fn test_empty_accepts_nothing() {
        let filter = ExtensionFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        assert!(!filter.accepts(".pdf"));
        assert!(!ExtensionFilter::new([".pdf"]).accepts(""));
    }
}

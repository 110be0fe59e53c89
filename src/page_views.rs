//! Page-view mapping used to rank search records.
//!
//! The mapping is a JSON object of absolute URL to view count, exported by a
//! separate analytics job:
//!
//! ```json
//! { "https://kotlinlang.org/docs/home.html": 120345 }
//! ```

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct PageViews {
    views: HashMap<String, u64>,
}

impl PageViews {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page views: {}", path.display()))?;
        let views: HashMap<String, u64> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse page views: {}", path.display()))?;
        Ok(Self { views })
    }

    pub fn from_map(views: HashMap<String, u64>) -> Self {
        Self { views }
    }

    /// Views of an absolute URL, 0 when unknown. The folder form and its
    /// `index.html` form are treated as the same page.
    pub fn get(&self, url: &str) -> u64 {
        if let Some(v) = self.views.get(url) {
            return *v;
        }
        let alternate = match url.strip_suffix("index.html") {
            Some(folder) if folder.ends_with('/') => folder.to_string(),
            _ if url.ends_with('/') => format!("{}index.html", url),
            _ => return 0,
        };
        self.views.get(&alternate).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views(pairs: &[(&str, u64)]) -> PageViews {
        PageViews::from_map(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn exact_lookup() {
        let pv = views(&[("https://kotlinlang.org/docs/x.html", 42)]);
        assert_eq!(pv.get("https://kotlinlang.org/docs/x.html"), 42);
        assert_eq!(pv.get("https://kotlinlang.org/docs/y.html"), 0);
    }

    #[test]
    fn folder_and_index_forms_match() {
        let pv = views(&[
            ("https://kotlinlang.org/docs/", 7),
            ("https://kotlinlang.org/community/index.html", 9),
        ]);
        assert_eq!(pv.get("https://kotlinlang.org/docs/index.html"), 7);
        assert_eq!(pv.get("https://kotlinlang.org/community/"), 9);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("views.json");
        std::fs::write(&path, r#"{"https://kotlinlang.org/docs/x.html": 42}"#).unwrap();
        let pv = PageViews::load(&path).unwrap();
        assert_eq!(pv.len(), 1);
        assert_eq!(pv.get("https://kotlinlang.org/docs/x.html"), 42);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("views.json");
        std::fs::write(&path, r#"{"https://kotlinlang.org/": -1}"#).unwrap();
        assert!(PageViews::load(&path).is_err());
    }
}

//! TOML configuration with environment overrides.
//!
//! ```toml
//! [site]
//! output = "dist"
//! base_url = "https://kotlinlang.org"
//!
//! [walk]
//! short_report = false
//! short_report_skip = ["api/*/older/**", "api/older/**", "spec/**"]
//!
//! [index]
//! enabled = true
//! page_views = "data/page_views_map.json"
//! push = false
//! name = "prod_KOTLINLANG_WEBHELP"
//!
//! [sitemap]
//! include_deprecated = false
//!
//! [reports]
//! dir = "reports"
//! ```
//!
//! # Environment Variables
//!
//! Applied on top of the file by [`load_config`]:
//! - `WH_SEARCH_INDEX`: enable/disable record extraction
//! - `WH_SEARCH_PUSH`: enable/disable the hosted index push
//! - `WH_INDEX_NAME`: hosted index name
//! - `WH_SHORT_REPORT`: skip the `short_report_skip` subtrees
//! - `WH_PAGE_VIEWS`: path of the page-view mapping
//!
//! Hosted index credentials are never read from the file, see
//! [`crate::publish::AlgoliaCredentials::from_env`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub walk: WalkConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub sitemap: SitemapConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    /// Rendered output tree.
    pub output: PathBuf,
    /// Absolute origin prepended to site-relative URLs, without trailing slash.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalkConfig {
    /// Worker count; defaults to the available hardware parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub short_report: bool,
    #[serde(default = "default_short_report_skip")]
    pub short_report_skip: Vec<String>,
    /// Always skipped, short report or not.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            workers: None,
            short_report: false,
            short_report_skip: default_short_report_skip(),
            exclude: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_short_report_skip() -> Vec<String> {
    vec![
        "api/*/older/**".to_string(),
        "api/older/**".to_string(),
        "spec/**".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Extract search records. When off the run is a plain dist analysis.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Page-view mapping used to fill `pageViews`.
    #[serde(default)]
    pub page_views: Option<PathBuf>,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_views: None,
            push: false,
            name: None,
            max_content_chars: default_max_content_chars(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_content_chars() -> usize {
    5000
}
fn default_batch_size() -> usize {
    1000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SitemapConfig {
    /// List `Page_API_Deprecated` pages too.
    #[serde(default)]
    pub include_deprecated: bool,
    /// Fall back to the file mtime when the page has no modification meta.
    #[serde(default)]
    pub lastmod_from_mtime: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Config {
    /// Smallest usable configuration, for `classify` when no file exists.
    pub fn minimal(output: PathBuf) -> Self {
        Self {
            site: SiteConfig {
                output,
                base_url: "http://localhost".to_string(),
            },
            walk: WalkConfig::default(),
            index: IndexConfig::default(),
            sitemap: SitemapConfig::default(),
            reports: ReportsConfig::default(),
        }
    }

    /// Absolute URL of a site-relative one.
    pub fn absolute_url(&self, relative: &str) -> String {
        format!("{}{}", self.site.base_url, relative)
    }

    /// Name of the hosted index, required once pushing is enabled.
    pub fn index_name(&self) -> Result<&str> {
        self.index
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow::anyhow!("index.name (or WH_INDEX_NAME) must be set to push"))
    }

    /// Globs excluded before dispatch for this run.
    pub fn skip_globs(&self) -> Vec<String> {
        let mut globs = self.walk.exclude.clone();
        if self.walk.short_report {
            globs.extend(self.walk.short_report_skip.iter().cloned());
        }
        globs
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&mut config)?;
    Ok(config)
}

/// Apply `WH_*` overrides. `lookup` is injectable for tests.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("WH_SEARCH_INDEX") {
        config.index.enabled = parse_flag("WH_SEARCH_INDEX", &v)?;
    }
    if let Some(v) = lookup("WH_SEARCH_PUSH") {
        config.index.push = parse_flag("WH_SEARCH_PUSH", &v)?;
    }
    if let Some(v) = lookup("WH_SHORT_REPORT") {
        config.walk.short_report = parse_flag("WH_SHORT_REPORT", &v)?;
    }
    if let Some(v) = lookup("WH_INDEX_NAME") {
        config.index.name = Some(v);
    }
    if let Some(v) = lookup("WH_PAGE_VIEWS") {
        config.index.page_views = Some(PathBuf::from(v));
    }
    Ok(())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean flag, got '{}'", key, other),
    }
}

/// Check and normalize a loaded configuration. Run again after any
/// command-line override.
pub fn validate(config: &mut Config) -> Result<()> {
    let base = config.site.base_url.trim_end_matches('/').to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        bail!("site.base_url must be an absolute http(s) URL");
    }
    config.site.base_url = base;

    if config.walk.workers == Some(0) {
        bail!("walk.workers must be > 0");
    }
    if config.index.max_content_chars == 0 {
        bail!("index.max_content_chars must be > 0");
    }
    if config.index.batch_size == 0 {
        bail!("index.batch_size must be > 0");
    }
    if config.index.push {
        if !config.index.enabled {
            bail!("index.push requires index.enabled");
        }
        config.index_name()?;
    }
    Ok(())
}

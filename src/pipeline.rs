//! The indexing run.
//!
//! ```text
//! walk_tree ──relative path──▶ TaskPool ──FileMetadata──▶ sort by URL ──▶ ReportWriter
//!                              (classify + extract)                           │
//!                                                                 push (optional)
//! ```
//!
//! Workers share nothing mutable: each job gets an owned path and an `Arc` of
//! the [`JobContext`]. Everything a worker returns is sorted by URL before it
//! reaches the single report consumer, so output does not depend on
//! scheduling.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::classify::classify_file;
use crate::config::Config;
use crate::extract::{page_modified, Extractor};
use crate::models::{FileMetadata, FileType};
use crate::page_views::PageViews;
use crate::pool::TaskPool;
use crate::progress::{format_number, RunProgressEvent, RunProgressReporter, REPORT_EVERY};
use crate::publish::{self, AlgoliaCredentials, AlgoliaPublisher};
use crate::report::{ReportOptions, ReportOutcome, ReportPaths, ReportWriter};
use crate::sitemap::SITEMAP_FILE;
use crate::walk::{self, WalkFilter, WalkSummary};

/// What a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Classification, file reports, sitemap, and search records.
    Index,
    /// Classification and file reports only.
    Analyze,
}

/// Immutable state shared by every worker.
pub struct JobContext {
    pub root: PathBuf,
    pub config: Config,
    /// `None` when extraction is off.
    pub extractor: Option<Extractor>,
}

impl JobContext {
    pub fn new(config: Config, mode: RunMode) -> Self {
        let extractor = (mode == RunMode::Index && config.index.enabled)
            .then(|| Extractor::new(config.index.max_content_chars));
        Self {
            root: config.site.output.clone(),
            config,
            extractor,
        }
    }
}

/// Classify one file and, for pages, extract its records.
pub fn process_file(ctx: &JobContext, relative: &str) -> Result<FileMetadata> {
    let classification = classify_file(&ctx.root, relative)?;
    let file_type = classification.file_type;
    let url = walk::site_url(relative);

    let mut metadata = FileMetadata {
        url,
        file_type,
        records: Vec::new(),
        dropped_records: 0,
        modified: None,
    };
    if !file_type.is_page() {
        return Ok(metadata);
    }

    if let Some(document) = &classification.document {
        if let Some(extractor) = &ctx.extractor {
            let absolute = ctx.config.absolute_url(&metadata.url);
            let extraction = extractor.extract(document, file_type, &absolute);
            metadata.records = extraction.records;
            metadata.dropped_records = extraction.dropped;
        }
        metadata.modified = page_modified(document);
    }
    if metadata.modified.is_none() && ctx.config.sitemap.lastmod_from_mtime {
        metadata.modified = file_mtime(&ctx.root.join(relative));
    }
    Ok(metadata)
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Totals of a finished run.
#[derive(Debug)]
pub struct RunSummary {
    pub walk: WalkSummary,
    pub report: ReportOutcome,
    pub paths: ReportPaths,
    pub elapsed: Duration,
}

/// Walk, classify, extract, and write every report. Does not push.
pub async fn build(
    config: &Config,
    mode: RunMode,
    progress: &dyn RunProgressReporter,
) -> Result<RunSummary> {
    let started = Instant::now();

    let page_views = match (&config.index.page_views, mode) {
        (Some(path), RunMode::Index) if config.index.enabled => {
            let views = PageViews::load(path)?;
            info!(pages = views.len(), path = %path.display(), "loaded page views");
            Some(views)
        }
        _ => None,
    };

    // The sitemap of the previous run lives in the tree being walked.
    let mut globs = config.skip_globs();
    globs.push(SITEMAP_FILE.to_string());
    let filter = WalkFilter::new(&globs)?;
    let ctx = Arc::new(JobContext::new(config.clone(), mode));
    let mut pool: TaskPool<FileMetadata> = TaskPool::sized(config.walk.workers);
    info!(
        output = %config.site.output.display(),
        workers = pool.workers(),
        short_report = config.walk.short_report,
        ?mode,
        "starting run"
    );

    let walk_summary = walk::walk_tree(
        &config.site.output,
        &filter,
        config.walk.follow_symlinks,
        |relative| {
            let ctx = Arc::clone(&ctx);
            pool.spawn(move || {
                process_file(&ctx, &relative)
                    .with_context(|| format!("Failed to process {}", relative))
            });
            if pool.submitted() % REPORT_EVERY == 0 {
                progress.report(RunProgressEvent::Discovering {
                    files: pool.submitted(),
                });
            }
            pool.check()
        },
    )
    .await?;

    let mut entries = pool.drain().await?;
    entries.sort_by(|a, b| a.url.cmp(&b.url));

    let mut options = ReportOptions::from_config(config);
    if mode == RunMode::Analyze {
        options.search_index = false;
        options.collect_records = false;
    }
    let paths = ReportPaths::from_config(config);
    let mut writer = ReportWriter::create(paths.clone(), options, page_views)?;
    let total = entries.len() as u64;
    for (n, entry) in entries.into_iter().enumerate() {
        writer.write(entry)?;
        let n = n as u64 + 1;
        if n % REPORT_EVERY == 0 || n == total {
            progress.report(RunProgressEvent::Writing { n, total });
        }
    }
    let report = writer.finish()?;

    if let Some(extractor) = &ctx.extractor {
        for (file_type, pages) in report.stats.iter() {
            if file_type.is_page() && !extractor.has_strategy(file_type) {
                info!(%file_type, pages, "no parser for type, pages not indexed");
            }
        }
    }
    if report.dropped_records > 0 {
        warn!(dropped = report.dropped_records, "invalid records were dropped");
    }

    Ok(RunSummary {
        walk: walk_summary,
        report,
        paths,
        elapsed: started.elapsed(),
    })
}

/// Full run: [`build`], print the summary, then push when enabled.
pub async fn run(
    config: &Config,
    mode: RunMode,
    progress: &dyn RunProgressReporter,
) -> Result<RunSummary> {
    let summary = build(config, mode, progress).await?;
    print_summary(&summary, mode);

    if mode == RunMode::Index && config.index.enabled && config.index.push {
        let credentials = AlgoliaCredentials::from_env()?;
        let publisher = AlgoliaPublisher::new(config, credentials)?;
        publish::publish(&publisher, &summary.report.collected).await?;
    }
    Ok(summary)
}

pub fn print_summary(summary: &RunSummary, mode: RunMode) {
    let stats = &summary.report.stats;
    println!("Run complete ({:?}):", mode);
    println!("  files:           {}", format_number(stats.total() as u64));
    println!("  pages:           {}", format_number(stats.pages() as u64));
    println!("  skipped:         {}", format_number(summary.walk.skipped as u64));
    println!(
        "  sitemap entries: {}",
        format_number(summary.report.sitemap_entries as u64)
    );
    if mode == RunMode::Index {
        println!(
            "  records:         {}",
            format_number(summary.report.records as u64)
        );
        println!(
            "  dropped:         {}",
            format_number(summary.report.dropped_records as u64)
        );
    }
    println!("  elapsed:         {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    stats.print_table();
    println!();
    println!("Sitemap: {}", summary.paths.sitemap.display());
    if let Some(reports) = summary.paths.file_types.parent() {
        println!("Reports: {}", reports.display());
    }
}

/// Classify individual files and print `<path>\t<FileType>` per file.
///
/// A path is taken relative to the output tree when it exists there or lies
/// below it, and relative to the working directory otherwise.
pub fn classify_paths(config: &Config, paths: &[PathBuf]) -> Result<Vec<(String, FileType)>> {
    let output = &config.site.output;
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let (root, relative) = locate(output, path)?;
        let classification = classify_file(&root, &relative)?;
        println!("{}\t{}", relative, classification.file_type);
        results.push((relative, classification.file_type));
    }
    Ok(results)
}

fn locate(output: &Path, path: &Path) -> Result<(PathBuf, String)> {
    if let Ok(below) = path.strip_prefix(output) {
        return Ok((output.to_path_buf(), walk::relative_path(Path::new(""), below)?));
    }
    if path.is_relative() && output.join(path).is_file() {
        return Ok((output.to_path_buf(), walk::relative_path(Path::new(""), path)?));
    }
    Ok((PathBuf::from("."), walk::relative_path(Path::new(""), path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    const DOC_PAGE: &str = r#"<html><head><title>Basics</title>
        <meta property="article:modified_time" content="2024-03-01T00:00:00Z"></head>
        <body><article class="article"><h1>Basic syntax</h1><p>Intro text.</p>
        <h2 id="vars">Variables</h2><p>Use val.</p></article></body></html>"#;

    fn site(files: &[(&str, &str)]) -> (TempDir, Config) {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("dist");
        for (path, content) in files {
            let file = output.join(path);
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(file, content).unwrap();
        }
        let mut config = Config::minimal(output);
        config.site.base_url = "https://kotlinlang.org".to_string();
        config.reports.dir = tmp.path().join("reports");
        config.walk.workers = Some(2);
        (tmp, config)
    }

    #[test]
    fn process_file_extracts_pages() {
        let (_tmp, config) = site(&[("docs/basics.html", DOC_PAGE)]);
        let ctx = JobContext::new(config, RunMode::Index);
        let meta = process_file(&ctx, "docs/basics.html").unwrap();
        assert_eq!(meta.url, "/docs/basics.html");
        assert_eq!(meta.file_type, FileType::PageDocumentation);
        assert_eq!(meta.records.len(), 2);
        assert_eq!(
            meta.records[0].object_id,
            "https://kotlinlang.org/docs/basics.html"
        );
        assert!(meta.modified.is_some());
    }

    #[test]
    fn analyze_mode_does_not_extract() {
        let (_tmp, config) = site(&[("docs/basics.html", DOC_PAGE)]);
        let ctx = JobContext::new(config, RunMode::Analyze);
        let meta = process_file(&ctx, "docs/basics.html").unwrap();
        assert_eq!(meta.file_type, FileType::PageDocumentation);
        assert!(meta.records.is_empty());
    }

    #[test]
    fn mtime_fallback_is_opt_in() {
        let (_tmp, mut config) = site(&[("about.html", "<html><body>hi</body></html>")]);
        let ctx = JobContext::new(config.clone(), RunMode::Index);
        assert!(process_file(&ctx, "about.html").unwrap().modified.is_none());

        config.sitemap.lastmod_from_mtime = true;
        let ctx = JobContext::new(config, RunMode::Index);
        assert!(process_file(&ctx, "about.html").unwrap().modified.is_some());
    }

    #[test]
    fn non_pages_are_not_parsed() {
        let (_tmp, config) = site(&[("img/logo.png", "not really a png")]);
        let ctx = JobContext::new(config, RunMode::Index);
        let meta = process_file(&ctx, "img/logo.png").unwrap();
        assert_eq!(meta.file_type, FileType::FileImage);
        assert!(meta.modified.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn build_writes_reports() {
        let (_tmp, config) = site(&[
            ("index.html", "<html><head><title>Kotlin</title></head><body>Home</body></html>"),
            ("docs/basics.html", DOC_PAGE),
            ("404.html", "<html><body>Not found</body></html>"),
            ("css/site.css", "body {}"),
        ]);
        let summary = build(&config, RunMode::Index, &NoProgress).await.unwrap();
        assert_eq!(summary.walk.files, 4);
        assert_eq!(summary.report.stats.get(FileType::NotFound), 1);
        assert_eq!(summary.report.sitemap_entries, 2);
        assert_eq!(summary.report.records, 2);
        assert!(summary.paths.search_index.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_utf8_page_aborts_the_run() {
        let (tmp, config) = site(&[("docs/ok.html", DOC_PAGE)]);
        fs::write(config.site.output.join("docs/bad.html"), [0xff, 0xfe, 0x00]).unwrap();
        let err = build(&config, RunMode::Index, &NoProgress).await.unwrap_err();
        assert!(format!("{:#}", err).contains("docs/bad.html"));
        assert!(!tmp.path().join("reports/file-types.json").exists());
    }

    #[test]
    fn locate_paths() {
        let output = Path::new("/srv/dist");
        assert_eq!(
            locate(output, Path::new("/srv/dist/docs/x.html")).unwrap(),
            (PathBuf::from("/srv/dist"), "docs/x.html".to_string())
        );
        assert_eq!(
            locate(output, Path::new("notes/x.html")).unwrap(),
            (PathBuf::from("."), "notes/x.html".to_string())
        );
    }
}

//! Report aggregation.
//!
//! [`ReportWriter`] is the single consumer of classified files. It takes them
//! one at a time, in URL order, and streams every report as it goes:
//!
//! | File | Content |
//! |------|---------|
//! | `<output>/sitemap.xml` | one `<url>` per listed page |
//! | `reports/file-types.json` | `{ url: FileType }` |
//! | `reports/files-unknown.txt` | URLs classified `Unknown` |
//! | `reports/files-redirects.txt` | URLs classified `Redirect` |
//! | `reports/file-stats.csv` | per-type census |
//! | `reports/search-index.json` | `{ url: [record, ...] }`, when extraction is on |
//!
//! Everything is written to `*.tmp` siblings and only renamed into place by
//! [`ReportWriter::finish`], so an aborted run leaves the previous reports
//! untouched.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::models::{FileMetadata, FileType, SearchRecord};
use crate::page_views::PageViews;
use crate::sitemap::{self, SitemapWriter};
use crate::stats::FileStats;

/// Integrity failures. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("duplicate objectID '{object_id}' in {url} (first seen in {first_url})")]
    DuplicateObjectId {
        object_id: String,
        url: String,
        first_url: String,
    },
    #[error("entries out of order: '{url}' after '{previous}'")]
    OutOfOrder { url: String, previous: String },
}

/// Locations of every report.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub sitemap: PathBuf,
    pub file_types: PathBuf,
    pub unknown: PathBuf,
    pub redirects: PathBuf,
    pub stats: PathBuf,
    pub search_index: PathBuf,
}

impl ReportPaths {
    pub fn new(output: &Path, reports: &Path) -> Self {
        Self {
            sitemap: output.join(sitemap::SITEMAP_FILE),
            file_types: reports.join("file-types.json"),
            unknown: reports.join("files-unknown.txt"),
            redirects: reports.join("files-redirects.txt"),
            stats: reports.join("file-stats.csv"),
            search_index: reports.join("search-index.json"),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.site.output, &config.reports.dir)
    }
}

/// What the run produced, handed back by [`ReportWriter::finish`].
#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub stats: FileStats,
    pub sitemap_entries: usize,
    pub records: usize,
    pub dropped_records: usize,
    /// Every record written, kept only when a push follows.
    pub collected: Vec<SearchRecord>,
}

/// Options fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub base_url: String,
    pub include_deprecated: bool,
    /// Write `search-index.json`.
    pub search_index: bool,
    /// Keep records in memory for the hosted index push.
    pub collect_records: bool,
}

impl ReportOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.site.base_url.clone(),
            include_deprecated: config.sitemap.include_deprecated,
            search_index: config.index.enabled,
            collect_records: config.index.enabled && config.index.push,
        }
    }
}

/// Streams a JSON object one member at a time.
pub struct JsonObjectWriter<W: Write> {
    out: W,
    members: usize,
}

impl<W: Write> JsonObjectWriter<W> {
    pub fn new(mut out: W) -> std::io::Result<Self> {
        out.write_all(b"{")?;
        Ok(Self { out, members: 0 })
    }

    pub fn member<T: Serialize + ?Sized>(&mut self, key: &str, value: &T, pretty: bool) -> Result<()> {
        self.out
            .write_all(if self.members == 0 { b"\n" } else { b",\n" })?;
        serde_json::to_writer(&mut self.out, key)?;
        self.out.write_all(b": ")?;
        if pretty {
            serde_json::to_writer_pretty(&mut self.out, value)?;
        } else {
            serde_json::to_writer(&mut self.out, value)?;
        }
        self.members += 1;
        Ok(())
    }

    pub fn finish(mut self) -> std::io::Result<W> {
        self.out
            .write_all(if self.members == 0 { b"}\n" } else { b"\n}\n" })?;
        self.out.flush()?;
        Ok(self.out)
    }
}

type Sink = BufWriter<File>;

/// A report being written to `<path>.tmp`.
struct Pending {
    tmp: PathBuf,
    target: PathBuf,
}

/// Reports of one run. Temporary files are removed unless committed.
#[derive(Default)]
struct PendingReports {
    files: Vec<Pending>,
    committed: bool,
}

impl PendingReports {
    fn create(&mut self, target: &Path) -> Result<Sink> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        let tmp = target.with_file_name(name);
        let file = File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        self.files.push(Pending {
            tmp,
            target: target.to_path_buf(),
        });
        Ok(BufWriter::new(file))
    }

    fn commit(&mut self) -> Result<()> {
        for pending in &self.files {
            std::fs::rename(&pending.tmp, &pending.target).with_context(|| {
                format!("Failed to move {} into place", pending.target.display())
            })?;
            debug!(report = %pending.target.display(), "report written");
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingReports {
    fn drop(&mut self) {
        if !self.committed {
            for pending in &self.files {
                let _ = std::fs::remove_file(&pending.tmp);
            }
        }
    }
}

pub struct ReportWriter {
    options: ReportOptions,
    page_views: Option<PageViews>,
    paths: ReportPaths,
    pending: PendingReports,
    sitemap: SitemapWriter<Sink>,
    file_types: JsonObjectWriter<Sink>,
    unknown: Sink,
    redirects: Sink,
    search_index: Option<JsonObjectWriter<Sink>>,
    /// objectID -> URL of the page that produced it.
    seen: HashMap<String, String>,
    previous_url: Option<String>,
    outcome: ReportOutcome,
}

impl ReportWriter {
    /// Open every report. `page_views` is `None` when pageViews weighting is off.
    pub fn create(
        paths: ReportPaths,
        options: ReportOptions,
        page_views: Option<PageViews>,
    ) -> Result<Self> {
        let mut pending = PendingReports::default();
        let sitemap = SitemapWriter::new(pending.create(&paths.sitemap)?)?;
        let file_types = JsonObjectWriter::new(pending.create(&paths.file_types)?)?;
        let unknown = pending.create(&paths.unknown)?;
        let redirects = pending.create(&paths.redirects)?;
        let search_index = if options.search_index {
            Some(JsonObjectWriter::new(pending.create(&paths.search_index)?)?)
        } else {
            None
        };

        Ok(Self {
            options,
            page_views,
            paths,
            pending,
            sitemap,
            file_types,
            unknown,
            redirects,
            search_index,
            seen: HashMap::new(),
            previous_url: None,
            outcome: ReportOutcome::default(),
        })
    }

    /// Consume one classified file. Entries must arrive sorted by URL.
    pub fn write(&mut self, entry: FileMetadata) -> Result<()> {
        if let Some(previous) = &self.previous_url {
            if entry.url <= *previous {
                return Err(ReportError::OutOfOrder {
                    url: entry.url,
                    previous: previous.clone(),
                }
                .into());
            }
        }

        self.outcome.stats.record(entry.file_type);
        self.outcome.dropped_records += entry.dropped_records;
        self.file_types.member(&entry.url, &entry.file_type, false)?;

        match entry.file_type {
            FileType::Unknown => writeln!(self.unknown, "{}", entry.url)?,
            FileType::Redirect => writeln!(self.redirects, "{}", entry.url)?,
            _ => {}
        }

        if sitemap::is_listed(entry.file_type, self.options.include_deprecated) {
            let loc = format!("{}{}", self.options.base_url, entry.url);
            self.sitemap.add(
                &loc,
                sitemap::priority(&entry.url, entry.file_type),
                entry.modified.as_ref(),
            )?;
        }

        if entry.file_type.is_page() && !entry.records.is_empty() {
            self.write_records(&entry.url, entry.records)?;
        }

        self.previous_url = Some(entry.url);
        Ok(())
    }

    fn write_records(&mut self, url: &str, mut records: Vec<SearchRecord>) -> Result<()> {
        for record in &mut records {
            if let Some(first_url) = self.seen.get(&record.object_id) {
                return Err(ReportError::DuplicateObjectId {
                    object_id: record.object_id.clone(),
                    url: url.to_string(),
                    first_url: first_url.clone(),
                }
                .into());
            }
            self.seen.insert(record.object_id.clone(), url.to_string());
            if let Some(views) = &self.page_views {
                record.page_views = views.get(&record.url);
            }
            record.escape_fields();
        }

        self.outcome.records += records.len();
        if let Some(index) = self.search_index.as_mut() {
            index.member(url, &records, true)?;
        }
        if self.options.collect_records {
            self.outcome.collected.extend(records);
        }
        Ok(())
    }

    /// Close every report, write the census, and move all files into place.
    pub fn finish(mut self) -> Result<ReportOutcome> {
        let stats_sink = self.pending.create(&self.paths.stats)?;
        self.outcome.stats.write_csv(stats_sink)?;

        self.outcome.sitemap_entries = self.sitemap.entries();
        close(self.sitemap.finish()?)?;
        close(self.file_types.finish()?)?;
        close(self.unknown)?;
        close(self.redirects)?;
        if let Some(index) = self.search_index {
            close(index.finish()?)?;
        }

        self.pending.commit()?;
        Ok(self.outcome)
    }
}

fn close(mut sink: Sink) -> Result<()> {
    sink.flush()?;
    sink.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RECORD_TYPE;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const BASE: &str = "https://kotlinlang.org";

    fn options() -> ReportOptions {
        ReportOptions {
            base_url: BASE.to_string(),
            include_deprecated: false,
            search_index: true,
            collect_records: false,
        }
    }

    fn record(url: &str, object_id: &str) -> SearchRecord {
        SearchRecord {
            object_id: object_id.to_string(),
            headings: String::new(),
            main_title: "Title".to_string(),
            page_title: "Title".to_string(),
            content: "a < b".to_string(),
            url: url.to_string(),
            record_type: RECORD_TYPE.to_string(),
            parent: None,
            page_views: 0,
            product: "help".to_string(),
        }
    }

    fn entry(url: &str, file_type: FileType) -> FileMetadata {
        FileMetadata {
            url: url.to_string(),
            file_type,
            records: Vec::new(),
            dropped_records: 0,
            modified: None,
        }
    }

    fn page(url: &str, object_ids: &[&str]) -> FileMetadata {
        let absolute = format!("{}{}", BASE, url);
        FileMetadata {
            records: object_ids.iter().map(|id| record(&absolute, id)).collect(),
            ..entry(url, FileType::PageDocumentation)
        }
    }

    fn writer(tmp: &TempDir, options: ReportOptions, views: Option<PageViews>) -> (ReportWriter, ReportPaths) {
        let paths = ReportPaths::new(&tmp.path().join("dist"), &tmp.path().join("reports"));
        (ReportWriter::create(paths.clone(), options, views).unwrap(), paths)
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn writes_every_report() {
        let tmp = TempDir::new().unwrap();
        let (mut w, paths) = writer(&tmp, options(), None);
        w.write(entry("/", FileType::PageUndetected)).unwrap();
        w.write(entry("/404.html", FileType::NotFound)).unwrap();
        w.write(page("/docs/x.html", &["https://kotlinlang.org/docs/x.html"])).unwrap();
        w.write(entry("/go.html", FileType::Redirect)).unwrap();
        w.write(entry("/odd.bin", FileType::Unknown)).unwrap();
        let outcome = w.finish().unwrap();

        assert_eq!(outcome.stats.total(), 5);
        assert_eq!(outcome.sitemap_entries, 2);
        assert_eq!(outcome.records, 1);

        let sitemap = read(&paths.sitemap);
        assert!(sitemap.contains("<loc>https://kotlinlang.org/</loc>"));
        assert!(sitemap.contains("<loc>https://kotlinlang.org/docs/x.html</loc>"));
        assert!(!sitemap.contains("404"));

        let types: BTreeMap<String, FileType> =
            serde_json::from_str(&read(&paths.file_types)).unwrap();
        assert_eq!(types.len(), 5);
        assert_eq!(types["/404.html"], FileType::NotFound);

        assert_eq!(read(&paths.unknown), "/odd.bin\n");
        assert_eq!(read(&paths.redirects), "/go.html\n");
        assert!(read(&paths.stats).starts_with("type,count\n"));

        let index: BTreeMap<String, Vec<SearchRecord>> =
            serde_json::from_str(&read(&paths.search_index)).unwrap();
        assert_eq!(index["/docs/x.html"][0].content, "a &lt; b");
    }

    #[test]
    fn dumped_and_pushed_records_are_escaped() {
        let tmp = TempDir::new().unwrap();
        let opts = ReportOptions {
            collect_records: true,
            ..options()
        };
        let (mut w, paths) = writer(&tmp, opts, None);
        let mut meta = page("/docs/list.html", &["https://kotlinlang.org/docs/list.html"]);
        meta.records[0].headings = "List<T>".to_string();
        meta.records[0].main_title = "Map<K, V>".to_string();
        w.write(meta).unwrap();
        let outcome = w.finish().unwrap();

        let index: BTreeMap<String, Vec<SearchRecord>> =
            serde_json::from_str(&read(&paths.search_index)).unwrap();
        let dumped = &index["/docs/list.html"][0];
        assert_eq!(dumped.headings, "List&lt;T&gt;");
        assert_eq!(dumped.main_title, "Map&lt;K, V&gt;");
        assert_eq!(dumped.content, "a &lt; b");
        assert_eq!(&outcome.collected[0], dumped);

        let unescape = |s: &str| s.replace("&lt;", "<").replace("&gt;", ">");
        assert_eq!(unescape(&dumped.headings), "List<T>");
        assert_eq!(unescape(&dumped.content), "a < b");
    }

    #[test]
    fn hidden_and_deprecated_pages_stay_out_of_the_sitemap() {
        let tmp = TempDir::new().unwrap();
        let (mut w, paths) = writer(&tmp, options(), None);
        w.write(entry("/api/older/a.html", FileType::PageApiDeprecated)).unwrap();
        w.write(entry("/frame.html", FileType::Iframe)).unwrap();
        w.write(entry("/secret.html", FileType::Hidden)).unwrap();
        let outcome = w.finish().unwrap();
        assert_eq!(outcome.sitemap_entries, 0);
        assert!(!read(&paths.sitemap).contains("<url>"));

        let tmp = TempDir::new().unwrap();
        let opts = ReportOptions {
            include_deprecated: true,
            ..options()
        };
        let (mut w, _) = writer(&tmp, opts, None);
        w.write(entry("/api/older/a.html", FileType::PageApiDeprecated)).unwrap();
        assert_eq!(w.finish().unwrap().sitemap_entries, 1);
    }

    #[test]
    fn duplicate_object_id_across_pages_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let (mut w, paths) = writer(&tmp, options(), None);
        w.write(page("/docs/a.html", &["same"])).unwrap();
        let err = w.write(page("/docs/b.html", &["same"])).unwrap_err();
        match err.downcast_ref::<ReportError>() {
            Some(ReportError::DuplicateObjectId { url, first_url, .. }) => {
                assert_eq!(url, "/docs/b.html");
                assert_eq!(first_url, "/docs/a.html");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        drop(w);
        assert!(!paths.search_index.exists());
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("reports"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty(), "temporary reports left behind");
    }

    #[test]
    fn aborted_run_keeps_previous_reports() {
        let tmp = TempDir::new().unwrap();
        let (mut w, paths) = writer(&tmp, options(), None);
        w.write(entry("/docs/", FileType::PageDocumentation)).unwrap();
        w.finish().unwrap();
        let before = read(&paths.file_types);

        let (mut w, _) = writer(&tmp, options(), None);
        w.write(entry("/other/", FileType::PageDocumentation)).unwrap();
        drop(w);
        assert_eq!(read(&paths.file_types), before);
    }

    #[test]
    fn entries_must_be_sorted() {
        let tmp = TempDir::new().unwrap();
        let (mut w, _) = writer(&tmp, options(), None);
        w.write(entry("/b.html", FileType::FileText)).unwrap();
        let err = w.write(entry("/a.html", FileType::FileText)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReportError>(),
            Some(ReportError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn page_views_fill_records() {
        let tmp = TempDir::new().unwrap();
        let views = PageViews::from_map(
            [("https://kotlinlang.org/docs/x.html".to_string(), 42)]
                .into_iter()
                .collect(),
        );
        let opts = ReportOptions {
            collect_records: true,
            ..options()
        };
        let (mut w, _) = writer(&tmp, opts, Some(views));
        w.write(page(
            "/docs/x.html",
            &["https://kotlinlang.org/docs/x.html", "https://kotlinlang.org/docs/x.html#a"],
        ))
        .unwrap();
        let outcome = w.finish().unwrap();
        assert_eq!(outcome.collected.len(), 2);
        assert!(outcome.collected.iter().all(|r| r.page_views == 42));
    }

    #[test]
    fn analysis_run_skips_the_search_index() {
        let tmp = TempDir::new().unwrap();
        let opts = ReportOptions {
            search_index: false,
            ..options()
        };
        let (mut w, paths) = writer(&tmp, opts, None);
        w.write(page("/docs/x.html", &["x"])).unwrap();
        w.finish().unwrap();
        assert!(!paths.search_index.exists());
        assert!(paths.file_types.exists());
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let run = |tmp: &TempDir| {
            let (mut w, paths) = writer(tmp, options(), None);
            w.write(entry("/", FileType::PageUndetected)).unwrap();
            w.write(page("/docs/x.html", &["x", "x#a"])).unwrap();
            w.finish().unwrap();
            (read(&paths.sitemap), read(&paths.file_types), read(&paths.search_index))
        };
        let (a, b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
        assert_eq!(run(&a), run(&b));
    }
}

//! Breadth-wise traversal of the output tree.
//!
//! Folders are listed one at a time on the blocking pool; subfolders go to the
//! back of a pending queue, regular files are handed to the caller as they are
//! found. Listing is sorted by file name so discovery order is stable.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Paths excluded before dispatch.
///
/// A file is skipped when its relative path matches one of the globs. A
/// folder is pruned when its path matches a glob ending in `/**` (with that
/// suffix removed), so `spec/**` never even lists `spec/`.
#[derive(Debug, Clone)]
pub struct WalkFilter {
    files: GlobSet,
    folders: GlobSet,
}

impl WalkFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut files = GlobSetBuilder::new();
        let mut folders = GlobSetBuilder::new();
        for pattern in patterns {
            files.add(build_glob(pattern)?);
            if let Some(folder) = pattern.strip_suffix("/**") {
                folders.add(build_glob(folder)?);
            }
        }
        Ok(Self {
            files: files.build()?,
            folders: folders.build()?,
        })
    }

    /// Filter that skips nothing.
    pub fn none() -> Self {
        Self {
            files: GlobSet::empty(),
            folders: GlobSet::empty(),
        }
    }

    pub fn skips_file(&self, relative: &str) -> bool {
        self.files.is_match(relative)
    }

    pub fn skips_folder(&self, relative: &str) -> bool {
        self.folders.is_match(relative)
    }
}

fn build_glob(pattern: &str) -> Result<globset::Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .with_context(|| format!("invalid glob: {}", pattern))
}

/// Traversal totals.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WalkSummary {
    pub folders: usize,
    pub files: usize,
    pub skipped: usize,
}

struct FolderListing {
    folders: Vec<String>,
    files: Vec<String>,
}

/// Walk `root` breadth-wise, calling `on_file` with each regular file's
/// `/`-separated path relative to `root`. An error from `on_file` stops the
/// walk.
pub async fn walk_tree<F>(
    root: &Path,
    filter: &WalkFilter,
    follow_links: bool,
    mut on_file: F,
) -> Result<WalkSummary>
where
    F: FnMut(String) -> Result<()>,
{
    if !root.is_dir() {
        anyhow::bail!("output directory does not exist: {}", root.display());
    }

    let mut summary = WalkSummary::default();
    let mut pending: VecDeque<String> = VecDeque::from([String::new()]);

    while let Some(folder) = pending.pop_front() {
        let root_owned = root.to_path_buf();
        let folder_owned = folder.clone();
        let listing = tokio::task::spawn_blocking(move || {
            list_folder(&root_owned, &folder_owned, follow_links)
        })
        .await
        .context("folder listing task failed")??;
        summary.folders += 1;
        trace!(folder = %folder, files = listing.files.len(), "listed folder");

        for sub in listing.folders {
            if filter.skips_folder(&sub) {
                debug!(folder = %sub, "skipping folder");
                summary.skipped += 1;
                continue;
            }
            pending.push_back(sub);
        }
        for file in listing.files {
            if filter.skips_file(&file) {
                summary.skipped += 1;
                continue;
            }
            summary.files += 1;
            on_file(file)?;
        }
    }

    Ok(summary)
}

fn list_folder(root: &Path, folder: &str, follow_links: bool) -> Result<FolderListing> {
    let dir: PathBuf = if folder.is_empty() {
        root.to_path_buf()
    } else {
        root.join(folder)
    };
    let mut listing = FolderListing {
        folders: Vec::new(),
        files: Vec::new(),
    };

    let walker = WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(follow_links)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let relative = relative_path(root, entry.path())?;
        if entry.file_type().is_dir() {
            listing.folders.push(relative);
        } else if entry.file_type().is_file() {
            listing.files.push(relative);
        }
    }
    Ok(listing)
}

/// `/`-separated path of `path` below `root`. Names that are not valid
/// UTF-8 are an error, since URLs and report keys are built from them.
pub fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .with_context(|| format!("file name is not valid UTF-8: {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

/// Site-relative URL of an output file: `docs/x.html` -> `/docs/x.html`,
/// `docs/index.html` -> `/docs/`, `index.html` -> `/`.
pub fn site_url(relative: &str) -> String {
    if relative == "index.html" {
        return "/".to_string();
    }
    match relative.strip_suffix("/index.html") {
        Some(folder) => format!("/{}/", folder),
        None => format!("/{}", relative),
    }
}

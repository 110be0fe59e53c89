//! File classification.
//!
//! Assigns every output file exactly one [`FileType`]. Classification is an
//! ordered decision table, first match wins:
//!
//! 1. [`EXTENSION_RULES`]: non-HTML files, decided from the path alone.
//! 2. [`PAGE_RULES`]: HTML pages (paths ending in `/` or `.html`), decided from
//!    the path and the parsed markup.
//! 3. Everything else is [`FileType::Unknown`].
//!
//! The parsed document is handed back to the caller so extraction does not
//! parse the page a second time.

use scraper::{Html, Selector};
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::FileType;

/// An HTML-like file that could not be turned into markup.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid UTF-8 markup: {source}")]
    InvalidUtf8 {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Result of classifying one file.
pub struct Classification {
    pub file_type: FileType,
    /// Present when the markup had to be parsed to decide the type.
    pub document: Option<Html>,
}

impl std::fmt::Debug for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classification")
            .field("file_type", &self.file_type)
            .field("document", &self.document.is_some())
            .finish()
    }
}

/// Extension rules, checked in order before any markup is parsed.
pub const EXTENSION_RULES: &[(&[&str], FileType)] = &[
    (&["package-list", ".txt"], FileType::FileText),
    (&[".pdf"], FileType::FilePdf),
    (&[".zip", ".tar", ".gz", ".tgz"], FileType::FileArchive),
    (&[".js", ".mjs", ".css", ".map"], FileType::FileAsset),
    (&[".woff", ".woff2", ".ttf", ".eot", ".otf"], FileType::FileFont),
    (
        &[".json", ".xml", ".yml", ".yaml", ".csv", ".webmanifest"],
        FileType::FileData,
    ),
    (&["license", "license.md", "notice"], FileType::FileLicense),
    (
        &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".avif"],
        FileType::FileImage,
    ),
];

/// Path and markup of the page being classified.
pub struct PageUnderTest<'a> {
    pub path: &'a str,
    pub document: &'a Html,
}

impl PageUnderTest<'_> {
    fn has(&self, selector: &Selector) -> bool {
        self.document.select(selector).next().is_some()
    }

    fn is_api(&self) -> bool {
        self.path.starts_with("api/")
    }
}

/// One row of the page decision table.
pub struct PageRule {
    pub name: &'static str,
    pub matches: fn(&PageUnderTest<'_>) -> bool,
    pub file_type: FileType,
}

/// Page rules in priority order. The order is the policy: a `noindex` page is
/// `Hidden` whatever else it is, an `api/` redirect is a `Redirect`, and so on.
pub const PAGE_RULES: &[PageRule] = &[
    PageRule {
        name: "meta-refresh",
        matches: |p| p.has(&MARKERS.refresh),
        file_type: FileType::Redirect,
    },
    PageRule {
        name: "robots-noindex",
        matches: |p| {
            p.document.select(&MARKERS.robots).any(|meta| {
                meta.value()
                    .attr("content")
                    .is_some_and(|c| c.to_ascii_lowercase().contains("noindex"))
            })
        },
        file_type: FileType::Hidden,
    },
    PageRule {
        name: "not-found",
        matches: |p| is_not_found_path(p.path),
        file_type: FileType::NotFound,
    },
    PageRule {
        name: "spec",
        matches: |p| p.path.starts_with("spec/"),
        file_type: FileType::PageSpec,
    },
    PageRule {
        name: "grammar",
        matches: |p| p.path == GRAMMAR_PAGE,
        file_type: FileType::PageGrammar,
    },
    PageRule {
        name: "api-deprecated",
        matches: |p| p.is_api() && p.path.contains("/older/"),
        file_type: FileType::PageApiDeprecated,
    },
    PageRule {
        name: "api-iframe",
        matches: |p| {
            p.is_api()
                && (file_name(p.path) == "navigation.html"
                    || p.has(&MARKERS.iframe_body)
                    || p.has(&MARKERS.frameset))
        },
        file_type: FileType::Iframe,
    },
    PageRule {
        name: "api-stdlib",
        matches: |p| p.is_api() && is_stdlib_path(p.path),
        file_type: FileType::PageApiStdlib,
    },
    PageRule {
        name: "api-test",
        matches: |p| p.is_api() && p.path.split('/').nth(2) == Some("kotlin.test"),
        file_type: FileType::PageApiTest,
    },
    PageRule {
        name: "api",
        matches: |p| p.is_api(),
        file_type: FileType::PageApi,
    },
    PageRule {
        name: "community",
        matches: |p| p.path.starts_with("community/"),
        file_type: FileType::PageCommunity,
    },
    PageRule {
        name: "documentation",
        matches: |p| p.has(&MARKERS.documentation),
        file_type: FileType::PageDocumentation,
    },
    PageRule {
        name: "legacy-documentation",
        matches: |p| p.has(&MARKERS.legacy),
        file_type: FileType::PageLegacyDocumentation,
    },
];

const GRAMMAR_PAGE: &str = "docs/reference/grammar.html";

struct Markers {
    refresh: Selector,
    robots: Selector,
    iframe_body: Selector,
    frameset: Selector,
    documentation: Selector,
    legacy: Selector,
}

static MARKERS: LazyLock<Markers> = LazyLock::new(|| Markers {
    refresh: Selector::parse(r#"meta[http-equiv="refresh"]"#).expect("refresh selector"),
    robots: Selector::parse(r#"meta[name="robots"]"#).expect("robots selector"),
    iframe_body: Selector::parse("body.iframe").expect("iframe selector"),
    frameset: Selector::parse("frameset").expect("frameset selector"),
    documentation: Selector::parse("[data-article-props], article.article")
        .expect("documentation selector"),
    legacy: Selector::parse(".page-content, body.page-legacy").expect("legacy selector"),
});

/// Classify a file of the output tree. `root` is the tree, `relative` the
/// file's path below it with `/` separators.
pub fn classify_file(root: &Path, relative: &str) -> Result<Classification, ClassifyError> {
    if let Some(file_type) = classify_by_extension(relative) {
        return Ok(Classification {
            file_type,
            document: None,
        });
    }
    if !is_html_like(relative) {
        return Ok(Classification {
            file_type: FileType::Unknown,
            document: None,
        });
    }

    let bytes = std::fs::read(root.join(relative)).map_err(|source| ClassifyError::Read {
        path: relative.to_string(),
        source,
    })?;
    let markup = String::from_utf8(bytes).map_err(|source| ClassifyError::InvalidUtf8 {
        path: relative.to_string(),
        source,
    })?;
    Ok(classify_markup(relative, &markup))
}

/// Classify a page whose markup is already in memory.
pub fn classify_markup(relative: &str, markup: &str) -> Classification {
    if let Some(file_type) = classify_by_extension(relative) {
        return Classification {
            file_type,
            document: None,
        };
    }
    if !is_html_like(relative) {
        return Classification {
            file_type: FileType::Unknown,
            document: None,
        };
    }

    let document = Html::parse_document(markup);
    let file_type = classify_page(relative, &document);
    Classification {
        file_type,
        document: Some(document),
    }
}

/// Run [`PAGE_RULES`] against a parsed page.
pub fn classify_page(relative: &str, document: &Html) -> FileType {
    let page = PageUnderTest {
        path: relative,
        document,
    };
    PAGE_RULES
        .iter()
        .find(|rule| (rule.matches)(&page))
        .map(|rule| rule.file_type)
        .unwrap_or(FileType::PageUndetected)
}

pub fn classify_by_extension(relative: &str) -> Option<FileType> {
    let name = file_name(relative).to_ascii_lowercase();
    EXTENSION_RULES
        .iter()
        .find(|(patterns, _)| {
            patterns.iter().any(|p| {
                if p.starts_with('.') {
                    name.ends_with(p)
                } else {
                    name == *p
                }
            })
        })
        .map(|(_, ty)| *ty)
}

pub fn is_html_like(relative: &str) -> bool {
    relative.ends_with('/') || relative.ends_with(".html")
}

fn file_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

fn is_not_found_path(relative: &str) -> bool {
    file_name(relative) == "404.html" || relative == "404/" || relative.starts_with("404/")
}

/// `api/<version>/jvm/stdlib/...` and the unversioned `api/core/...` tree.
fn is_stdlib_path(relative: &str) -> bool {
    let segments: Vec<&str> = relative.split('/').collect();
    matches!(segments.as_slice(), ["api", "core", ..])
        || matches!(segments.as_slice(), ["api", _, "jvm", "stdlib", ..])
}

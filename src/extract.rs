//! Search record extraction from classified pages.
//!
//! [`Extractor`] holds a lookup table from [`FileType`] to an
//! [`ExtractStrategy`]. Page types without an entry produce no records.
//!
//! | Type | Strategy | Records |
//! |------|----------|---------|
//! | `Page_Documentation` | [`SectionStrategy`] on the article | lead + one per `h2` |
//! | `Page_LegacyDocumentation` | [`SectionStrategy`] on `.page-content` | lead + one per `h2` |
//! | `Page_Community` | [`SectionStrategy`] on `main` | lead + one per `h2` |
//! | `Page_API`, `Page_API_stdlib`, `Page_API_test` | [`ApiStrategy`] | one |

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::models::{FileType, SearchRecord, RECORD_TYPE};

/// Page being extracted.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Absolute URL of the page.
    pub url: &'a str,
    pub file_type: FileType,
    pub max_content_chars: usize,
}

/// How records are pulled out of one kind of page.
pub trait ExtractStrategy: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Produce candidate records in page order. Validation happens in
    /// [`Extractor::extract`].
    fn extract(&self, document: &Html, page: &PageContext<'_>) -> Vec<SearchRecord>;
}

/// Records kept for a page plus the number dropped by validation.
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<SearchRecord>,
    pub dropped: usize,
    /// False when the page type has no strategy.
    pub supported: bool,
}

pub struct Extractor {
    strategies: HashMap<FileType, Box<dyn ExtractStrategy>>,
    max_content_chars: usize,
}

impl Extractor {
    /// Extractor with the built-in strategy table.
    pub fn new(max_content_chars: usize) -> Self {
        let mut extractor = Self {
            strategies: HashMap::new(),
            max_content_chars,
        };
        extractor.register(
            FileType::PageDocumentation,
            Box::new(SectionStrategy::new(
                "[data-article-props], article.article, article",
                "help",
            )),
        );
        extractor.register(
            FileType::PageLegacyDocumentation,
            Box::new(SectionStrategy::new(".page-content", "help")),
        );
        extractor.register(
            FileType::PageCommunity,
            Box::new(SectionStrategy::new("main, article", "community")),
        );
        for ty in [
            FileType::PageApi,
            FileType::PageApiStdlib,
            FileType::PageApiTest,
        ] {
            extractor.register(ty, Box::new(ApiStrategy::new()));
        }
        extractor
    }

    /// Replace (or add) the strategy for a type.
    pub fn register(&mut self, file_type: FileType, strategy: Box<dyn ExtractStrategy>) {
        self.strategies.insert(file_type, strategy);
    }

    pub fn has_strategy(&self, file_type: FileType) -> bool {
        self.strategies.contains_key(&file_type)
    }

    /// Extract and validate the records of one page.
    pub fn extract(&self, document: &Html, file_type: FileType, url: &str) -> Extraction {
        let Some(strategy) = self.strategies.get(&file_type) else {
            debug!(url, %file_type, "no parser for type");
            return Extraction::default();
        };

        let page = PageContext {
            url,
            file_type,
            max_content_chars: self.max_content_chars,
        };
        let mut extraction = Extraction {
            supported: true,
            ..Extraction::default()
        };
        for record in strategy.extract(document, &page) {
            if record.is_valid() {
                extraction.records.push(record);
            } else {
                warn!(
                    url,
                    object_id = %record.object_id,
                    strategy = strategy.name(),
                    "dropping invalid record (objectID, url, pageTitle and content are required)"
                );
                extraction.dropped += 1;
            }
        }
        extraction
    }
}

/// Lead record plus one record per `h2` section of a content root.
pub struct SectionStrategy {
    root: Selector,
    product: &'static str,
}

impl SectionStrategy {
    pub fn new(root: &str, product: &'static str) -> Self {
        Self {
            root: Selector::parse(root).expect("section root selector"),
            product,
        }
    }
}

impl ExtractStrategy for SectionStrategy {
    fn name(&self) -> &'static str {
        "sections"
    }

    fn extract(&self, document: &Html, page: &PageContext<'_>) -> Vec<SearchRecord> {
        let root = pick_root(document, &self.root);
        let page_title = page_title(document);
        let main_title = first_text(root, &SELECTORS.h1).unwrap_or_else(|| page_title.clone());

        let mut collector = TextCollector::new(true);
        collector.reserve_ids(document.root_element());
        collector.walk(root);
        let TextCollector {
            intro, sections, ..
        } = collector;

        let intro = collapse_whitespace(&intro);
        let lead_content = if intro.is_empty() {
            sections
                .first()
                .map(|s| collapse_whitespace(&s.text))
                .unwrap_or_default()
        } else {
            intro
        };

        let make = |object_id: String, headings: String, parent: Option<String>, text: &str| {
            SearchRecord {
                object_id,
                headings,
                main_title: main_title.clone(),
                page_title: page_title.clone(),
                content: truncate_chars(text, page.max_content_chars),
                url: page.url.to_string(),
                record_type: RECORD_TYPE.to_string(),
                parent,
                page_views: 0,
                product: self.product.to_string(),
            }
        };

        let mut records = vec![make(
            page.url.to_string(),
            main_title.clone(),
            None,
            &lead_content,
        )];
        for section in &sections {
            records.push(make(
                format!("{}#{}", page.url, section.anchor),
                section.heading.clone(),
                Some(page.url.to_string()),
                &collapse_whitespace(&section.text),
            ));
        }
        records
    }
}

/// One record per API declaration page.
pub struct ApiStrategy {
    content: Selector,
}

impl ApiStrategy {
    pub fn new() -> Self {
        Self {
            content: Selector::parse(".main-content, #content, .content")
                .expect("api content selector"),
        }
    }
}

impl Default for ApiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractStrategy for ApiStrategy {
    fn name(&self) -> &'static str {
        "api"
    }

    fn extract(&self, document: &Html, page: &PageContext<'_>) -> Vec<SearchRecord> {
        let root = pick_root(document, &self.content);
        let page_title = page_title(document);
        let heading = first_text(root, &SELECTORS.h1)
            .or_else(|| first_text(document.root_element(), &SELECTORS.h1))
            .unwrap_or_else(|| page_title.clone());

        let mut collector = TextCollector::new(false);
        collector.walk(root);
        let content = collapse_whitespace(&collector.intro);

        vec![SearchRecord {
            object_id: page.url.to_string(),
            headings: heading.clone(),
            main_title: heading,
            page_title,
            content: truncate_chars(&content, page.max_content_chars),
            url: page.url.to_string(),
            record_type: RECORD_TYPE.to_string(),
            parent: None,
            page_views: 0,
            product: "api".to_string(),
        }]
    }
}

/// Last modification time declared by the page markup.
pub fn page_modified(document: &Html) -> Option<DateTime<Utc>> {
    document
        .select(&SELECTORS.modified)
        .filter_map(|meta| meta.value().attr("content"))
        .find_map(parse_timestamp)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

struct Selectors {
    h1: Selector,
    title: Selector,
    body: Selector,
    modified: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    h1: Selector::parse("h1").expect("h1 selector"),
    title: Selector::parse("head > title, title").expect("title selector"),
    body: Selector::parse("body").expect("body selector"),
    modified: Selector::parse(
        r#"meta[property="article:modified_time"], meta[name="last-modified"]"#,
    )
    .expect("modified selector"),
});

/// Subtrees that never contribute text.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "nav", "head", "h1",
];

/// Tags whose boundaries separate words.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "pre", "section", "article", "table", "tr", "td", "th",
    "br", "h3", "h4", "h5", "h6", "blockquote", "dd", "dt",
];

fn pick_root<'a>(document: &'a Html, preferred: &Selector) -> ElementRef<'a> {
    document
        .select(preferred)
        .next()
        .or_else(|| document.select(&SELECTORS.body).next())
        .unwrap_or_else(|| document.root_element())
}

fn page_title(document: &Html) -> String {
    document
        .select(&SELECTORS.title)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .unwrap_or_default()
}

fn first_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

struct Section {
    heading: String,
    anchor: String,
    text: String,
}

/// Walks a content root in document order, splitting text at `h2` headings
/// when `split` is set.
struct TextCollector {
    split: bool,
    intro: String,
    sections: Vec<Section>,
    anchors: HashSet<String>,
    reserved: HashSet<String>,
}

impl TextCollector {
    fn new(split: bool) -> Self {
        Self {
            split,
            intro: String::new(),
            sections: Vec::new(),
            anchors: HashSet::new(),
            reserved: HashSet::new(),
        }
    }

    /// Keep every id present in the document out of the generated slugs.
    fn reserve_ids(&mut self, root: ElementRef<'_>) {
        self.reserved.extend(
            root.descendants()
                .filter_map(ElementRef::wrap)
                .filter_map(|el| el.value().id().map(str::to_string)),
        );
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.push_text(text);
            } else if let Some(el) = ElementRef::wrap(child) {
                let tag = el.value().name();
                if SKIPPED_TAGS.contains(&tag) {
                    continue;
                }
                if self.split && tag == "h2" {
                    self.start_section(el);
                    continue;
                }
                let block = BLOCK_TAGS.contains(&tag);
                if block {
                    self.push_text(" ");
                }
                self.walk(el);
                if block {
                    self.push_text(" ");
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        match self.sections.last_mut() {
            Some(section) => section.text.push_str(text),
            None => self.intro.push_str(text),
        }
    }

    fn start_section(&mut self, heading: ElementRef<'_>) {
        let text = collapse_whitespace(&heading.text().collect::<String>());
        let anchor = heading
            .value()
            .id()
            .map(str::to_string)
            .or_else(|| {
                heading
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .find_map(|el| el.value().id().map(str::to_string))
            })
            .unwrap_or_else(|| self.unique_slug(&text));
        self.anchors.insert(anchor.clone());
        self.sections.push(Section {
            heading: text,
            anchor,
            text: String::new(),
        });
    }

    /// Slug for a heading without an id. It never matches an earlier anchor
    /// or any id in the document. Repeated explicit ids are reported as
    /// collisions later.
    fn unique_slug(&self, text: &str) -> String {
        let base = slugify(text);
        let base = if base.is_empty() {
            "section".to_string()
        } else {
            base
        };
        let taken = |slug: &str| self.anchors.contains(slug) || self.reserved.contains(slug);
        if !taken(&base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max` characters without splitting a char.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

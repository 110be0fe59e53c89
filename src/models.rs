//! Core data models used throughout the indexer.
//!
//! These types represent the classified files and search records that flow
//! from the workers to the report writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed taxonomy of output files.
///
/// Serialized names are the ones written to every report and must stay stable
/// across runs so reports can be diffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "File_Text")]
    FileText,
    #[serde(rename = "File_Pdf")]
    FilePdf,
    #[serde(rename = "File_Archive")]
    FileArchive,
    #[serde(rename = "File_Asset")]
    FileAsset,
    #[serde(rename = "File_Font")]
    FileFont,
    #[serde(rename = "File_Data")]
    FileData,
    #[serde(rename = "File_License")]
    FileLicense,
    #[serde(rename = "File_Image")]
    FileImage,
    #[serde(rename = "Page_Undetected")]
    PageUndetected,
    #[serde(rename = "NotFound")]
    NotFound,
    #[serde(rename = "Page_Spec")]
    PageSpec,
    #[serde(rename = "Page_Grammar")]
    PageGrammar,
    #[serde(rename = "Page_API")]
    PageApi,
    #[serde(rename = "Page_API_stdlib")]
    PageApiStdlib,
    #[serde(rename = "Page_API_test")]
    PageApiTest,
    #[serde(rename = "Page_API_Deprecated")]
    PageApiDeprecated,
    #[serde(rename = "Page_Community")]
    PageCommunity,
    #[serde(rename = "Page_Documentation")]
    PageDocumentation,
    #[serde(rename = "Page_LegacyDocumentation")]
    PageLegacyDocumentation,
    #[serde(rename = "Iframe")]
    Iframe,
    #[serde(rename = "Redirect")]
    Redirect,
    #[serde(rename = "Hidden")]
    Hidden,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl FileType {
    /// Every variant, in report order.
    pub const ALL: [FileType; 23] = [
        FileType::FileText,
        FileType::FilePdf,
        FileType::FileArchive,
        FileType::FileAsset,
        FileType::FileFont,
        FileType::FileData,
        FileType::FileLicense,
        FileType::FileImage,
        FileType::PageUndetected,
        FileType::NotFound,
        FileType::PageSpec,
        FileType::PageGrammar,
        FileType::PageApi,
        FileType::PageApiStdlib,
        FileType::PageApiTest,
        FileType::PageApiDeprecated,
        FileType::PageCommunity,
        FileType::PageDocumentation,
        FileType::PageLegacyDocumentation,
        FileType::Iframe,
        FileType::Redirect,
        FileType::Hidden,
        FileType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::FileText => "File_Text",
            FileType::FilePdf => "File_Pdf",
            FileType::FileArchive => "File_Archive",
            FileType::FileAsset => "File_Asset",
            FileType::FileFont => "File_Font",
            FileType::FileData => "File_Data",
            FileType::FileLicense => "File_License",
            FileType::FileImage => "File_Image",
            FileType::PageUndetected => "Page_Undetected",
            FileType::NotFound => "NotFound",
            FileType::PageSpec => "Page_Spec",
            FileType::PageGrammar => "Page_Grammar",
            FileType::PageApi => "Page_API",
            FileType::PageApiStdlib => "Page_API_stdlib",
            FileType::PageApiTest => "Page_API_test",
            FileType::PageApiDeprecated => "Page_API_Deprecated",
            FileType::PageCommunity => "Page_Community",
            FileType::PageDocumentation => "Page_Documentation",
            FileType::PageLegacyDocumentation => "Page_LegacyDocumentation",
            FileType::Iframe => "Iframe",
            FileType::Redirect => "Redirect",
            FileType::Hidden => "Hidden",
            FileType::Unknown => "Unknown",
        }
    }

    /// `Page_*` variants: real pages that may appear in the sitemap.
    pub fn is_page(&self) -> bool {
        self.as_str().starts_with("Page_")
    }

    /// `Page_API*` variants.
    pub fn is_api(&self) -> bool {
        self.as_str().starts_with("Page_API")
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key order of a serialized [`SearchRecord`].
///
/// Earlier dumps used this order; keeping it keeps diffs between runs small.
pub const RECORD_KEY_ORDER: [&str; 10] = [
    "objectID",
    "headings",
    "mainTitle",
    "pageTitle",
    "content",
    "url",
    "type",
    "parent",
    "pageViews",
    "product",
];

/// One indexable unit of page content.
///
/// Field order matches [`RECORD_KEY_ORDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub headings: String,
    #[serde(rename = "mainTitle")]
    pub main_title: String,
    #[serde(rename = "pageTitle")]
    pub page_title: String,
    pub content: String,
    pub url: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub parent: Option<String>,
    #[serde(rename = "pageViews")]
    pub page_views: u64,
    pub product: String,
}

/// Value of [`SearchRecord::record_type`] for every record.
pub const RECORD_TYPE: &str = "Documentation";

impl SearchRecord {
    /// A record passes validation when every field the hosted index keys on
    /// or displays is non-empty.
    pub fn is_valid(&self) -> bool {
        !self.object_id.is_empty()
            && !self.url.is_empty()
            && !self.page_title.is_empty()
            && !self.content.is_empty()
    }

    /// Escape `<` and `>` in every string field so the hosted index never
    /// renders record text as markup.
    pub fn escape_fields(&mut self) {
        for field in [
            &mut self.object_id,
            &mut self.headings,
            &mut self.main_title,
            &mut self.page_title,
            &mut self.content,
            &mut self.url,
            &mut self.record_type,
            &mut self.product,
        ] {
            *field = escape_markup(field);
        }
        if let Some(parent) = self.parent.as_mut() {
            *parent = escape_markup(parent);
        }
    }
}

/// Escape the characters the hosted index would otherwise render as markup.
pub fn escape_markup(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}

/// Classification + extraction result for a single output file.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Site-relative URL, always starting with `/`.
    pub url: String,
    pub file_type: FileType,
    pub records: Vec<SearchRecord>,
    /// Candidate records rejected by validation.
    pub dropped_records: usize,
    pub modified: Option<DateTime<Utc>>,
}

//! `sitemap.xml` writer and priority policy.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

use crate::models::FileType;

/// File name of the sitemap, at the root of the output tree.
pub const SITEMAP_FILE: &str = "sitemap.xml";

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Sitemap priority tiers. Fixed SEO policy, not derived from anything.
pub const PRIORITY_TOP: f32 = 1.0;
pub const PRIORITY_DEFAULT: f32 = 0.8;
pub const PRIORITY_API: f32 = 0.5;
pub const PRIORITY_LEGACY: f32 = 0.1;

/// Priority of a page. `url` is site-relative.
pub fn priority(url: &str, file_type: FileType) -> f32 {
    if url == "/" || file_type == FileType::PageDocumentation {
        PRIORITY_TOP
    } else if file_type.is_api() {
        PRIORITY_API
    } else if file_type == FileType::PageLegacyDocumentation {
        PRIORITY_LEGACY
    } else {
        PRIORITY_DEFAULT
    }
}

/// Whether a file of this type gets a `<url>` entry.
pub fn is_listed(file_type: FileType, include_deprecated: bool) -> bool {
    match file_type {
        FileType::PageApiDeprecated => include_deprecated,
        other => other.is_page(),
    }
}

/// Streams `<url>` entries into a sitemap document.
pub struct SitemapWriter<W: Write> {
    writer: Writer<W>,
    entries: usize,
}

impl<W: Write> SitemapWriter<W> {
    /// Write the XML declaration and open `<urlset>`.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(
            BytesStart::new("urlset").with_attributes([("xmlns", SITEMAP_NS)]),
        ))?;
        Ok(Self { writer, entries: 0 })
    }

    pub fn add(
        &mut self,
        loc: &str,
        priority: f32,
        lastmod: Option<&DateTime<Utc>>,
    ) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new("url")))?;
        self.text_element("loc", loc)?;
        if let Some(modified) = lastmod {
            self.text_element(
                "lastmod",
                &modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            )?;
        }
        self.text_element("priority", &format!("{:.1}", priority))?;
        self.writer.write_event(Event::End(BytesEnd::new("url")))?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Close `<urlset>` and return the underlying writer, flushed.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_event(Event::End(BytesEnd::new("urlset")))?;
        let mut inner = self.writer.into_inner();
        inner.write_all(b"\n")?;
        inner.flush()?;
        Ok(inner)
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn priority_table() {
        assert_eq!(priority("/", FileType::PageUndetected), PRIORITY_TOP);
        assert_eq!(priority("/docs/x.html", FileType::PageDocumentation), PRIORITY_TOP);
        assert_eq!(priority("/api/core/", FileType::PageApiStdlib), PRIORITY_API);
        assert_eq!(priority("/api/x/", FileType::PageApi), PRIORITY_API);
        assert_eq!(
            priority("/education/", FileType::PageLegacyDocumentation),
            PRIORITY_LEGACY
        );
        assert_eq!(priority("/community/", FileType::PageCommunity), PRIORITY_DEFAULT);
        assert_eq!(priority("/spec/a.html", FileType::PageSpec), PRIORITY_DEFAULT);
    }

    #[test]
    fn listing_policy() {
        assert!(is_listed(FileType::PageDocumentation, false));
        assert!(is_listed(FileType::PageUndetected, false));
        assert!(!is_listed(FileType::NotFound, false));
        assert!(!is_listed(FileType::Hidden, true));
        assert!(!is_listed(FileType::Redirect, true));
        assert!(!is_listed(FileType::Iframe, true));
        assert!(!is_listed(FileType::PageApiDeprecated, false));
        assert!(is_listed(FileType::PageApiDeprecated, true));
    }

    #[test]
    fn writes_urlset() {
        let mut sitemap = SitemapWriter::new(Vec::new()).unwrap();
        let modified = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        sitemap.add("https://kotlinlang.org/", 1.0, None).unwrap();
        sitemap
            .add("https://kotlinlang.org/docs/a&b.html", 0.8, Some(&modified))
            .unwrap();
        assert_eq!(sitemap.entries(), 2);
        let xml = String::from_utf8(sitemap.finish().unwrap()).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#));
        assert!(xml.contains("<loc>https://kotlinlang.org/</loc>"));
        assert!(xml.contains("<loc>https://kotlinlang.org/docs/a&amp;b.html</loc>"));
        assert!(xml.contains("<lastmod>2024-05-01T10:00:00Z</lastmod>"));
        assert!(xml.contains("<priority>0.8</priority>"));
        assert_eq!(xml.matches("<url>").count(), 2);
        assert!(xml.trim_end().ends_with("</urlset>"));
    }
}

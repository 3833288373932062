//! Sidecar (`.nfo`) metadata writer.
//!
//! Media servers read a `<movie>` XML document next to each source. Every
//! text node goes through quick-xml's escaper, so `&`, `<` and quotes in
//! file names or URLs cannot break the document.

use std::fmt::Display;
use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::write_atomic;

/// Contents of one sidecar record.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarMetadata {
    /// Display title, usually the source file stem
    pub title: String,
    /// Remote media URL
    pub source_url: String,
    /// File name of the thumbnail next to the sidecar
    pub thumbnail_file: String,
    /// When the sidecar was generated
    pub created: DateTime<Utc>,
    /// Probed duration, if known
    pub duration: Option<f64>,
}

fn xml_error(e: impl Display) -> MediaError {
    MediaError::internal(format!("failed to render sidecar: {}", e))
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> MediaResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

/// Render the sidecar document.
pub fn render_sidecar(meta: &SidecarMetadata) -> MediaResult<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("movie")))
        .map_err(xml_error)?;

    write_text_element(&mut writer, "title", &meta.title)?;
    write_text_element(&mut writer, "url", &meta.source_url)?;
    write_text_element(&mut writer, "thumb", &meta.thumbnail_file)?;
    write_text_element(
        &mut writer,
        "dateadded",
        &meta.created.format("%Y-%m-%d %H:%M:%S").to_string(),
    )?;
    if let Some(duration) = meta.duration {
        write_text_element(
            &mut writer,
            "durationinseconds",
            &format!("{}", duration.round() as u64),
        )?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("movie")))
        .map_err(xml_error)?;

    let mut xml = String::from_utf8(writer.into_inner().into_inner()).map_err(xml_error)?;
    xml.push('\n');
    Ok(xml)
}

/// Render and atomically write the sidecar to `path`.
pub async fn write_sidecar(path: impl AsRef<Path>, meta: &SidecarMetadata) -> MediaResult<()> {
    let xml = render_sidecar(meta)?;
    write_atomic(path, xml).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn meta() -> SidecarMetadata {
        SidecarMetadata {
            title: "Tom & Jerry <Uncut>".to_string(),
            source_url: "https://cdn.example.com/v.mkv?a=1&b=\"2\"".to_string(),
            thumbnail_file: "Tom & Jerry-thumb.jpg".to_string(),
            created: Utc.with_ymd_and_hms(2024, 3, 9, 14, 30, 0).unwrap(),
            duration: Some(5400.4),
        }
    }

    #[test]
    fn test_render_escapes_text() {
        let xml = render_sidecar(&meta()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"));
        assert!(xml.contains("<title>Tom &amp; Jerry &lt;Uncut&gt;</title>"));
        assert!(xml.contains("a=1&amp;b="));
        assert!(!xml.contains("Tom & Jerry"));
        assert!(xml.contains("<dateadded>2024-03-09 14:30:00</dateadded>"));
        assert!(xml.contains("<durationinseconds>5400</durationinseconds>"));
    }

    #[test]
    fn test_render_without_duration() {
        let mut meta = meta();
        meta.duration = None;
        let xml = render_sidecar(&meta).unwrap();
        assert!(!xml.contains("durationinseconds"));
        assert!(xml.trim_end().ends_with("</movie>"));
    }

    #[tokio::test]
    async fn test_write_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Movie.nfo");

        write_sidecar(&path, &meta()).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("<movie>"));
        assert!(contents.contains("<thumb>Tom &amp; Jerry-thumb.jpg</thumb>"));
    }
}

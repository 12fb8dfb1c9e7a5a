//! Plain-text extraction from supported document formats.
//!
//! The format is chosen by file extension. PDFs go through `pdf-extract`;
//! DOCX and PPTX are ZIP containers whose text runs (`<w:t>` / `<a:t>`) are
//! read with `quick-xml`; a fixed set of text formats is read as UTF-8.

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "rst", "csv", "json", "toml", "yaml", "yml", "html",
];

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Document format, keyed off the lowercase extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Pptx,
    Text,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(Format::Pdf),
            "docx" => Ok(Format::Docx),
            "pptx" => Ok(Format::Pptx),
            e if TEXT_EXTENSIONS.contains(&e) => Ok(Format::Text),
            "" => Err(ExtractError::Unsupported(format!(
                "{} has no extension",
                path.display()
            ))),
            e => Err(ExtractError::Unsupported(format!(".{e}"))),
        }
    }
}

/// Read `path` and return its plain text.
pub async fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let format = Format::from_path(path)?;
    let bytes = tokio::fs::read(path).await?;
    extract_bytes(&bytes, format)
}

pub fn extract_bytes(bytes: &[u8], format: Format) -> Result<String, ExtractError> {
    match format {
        Format::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        Format::Docx => extract_docx(bytes),
        Format::Pptx => extract_pptx(bytes),
        Format::Text => Ok(String::from_utf8(bytes.to_vec())?),
    }
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "{name} exceeds size limit ({MAX_XML_ENTRY_BYTES} bytes)"
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    text_runs(&xml, b"p")
}

/// Slides in numeric order, separated by blank lines so each slide starts a
/// new paragraph for the chunker.
fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    slides.sort();

    let mut out = Vec::new();
    for (_, name) in slides {
        let xml = read_entry(&mut archive, &name)?;
        let text = text_runs(&xml, b"p")?;
        if !text.trim().is_empty() {
            out.push(text);
        }
    }
    Ok(out.join("\n\n"))
}

/// Concatenate every `<*:t>` run; a closing `paragraph` element ends a line.
fn text_runs(xml: &[u8], paragraph: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_text = false;
                } else if name.as_ref() == paragraph && !out.ends_with('\n') && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn ooxml(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            for (name, body) in entries {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn format_by_extension() {
        assert_eq!(Format::from_path(Path::new("a/b.PDF")).unwrap(), Format::Pdf);
        assert_eq!(Format::from_path(Path::new("notes.md")).unwrap(), Format::Text);
        assert_eq!(Format::from_path(Path::new("deck.pptx")).unwrap(), Format::Pptx);
        assert!(matches!(
            Format::from_path(Path::new("image.png")),
            Err(ExtractError::Unsupported(_))
        ));
        assert!(matches!(
            Format::from_path(Path::new("Makefile")),
            Err(ExtractError::Unsupported(_))
        ));
    }

    #[test]
    fn invalid_pdf_is_an_error() {
        let err = extract_bytes(b"not a pdf", Format::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_is_an_error() {
        let err = extract_bytes(b"not a zip", Format::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let doc = r#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let bytes = ooxml(&[("word/document.xml", doc)]);
        let text = extract_bytes(&bytes, Format::Docx).unwrap();
        assert_eq!(text, "Hello world\nSecond & last");
    }

    #[test]
    fn docx_without_body_is_an_error() {
        let bytes = ooxml(&[("other.xml", "<x/>")]);
        assert!(matches!(
            extract_bytes(&bytes, Format::Docx),
            Err(ExtractError::Ooxml(_))
        ));
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |s: &str| format!(r#"<p:sld xmlns:a="a" xmlns:p="p"><a:p><a:r><a:t>{s}</a:t></a:r></a:p></p:sld>"#);
        let (s1, s2, s10) = (slide("one"), slide("two"), slide("ten"));
        let bytes = ooxml(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
            ("ppt/slides/slide1.xml", s1.as_str()),
        ]);
        let text = extract_bytes(&bytes, Format::Pptx).unwrap();
        assert_eq!(text, "one\n\ntwo\n\nten");
    }

    #[tokio::test]
    async fn text_files_are_read_verbatim() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "plain\n\ntext").unwrap();
        assert_eq!(extract_file(&path).await.unwrap(), "plain\n\ntext");
    }

    #[tokio::test]
    async fn non_utf8_text_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            extract_file(&path).await,
            Err(ExtractError::NotUtf8(_))
        ));
    }
}

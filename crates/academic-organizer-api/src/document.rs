//! Plain-text extraction from course documents (text, Markdown, PDF).

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("document is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Pdf,
}

impl DocumentKind {
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Classify a document by its file extension.
    ///
    /// # Errors
    /// Returns [`DocumentError::UnsupportedFormat`] for images and unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return Err(DocumentError::UnsupportedFormat("(no extension)".to_string()));
        };
        Self::from_extension(extension).ok_or_else(|| {
            DocumentError::UnsupportedFormat(format!(".{}", extension.to_ascii_lowercase()))
        })
    }
}

/// Text of one document plus the digest of the exact bytes it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentText {
    pub text: String,
    /// `sha256:<hex>` of the raw document bytes.
    pub sha256: String,
}

impl DocumentText {
    #[must_use]
    pub fn new(text: impl Into<String>, raw: &[u8]) -> Self {
        Self { text: text.into(), sha256: content_sha256(raw) }
    }
}

/// Source of document text for course import.
pub trait TextExtractor {
    /// Read the full text of the document at `path`.
    ///
    /// # Errors
    /// Returns a [`DocumentError`] when the file is missing, unsupported, or unreadable.
    fn extract_text(&self, path: &Path) -> Result<DocumentText, DocumentError>;
}

/// Default extractor backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileTextExtractor {
    #[cfg(feature = "pdf")]
    pdfium_library: Option<PathBuf>,
}

impl FileTextExtractor {
    /// Build an extractor, picking up `PDFIUM_DYNAMIC_LIB_PATH` when set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "pdf")]
            pdfium_library: std::env::var_os("PDFIUM_DYNAMIC_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Point PDF extraction at a specific PDFium library file or directory.
    #[cfg(feature = "pdf")]
    #[must_use]
    pub fn with_pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.pdfium_library = Some(path.into());
        self
    }

    #[cfg(feature = "pdf")]
    fn pdf_text(&self, bytes: &[u8]) -> Result<String, DocumentError> {
        use pdfium_render::prelude::Pdfium;

        let bindings = match self.pdfium_library.as_deref() {
            Some(library) => {
                let dir = if library.is_dir() {
                    library
                } else {
                    library.parent().unwrap_or(Path::new("."))
                };
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|err| DocumentError::Pdf(format!("failed to load PDFium: {err}")))?;
        let pdfium = Pdfium::new(bindings);

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|err| DocumentError::Pdf(format!("failed to open PDF: {err}")))?;

        let mut pages = Vec::new();
        for page in document.pages().iter() {
            let text = page.text().map_err(|err| DocumentError::Pdf(err.to_string()))?;
            pages.push(text.all());
        }

        Ok(pages.join("\n"))
    }

    #[cfg(not(feature = "pdf"))]
    #[allow(clippy::unused_self)]
    fn pdf_text(&self, _bytes: &[u8]) -> Result<String, DocumentError> {
        Err(DocumentError::Pdf("this build was compiled without PDF support".to_string()))
    }
}

impl TextExtractor for FileTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<DocumentText, DocumentError> {
        if !path.is_file() {
            return Err(DocumentError::NotFound(path.display().to_string()));
        }

        let kind = DocumentKind::from_path(path)?;
        let bytes = fs::read(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let text = match kind {
            DocumentKind::PlainText => decode_utf8(path, &bytes)?,
            DocumentKind::Markdown => markdown_to_text(&decode_utf8(path, &bytes)?),
            DocumentKind::Pdf => self.pdf_text(&bytes)?,
        };
        Ok(DocumentText::new(text, &bytes))
    }
}

/// `sha256:<hex>` digest of raw document bytes.
#[must_use]
pub fn content_sha256(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

fn decode_utf8(path: &Path, bytes: &[u8]) -> Result<String, DocumentError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DocumentError::Encoding(path.display().to_string()))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

/// Flatten Markdown to line-oriented text so `Label: value` lines survive.
#[must_use]
pub fn markdown_to_text(content: &str) -> String {
    use pulldown_cmark::{Event, Parser, Tag, TagEnd};

    let mut text = String::with_capacity(content.len());
    for event in Parser::new(content) {
        match event {
            Event::Text(value) | Event::Code(value) => text.push_str(&value),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Start(Tag::Item) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::TableRow
                | TagEnd::TableHead,
            ) => text.push('\n'),
            Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body)
            .unwrap_or_else(|err| panic!("failed to write fixture {}: {err}", path.display()));
        path
    }

    #[test]
    fn kind_is_picked_from_extension() {
        assert_eq!(DocumentKind::from_extension("TXT"), Some(DocumentKind::PlainText));
        assert_eq!(DocumentKind::from_extension("markdown"), Some(DocumentKind::Markdown));
        assert_eq!(DocumentKind::from_extension("Pdf"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("png"), None);
    }

    #[test]
    fn images_and_unknown_extensions_are_unsupported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extractor = FileTextExtractor::new();

        let cases =
            [("scan.PNG", ".png"), ("notes.docx", ".docx"), ("README", "(no extension)")];
        for (name, expected) in cases {
            let path = write_file(dir.path(), name, b"not text");
            let Err(err) = extractor.extract_text(&path) else {
                panic!("expected {name} to be rejected");
            };
            assert_eq!(err.to_string(), format!("unsupported file format: {expected}"));
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_reported_before_format() {
        let Err(err) = FileTextExtractor::new().extract_text(Path::new("/definitely/missing.png"))
        else {
            panic!("expected missing file error");
        };
        assert!(matches!(err, DocumentError::NotFound(_)));
        assert!(err.to_string().starts_with("file not found"));
    }

    #[test]
    fn plain_text_strips_bom_and_rejects_invalid_utf8() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let extractor = FileTextExtractor::new();

        let path = write_file(dir.path(), "syllabus.txt", "\u{feff}CS 101 - Intro\n".as_bytes());
        let document = extractor.extract_text(&path)?;
        assert_eq!(document.text, "CS 101 - Intro\n");
        assert_eq!(document.sha256, content_sha256("\u{feff}CS 101 - Intro\n".as_bytes()));

        let path = write_file(dir.path(), "broken.txt", &[0xff, 0xfe, 0x00, 0x43]);
        assert!(matches!(extractor.extract_text(&path), Err(DocumentError::Encoding(_))));
        Ok(())
    }

    #[test]
    fn markdown_keeps_label_lines_intact() {
        let text = markdown_to_text(
            "# CS 101 - Intro\n\n**Instructor:** Dr. Ada Lovelace\n\n- 60% - Exams\n- 40% - Homework\n",
        );
        let lines = text.lines().collect::<Vec<_>>();
        assert!(lines.contains(&"CS 101 - Intro"));
        assert!(lines.contains(&"Instructor: Dr. Ada Lovelace"));
        assert!(lines.contains(&"60% - Exams"));
        assert!(lines.contains(&"40% - Homework"));
    }

    #[test]
    fn digest_covers_the_bytes_that_were_parsed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(dir.path(), "empty.txt", b"");
        let document = FileTextExtractor::new().extract_text(&path)?;
        assert_eq!(document.text, "");
        assert_eq!(
            document.sha256,
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        Ok(())
    }

    #[test]
    fn io_error_display_leaves_the_cause_to_the_source_chain() {
        let err = DocumentError::Io {
            path: "/srv/syllabus.txt".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert_eq!(err.to_string(), "failed to read /srv/syllabus.txt");

        let rendered = format!("{:#}", anyhow::Error::new(err));
        assert_eq!(rendered, "failed to read /srv/syllabus.txt: permission denied");
        assert_eq!(rendered.matches("permission denied").count(), 1);
    }

    #[cfg(feature = "pdf")]
    #[test]
    fn missing_pdfium_library_is_a_pdf_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(dir.path(), "syllabus.pdf", b"%PDF-1.4\n%%EOF\n");
        let extractor = FileTextExtractor::new().with_pdfium_library("/nonexistent/lib");

        let Err(DocumentError::Pdf(message)) = extractor.extract_text(&path) else {
            panic!("expected a PDF error when PDFium cannot be loaded");
        };
        assert!(message.starts_with("failed to load PDFium"), "message: {message}");
        Ok(())
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_without_feature_is_a_pdf_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = write_file(dir.path(), "syllabus.pdf", b"%PDF-1.4\n%%EOF\n");

        let Err(DocumentError::Pdf(message)) = FileTextExtractor::new().extract_text(&path) else {
            panic!("expected a PDF error without PDF support");
        };
        assert!(message.contains("without PDF support"), "message: {message}");
        Ok(())
    }
}

use lopdf::content::Operation;
use lopdf::{Document as PdfDocument, ObjectId};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::utils::error::ApiError;

/// Entry name of the chat transcript inside an exported chat archive
pub const CHAT_TRANSCRIPT_ENTRY: &str = "_chat.txt";

/// Kind of artifact, decided by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Pdf,
    ChatArchive,
    Passthrough,
}

impl ArtifactKind {
    pub fn detect(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some("pdf") => ArtifactKind::Pdf,
            Some("zip") => ArtifactKind::ChatArchive,
            _ => ArtifactKind::Passthrough,
        }
    }
}

/// Turns uploaded artifacts into plain text files the analysis service can read
pub struct DocumentNormalizer {
    max_pdf_pages: usize,
}

impl DocumentNormalizer {
    pub fn new(max_pdf_pages: usize) -> Self {
        Self { max_pdf_pages }
    }

    /// Returns the path of the analyzable file. PDFs and archives are
    /// replaced by a sibling `.txt`; everything else is returned as-is.
    pub fn normalize(&self, path: &Path) -> Result<PathBuf, ApiError> {
        if !path.exists() {
            return Err(ApiError::FileNotFound(path.to_path_buf()));
        }

        match ArtifactKind::detect(path) {
            ArtifactKind::Pdf => {
                info!("The file '{}' is a PDF. Processing...", path.display());
                self.pdf_to_text(path)
            }
            ArtifactKind::ChatArchive => {
                info!("The file '{}' is a ZIP archive. Processing...", path.display());
                Self::archive_to_text(path)
            }
            ArtifactKind::Passthrough => Ok(path.to_path_buf()),
        }
    }

    fn pdf_to_text(&self, path: &Path) -> Result<PathBuf, ApiError> {
        let text = self.extract_pdf_text(path)?;
        let output = path.with_extension("txt");

        fs::write(&output, text)?;
        fs::remove_file(path)?;
        info!("Deleted local file: {}", path.display());

        Ok(output)
    }

    /// Text of at most `max_pdf_pages` leading pages
    pub fn extract_pdf_text(&self, path: &Path) -> Result<String, ApiError> {
        let mut doc = PdfDocument::load(path).map_err(|e| {
            ApiError::IngestionFailed(format!("Failed to load PDF {}: {}", path.display(), e))
        })?;
        let pages = doc.get_pages();
        let page_count = pages.len().min(self.max_pdf_pages);

        let mut content = String::new();

        for (page_num, page_id) in pages.iter().take(page_count) {
            if let Err(e) = split_text_lines(&mut doc, *page_id) {
                debug!("Page {} extracted without line splitting: {}", page_num, e);
            }

            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_num, e);
                }
            }
        }

        info!(
            "Text from the first {} pages extracted from '{}'",
            page_count,
            path.display()
        );
        Ok(content)
    }

    fn archive_to_text(path: &Path) -> Result<PathBuf, ApiError> {
        let malformed =
            |reason: String| ApiError::MalformedArchive(format!("{}: {}", path.display(), reason));

        let output = path.with_extension("txt");
        {
            let file = fs::File::open(path)?;
            let mut archive =
                zip::ZipArchive::new(file).map_err(|e| malformed(e.to_string()))?;

            let mut entry = archive.by_name(CHAT_TRANSCRIPT_ENTRY).map_err(|_| {
                malformed(format!("'{}' not found in archive", CHAT_TRANSCRIPT_ENTRY))
            })?;

            let mut out = fs::File::create(&output)?;
            let copied = io::copy(&mut entry, &mut out)?;
            debug!("Extracted {} bytes of {}", copied, CHAT_TRANSCRIPT_ENTRY);
        }

        fs::remove_file(path)?;
        info!("Deleted local file: {}", path.display());

        Ok(output)
    }
}

/// Close the text object wherever a page moves to a new line.
///
/// lopdf only breaks extracted text at `ET`, so a chat page written as one
/// text object would otherwise come out as a single run-on line.
fn split_text_lines(doc: &mut PdfDocument, page_id: ObjectId) -> lopdf::Result<()> {
    let mut content = doc.get_and_decode_page_content(page_id)?;
    let mut operations = Vec::with_capacity(content.operations.len());
    let mut shown = false;

    for op in content.operations.drain(..) {
        match op.operator.as_str() {
            "BT" => {
                shown = false;
                operations.push(op);
            }
            "Td" | "TD" | "T*" | "Tm" => {
                if shown {
                    operations.push(Operation::new("ET", vec![]));
                    operations.push(Operation::new("BT", vec![]));
                    shown = false;
                }
                operations.push(op);
            }
            // Next-line-and-show operators
            "'" | "\"" => {
                if shown {
                    operations.push(Operation::new("ET", vec![]));
                    operations.push(Operation::new("BT", vec![]));
                }
                if let Some(text) = op.operands.last().cloned() {
                    operations.push(Operation::new("Tj", vec![text]));
                    shown = true;
                }
            }
            "Tj" | "TJ" => {
                shown = true;
                operations.push(op);
            }
            _ => operations.push(op),
        }
    }

    content.operations = operations;
    doc.change_page_content(page_id, content.encode()?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::Content;
    use lopdf::{dictionary, Object, Stream};
    use std::io::Write;

    /// One page per line of text, Courier, no compression
    pub(crate) fn write_pdf(path: &Path, lines: &[&str]) {
        let pages = lines
            .iter()
            .map(|line| {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 14.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*line)]),
                    Operation::new("ET", vec![]),
                ]
            })
            .collect();
        write_pdf_pages(path, pages);
    }

    fn write_pdf_pages(path: &Path, pages: Vec<Vec<Operation>>) {
        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for operations in pages {
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_detect_kind_by_extension() {
        assert_eq!(ArtifactKind::detect(Path::new("a/b.PDF")), ArtifactKind::Pdf);
        assert_eq!(ArtifactKind::detect(Path::new("chat.zip")), ArtifactKind::ChatArchive);
        assert_eq!(ArtifactKind::detect(Path::new("notes.txt")), ArtifactKind::Passthrough);
        assert_eq!(ArtifactKind::detect(Path::new("noext")), ArtifactKind::Passthrough);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let normalizer = DocumentNormalizer::new(10);
        let err = normalizer
            .normalize(Path::new("/definitely/not/here.pdf"))
            .unwrap_err();
        assert!(matches!(err, ApiError::FileNotFound(_)));
    }

    #[test]
    fn test_plain_text_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.txt");
        fs::write(&path, "Alice: hi\nBob: hello").unwrap();

        let normalized = DocumentNormalizer::new(10).normalize(&path).unwrap();

        assert_eq!(normalized, path);
        assert!(path.exists());
    }

    #[test]
    fn test_pdf_is_limited_to_leading_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.pdf");
        let lines: Vec<String> = (1..=12).map(|i| format!("marker-{:02}", i)).collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        write_pdf(&path, &refs);

        let normalized = DocumentNormalizer::new(10).normalize(&path).unwrap();

        assert_eq!(normalized, dir.path().join("transcript.txt"));
        assert!(!path.exists());
        let text = fs::read_to_string(&normalized).unwrap();
        assert!(text.contains("marker-01"));
        assert!(text.contains("marker-10"));
        assert!(!text.contains("marker-11"));
        assert!(!text.contains("marker-12"));
    }

    #[test]
    fn test_pdf_lines_in_one_text_object_stay_apart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.pdf");
        write_pdf_pages(
            &path,
            vec![vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("TL", vec![14.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal("Alice: hi")]),
                Operation::new("T*", vec![]),
                Operation::new("Tj", vec![Object::string_literal("Bob: hello")]),
                Operation::new("Td", vec![0.into(), (-14).into()]),
                Operation::new("Tj", vec![Object::string_literal("Alice: how are you")]),
                Operation::new("'", vec![Object::string_literal("Bob: fine")]),
                Operation::new("ET", vec![]),
            ]],
        );

        let text = DocumentNormalizer::new(10).extract_pdf_text(&path).unwrap();
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        assert_eq!(
            lines,
            vec!["Alice: hi", "Bob: hello", "Alice: how are you", "Bob: fine"]
        );
    }

    #[test]
    fn test_archive_transcript_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(
            &path,
            &[
                (CHAT_TRANSCRIPT_ENTRY, "[1/1/24] Alice: hi\n[1/1/24] Bob: hey"),
                ("IMG-0001.jpg", "not really a jpeg"),
            ],
        );

        let normalized = DocumentNormalizer::new(10).normalize(&path).unwrap();

        assert_eq!(normalized, dir.path().join("export.txt"));
        assert!(!path.exists());
        assert!(fs::read_to_string(&normalized).unwrap().contains("Bob: hey"));
        assert!(!dir.path().join(CHAT_TRANSCRIPT_ENTRY).exists());
    }

    #[test]
    fn test_archive_without_transcript_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");
        write_zip(&path, &[("other.txt", "nothing to see")]);

        let err = DocumentNormalizer::new(10).normalize(&path).unwrap_err();

        assert!(matches!(err, ApiError::MalformedArchive(_)));
        assert!(!dir.path().join("export.txt").exists());
    }

    #[test]
    fn test_garbage_archive_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        fs::write(&path, b"PK but not really").unwrap();

        let err = DocumentNormalizer::new(10).normalize(&path).unwrap_err();
        assert!(matches!(err, ApiError::MalformedArchive(_)));
    }
}

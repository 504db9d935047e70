//! Text-layer vs. OCR decision

use serde::Serialize;

use super::types::{DocumentKind, ExtractionMode};
use crate::engine::OpenedDocument;

/// Outcome of classifying one request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(skip)]
    pub kind: DocumentKind,
    pub mode: ExtractionMode,
    pub page_count: u32,
    /// Resolved pages, sorted and deduplicated
    pub pages: Vec<u32>,
}

/// Decides between the text layer and OCR
///
/// Image sources always go to OCR. A PDF goes the text route when any
/// sampled page carries at least `min_text_chars` non-whitespace
/// characters; otherwise it is treated as scanned.
#[derive(Debug, Clone)]
pub struct Classifier {
    min_text_chars: usize,
    sample_pages: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(8, 5)
    }
}

impl Classifier {
    pub fn new(min_text_chars: usize, sample_pages: usize) -> Self {
        Self {
            min_text_chars: min_text_chars.max(1),
            sample_pages: sample_pages.max(1),
        }
    }

    /// Classify an opened document for the given resolved pages
    ///
    /// Sampling is restricted to the pages that will be extracted, so a
    /// request for scanned pages of an otherwise digital document still
    /// goes to OCR.
    pub fn classify(&self, doc: &dyn OpenedDocument, pages: &[u32]) -> ExtractionMode {
        if doc.kind().is_image() {
            return ExtractionMode::Ocr;
        }

        for &page in pages.iter().take(self.sample_pages) {
            match doc.page_text(page) {
                Ok(text) => {
                    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
                    if chars >= self.min_text_chars {
                        return ExtractionMode::Text;
                    }
                }
                Err(e) => {
                    tracing::debug!(page, error = %e, "Text sampling failed, treating page as empty");
                }
            }
        }

        ExtractionMode::Ocr
    }

    /// Build the full classification record
    pub fn classification(&self, doc: &dyn OpenedDocument, pages: Vec<u32>) -> Classification {
        Classification {
            kind: doc.kind(),
            mode: self.classify(doc, &pages),
            page_count: doc.page_count(),
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, LopdfDocument};
    use crate::testing::{mixed_pdf, scanned_pdf, text_pdf, write_fixture};
    use tempfile::TempDir;

    struct BrokenDoc;

    impl OpenedDocument for BrokenDoc {
        fn kind(&self) -> DocumentKind {
            DocumentKind::Pdf
        }
        fn page_count(&self) -> u32 {
            2
        }
        fn page_text(&self, page: u32) -> Result<String, EngineError> {
            Err(EngineError::Text {
                page,
                message: "bad font".to_string(),
            })
        }
        fn page_image(&self, _page: u32) -> Result<Option<Vec<u8>>, EngineError> {
            Ok(None)
        }
    }

    fn open(dir: &TempDir, bytes: &[u8]) -> LopdfDocument {
        LopdfDocument::open(&write_fixture(dir, "doc.pdf", bytes)).unwrap()
    }

    #[test]
    fn test_text_pdf_is_text() {
        let dir = TempDir::new().unwrap();
        let doc = open(&dir, &text_pdf(3));
        assert_eq!(Classifier::default().classify(&doc, &[1, 2, 3]), ExtractionMode::Text);
    }

    #[test]
    fn test_scanned_pdf_is_ocr() {
        let dir = TempDir::new().unwrap();
        let doc = open(&dir, &scanned_pdf(3));
        assert_eq!(Classifier::default().classify(&doc, &[1, 2, 3]), ExtractionMode::Ocr);
    }

    #[test]
    fn test_sampling_follows_requested_pages() {
        let dir = TempDir::new().unwrap();
        let doc = open(&dir, &mixed_pdf());
        let classifier = Classifier::default();

        assert_eq!(classifier.classify(&doc, &[1, 2]), ExtractionMode::Text);
        assert_eq!(classifier.classify(&doc, &[2]), ExtractionMode::Ocr);
    }

    #[test]
    fn test_threshold() {
        let dir = TempDir::new().unwrap();
        let doc = open(&dir, &text_pdf(1));

        // "This is page one" has 13 non-whitespace characters
        assert_eq!(Classifier::new(13, 1).classify(&doc, &[1]), ExtractionMode::Text);
        assert_eq!(Classifier::new(14, 1).classify(&doc, &[1]), ExtractionMode::Ocr);
    }

    #[test]
    fn test_text_errors_count_as_empty() {
        let classification = Classifier::default().classification(&BrokenDoc, vec![1, 2]);
        assert_eq!(classification.mode, ExtractionMode::Ocr);
        assert_eq!(classification.page_count, 2);
        assert_eq!(classification.pages, vec![1, 2]);
    }

    #[test]
    fn test_images_always_ocr() {
        let dir = TempDir::new().unwrap();
        let path = write_fixture(&dir, "scan.png", &crate::testing::png_image());
        let doc = crate::engine::ImageDocument::open(&path, image::ImageFormat::Png).unwrap();
        assert_eq!(Classifier::new(1, 1).classify(&doc, &[1]), ExtractionMode::Ocr);
    }
}

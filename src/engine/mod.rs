//! Document engines
//!
//! Black-box access to a document's pages: page count, embedded text and a
//! raster image suitable for OCR. All calls are blocking and are made from
//! the pipeline's `spawn_blocking` tasks.
//!
//! # Thread Safety
//!
//! Every `open` produces an independent [`OpenedDocument`]; nothing is
//! shared between invocations. Backends whose native library is not safe
//! for concurrent use (MuPDF's `fz_context`) serialize internally.

mod image_doc;
mod lopdf_doc;
#[cfg(feature = "mupdf")]
mod mupdf_doc;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::classify::DocumentKind;

pub use image_doc::ImageDocument;
pub use lopdf_doc::LopdfDocument;
#[cfg(feature = "mupdf")]
pub use mupdf_doc::MupdfEngine;

/// Engine-level failures
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load document: {0}")]
    Load(String),

    #[error("Page {page} not found (document has {page_count} pages)")]
    PageNotFound { page: u32, page_count: u32 },

    #[error("Failed to extract text from page {page}: {message}")]
    Text { page: u32, message: String },

    #[error("Failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A document opened for reading. Pages are 1-based.
pub trait OpenedDocument: Send {
    fn kind(&self) -> DocumentKind;

    fn page_count(&self) -> u32;

    /// Embedded text of one page; empty when the page has no text layer
    fn page_text(&self, page: u32) -> Result<String, EngineError>;

    /// Encoded image of one page for OCR, `None` when the page has nothing
    /// to recognize
    fn page_image(&self, page: u32) -> Result<Option<Vec<u8>>, EngineError>;

    fn check_page(&self, page: u32) -> Result<(), EngineError> {
        let page_count = self.page_count();
        if page == 0 || page > page_count {
            return Err(EngineError::PageNotFound { page, page_count });
        }
        Ok(())
    }
}

/// Opens fetched files
pub trait DocumentEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path, kind: DocumentKind) -> Result<Box<dyn OpenedDocument>, EngineError>;
}

/// Pure-Rust engine: lopdf for PDFs, the `image` crate for raster sources
///
/// Scanned PDF pages are turned into images by decoding the image XObjects
/// painted on them, which covers the one-bitmap-per-page layout scanners
/// produce.
#[derive(Debug, Default)]
pub struct StandardEngine;

impl DocumentEngine for StandardEngine {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open(&self, path: &Path, kind: DocumentKind) -> Result<Box<dyn OpenedDocument>, EngineError> {
        match kind {
            DocumentKind::Pdf => Ok(Box::new(LopdfDocument::open(path)?)),
            DocumentKind::Image(format) => Ok(Box::new(ImageDocument::open(path, format)?)),
        }
    }
}

/// The engine selected at build time
pub fn default_engine() -> Arc<dyn DocumentEngine> {
    #[cfg(feature = "mupdf")]
    {
        Arc::new(MupdfEngine::new())
    }
    #[cfg(not(feature = "mupdf"))]
    {
        Arc::new(StandardEngine)
    }
}

/// Encode a decoded image as PNG
pub(crate) fn encode_png(img: &image::DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)?;
    Ok(buffer)
}

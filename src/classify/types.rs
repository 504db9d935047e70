//! Classifier types

use serde::Serialize;
use thiserror::Error;

/// Which extraction path a document takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Pull the embedded text layer
    Text,
    /// Rasterize and recognize
    Ocr,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Ocr => "ocr",
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container format of a fetched document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// A single raster image, treated as one scanned page
    Image(image::ImageFormat),
}

impl DocumentKind {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

/// Bad page specs and malformed tool arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid page specification '{0}'")]
    InvalidPageSpec(String),

    #[error("Page numbers start at 1 (got 0)")]
    ZeroPage,

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: i64, page_count: u32 },

    #[error("Missing required argument '{0}'")]
    MissingArgument(&'static str),

    #[error("Argument '{name}' must be {expected}")]
    InvalidArgument {
        name: &'static str,
        expected: &'static str,
    },

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
}

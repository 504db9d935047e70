//! Pipeline types

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::classify::{ExtractionMode, PageSpec, ValidationError};
use crate::engine::EngineError;
use crate::error::ErrorKind;
use crate::fetch::{FetchError, SourceDescriptor};
use crate::ocr::OcrError;

/// One validated tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub source: SourceDescriptor,
    pub pages: PageSpec,
}

impl ExtractRequest {
    pub fn new(source: SourceDescriptor, pages: PageSpec) -> Self {
        Self { source, pages }
    }
}

/// Text pulled from a document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub text: String,
    pub mode: ExtractionMode,
    /// Pages actually processed, ascending
    pub pages_processed: Vec<u32>,
    pub page_count: u32,
}

/// Text-layer or OCR engine failure
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("OCR failed on page {page}: {source}")]
    Ocr {
        page: u32,
        #[source]
        source: OcrError,
    },

    #[error("Extraction task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for ExtractionError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Join(e.to_string())
    }
}

/// Terminal failure of one pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Extraction timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch(_) => ErrorKind::FetchError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Extraction(_) => ErrorKind::ExtractionError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
        }
    }
}

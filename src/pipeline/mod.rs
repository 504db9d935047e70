//! Extraction Pipeline
//!
//! `extract(request)` runs Fetch → Classify → (text layer | OCR) → cleanup
//! and produces exactly one [`ExtractionResult`] or one typed
//! [`PipelineError`]. Document parsing and rasterization run on the blocking
//! pool; OCR calls go through the bounded [`OcrService`](crate::ocr::OcrService).

mod service;
mod types;

pub use service::Pipeline;
pub use types::{ExtractRequest, ExtractionError, ExtractionResult, PipelineError};

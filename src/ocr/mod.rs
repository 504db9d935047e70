//! OCR Module
//!
//! Recognizes text in page images for scanned PDFs and image sources.
//!
//! Supports two backends:
//! - Tesseract (local CLI, requires installation)
//! - Ollama vision models (local LLM)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdfx_server::ocr::{OcrService, OcrServiceConfig};
//!
//! let service = OcrService::new(OcrServiceConfig::default());
//! let result = service.recognize(&png_bytes, Some("chi_sim+eng")).await?;
//! ```

mod provider;
mod service;
mod types;

pub use provider::{OcrProviderTrait, OllamaProvider, TesseractProvider};
pub use service::{OcrService, OcrServiceConfig};
pub use types::{OcrError, OcrProvider, OcrResult};

#[cfg(test)]
pub(crate) use provider::MockProvider;

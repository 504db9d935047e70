//! PDFX Server Library
//!
//! A session-oriented MCP tool server with a single tool,
//! `extract-document-contents`: fetch a PDF or image, decide whether it has
//! a usable text layer, extract text directly or through OCR, and clean up
//! every temporary file on the way out.
//!
//! # Modules
//!
//! - `fetch`: Sources to scoped temp files
//! - `classify`: Page specs, format sniffing, text-vs-OCR decision
//! - `engine`: Opened documents (lopdf, images, optional MuPDF)
//! - `ocr`: Tesseract and Ollama providers behind a bounded service
//! - `pipeline`: fetch → classify → extract → cleanup
//! - `session`, `dispatcher`, `protocol`: the MCP session state machine
//! - `metrics`: request counters and process resource usage
//! - `transport`, `routes`: SSE/stdio and the HTTP surface

pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod ocr;
pub mod pipeline;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

//! Document Classifier
//!
//! Decides whether a fetched document goes down the text-layer path or the
//! OCR path, and resolves the client's page spec against the real page
//! count. Everything here is a pure function of the document, so it needs no
//! locking and runs inside the pipeline's blocking task.

mod classifier;
mod page_spec;
mod sniff;
mod types;

pub use classifier::{Classification, Classifier};
pub use page_spec::{PageRef, PageSpec};
pub use sniff::{sniff_file, sniff_kind};
pub use types::{DocumentKind, ExtractionMode, ValidationError};

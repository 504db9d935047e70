//! Resource Fetcher
//!
//! Copies a local file or downloads a URL into a uniquely named temporary
//! file. The file is registered with the owning request's [`ResourceSet`]
//! before any byte is written, and is deleted when the returned
//! [`ScopedTempFile`] is released or dropped.

mod fetcher;
mod resource;
mod types;

pub use fetcher::Fetcher;
pub use resource::{ResourceSet, ScopedTempFile};
pub use types::{FetchError, SourceDescriptor};

//! Fetch types

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Where a document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// File on the server's filesystem
    Local(PathBuf),
    /// http(s) URL
    Remote(String),
}

impl SourceDescriptor {
    /// Interpret a client-supplied source string
    ///
    /// Anything with an http(s) scheme and a host is remote, `file://` URLs
    /// map to their path, everything else is treated as a local path.
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(FetchError::InvalidSource("source is empty".to_string()));
        }

        if let Ok(url) = reqwest::Url::parse(raw) {
            match url.scheme() {
                "http" | "https" if url.host_str().is_some() => {
                    return Ok(Self::Remote(url.to_string()));
                }
                "http" | "https" => {
                    return Err(FetchError::InvalidSource(format!("URL has no host: {}", raw)));
                }
                "file" => {
                    return url
                        .to_file_path()
                        .map(Self::Local)
                        .map_err(|_| FetchError::InvalidSource(format!("bad file URL: {}", raw)));
                }
                _ => {}
            }
        }

        Ok(Self::Local(PathBuf::from(raw)))
    }

    /// Extension hint used to name the temporary file
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            Self::Local(path) => path.clone(),
            Self::Remote(url) => reqwest::Url::parse(url)
                .map(|u| PathBuf::from(u.path()))
                .unwrap_or_default(),
        };
        path.extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 8)
            .map(|e| e.to_ascii_lowercase())
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download {url}: {message}")]
    Network { url: String, message: String },

    #[error("Download of {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Download exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Temporary storage unavailable in {dir}: {source}")]
    TempStorage {
        dir: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote() {
        let source = SourceDescriptor::parse("https://example.com/docs/report.PDF").unwrap();
        assert_eq!(
            source,
            SourceDescriptor::Remote("https://example.com/docs/report.PDF".to_string())
        );
        assert_eq!(source.extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn test_parse_local_and_file_url() {
        assert_eq!(
            SourceDescriptor::parse("/tmp/scan.png").unwrap(),
            SourceDescriptor::Local(PathBuf::from("/tmp/scan.png"))
        );
        assert_eq!(
            SourceDescriptor::parse("file:///tmp/scan.png").unwrap(),
            SourceDescriptor::Local(PathBuf::from("/tmp/scan.png"))
        );
        assert_eq!(
            SourceDescriptor::parse("relative/doc.pdf").unwrap(),
            SourceDescriptor::Local(PathBuf::from("relative/doc.pdf"))
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            SourceDescriptor::parse("   "),
            Err(FetchError::InvalidSource(_))
        ));
    }
}

//! Local copy and HTTP download into scoped temp files

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::resource::{ResourceSet, ScopedTempFile};
use super::types::{FetchError, SourceDescriptor};

const TEMP_PREFIX: &str = "pdfx-";
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Retrieves documents into uniquely named temporary files
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    temp_dir: PathBuf,
    max_bytes: u64,
}

impl Fetcher {
    pub fn new(temp_dir: PathBuf, max_bytes: u64) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("pdfx-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            client,
            temp_dir,
            max_bytes,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Fetch `source` into a new temp file owned by `resources`
    pub async fn fetch(
        &self,
        source: &SourceDescriptor,
        resources: &ResourceSet,
    ) -> Result<ScopedTempFile, FetchError> {
        let (file, temp) = self.create_temp(source, resources)?;

        match source {
            SourceDescriptor::Local(path) => {
                // Only the path is needed for a copy
                drop(file);
                self.copy_local(path, temp.path()).await?;
            }
            SourceDescriptor::Remote(url) => {
                self.download(url, file).await?;
            }
        }

        tracing::debug!(
            source = %source,
            temp = %temp.path().display(),
            "Fetched source into temp file"
        );

        Ok(temp)
    }

    /// Create and register the temp file before anything is written
    fn create_temp(
        &self,
        source: &SourceDescriptor,
        resources: &ResourceSet,
    ) -> Result<(tokio::fs::File, ScopedTempFile), FetchError> {
        let suffix = source
            .extension()
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".tmp".to_string());

        let named = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.temp_dir)
            .map_err(|e| FetchError::TempStorage {
                dir: self.temp_dir.display().to_string(),
                source: e,
            })?;

        let (file, path) = named.into_parts();
        let scoped = ScopedTempFile::new(path, resources);
        Ok((tokio::fs::File::from_std(file), scoped))
    }

    async fn copy_local(&self, source: &Path, target: &Path) -> Result<(), FetchError> {
        let metadata = match tokio::fs::metadata(source).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound(source.display().to_string()));
            }
            Err(e) => return Err(FetchError::read(source, e)),
        };

        if !metadata.is_file() {
            return Err(FetchError::InvalidSource(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        tokio::fs::copy(source, target)
            .await
            .map_err(|e| FetchError::read(source, e))?;
        Ok(())
    }

    async fn download(&self, url: &str, mut file: tokio::fs::File) -> Result<(), FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(network)?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(&chunk).await.map_err(|e| FetchError::Network {
                url: url.to_string(),
                message: format!("write failed: {}", e),
            })?;
        }

        file.flush().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: format!("flush failed: {}", e),
        })?;

        tracing::debug!(url = %url, bytes = written, "Download complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fetcher(dir: &TempDir) -> Fetcher {
        Fetcher::new(dir.path().to_path_buf(), 1024 * 1024)
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_fetch_local_copies_into_unique_file() {
        let src_dir = TempDir::new().unwrap();
        let tmp_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("doc.pdf");
        std::fs::write(&src, b"%PDF-1.5 fake").unwrap();

        let fetcher = fetcher(&tmp_dir);
        let resources = ResourceSet::new();
        let source = SourceDescriptor::Local(src.clone());

        let a = fetcher.fetch(&source, &resources).await.unwrap();
        let b = fetcher.fetch(&source, &resources).await.unwrap();

        assert_ne!(a.path(), b.path());
        assert_eq!(std::fs::read(a.path()).unwrap(), b"%PDF-1.5 fake");
        assert!(a.path().to_string_lossy().ends_with(".pdf"));
        assert_eq!(resources.len(), 2);

        drop(a);
        drop(b);
        assert_eq!(files_in(tmp_dir.path()), 0);
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_fetch_missing_local_leaves_nothing_behind() {
        let tmp_dir = TempDir::new().unwrap();
        let fetcher = fetcher(&tmp_dir);
        let resources = ResourceSet::new();
        let source = SourceDescriptor::Local(PathBuf::from("/definitely/not/here.pdf"));

        let result = fetcher.fetch(&source, &resources).await;

        assert!(matches!(result, Err(FetchError::NotFound(_))));
        assert_eq!(files_in(tmp_dir.path()), 0);
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_directory_is_rejected() {
        let src_dir = TempDir::new().unwrap();
        let tmp_dir = TempDir::new().unwrap();
        let fetcher = fetcher(&tmp_dir);

        let result = fetcher
            .fetch(
                &SourceDescriptor::Local(src_dir.path().to_path_buf()),
                &ResourceSet::new(),
            )
            .await;

        assert!(matches!(result, Err(FetchError::InvalidSource(_))));
        assert_eq!(files_in(tmp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_unwritable_temp_dir_is_temp_storage_error() {
        let fetcher = Fetcher::new(PathBuf::from("/definitely/not/a/dir"), 1024);
        let result = fetcher
            .fetch(
                &SourceDescriptor::Remote("http://127.0.0.1:9/x.pdf".to_string()),
                &ResourceSet::new(),
            )
            .await;

        assert!(matches!(result, Err(FetchError::TempStorage { .. })));
    }

    #[tokio::test]
    async fn test_remote_404_is_fetch_error_without_leftovers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let tmp_dir = TempDir::new().unwrap();
        let fetcher = fetcher(&tmp_dir);
        let resources = ResourceSet::new();
        let source = SourceDescriptor::parse(&format!("http://{}/missing.pdf", addr)).unwrap();

        let result = fetcher.fetch(&source, &resources).await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(files_in(tmp_dir.path()), 0);
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn test_remote_download_respects_size_limit() {
        use axum::routing::get;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route("/small.pdf", get(|| async { "%PDF-1.4 small" }))
            .route("/big.pdf", get(|| async { vec![b'x'; 4096] }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let tmp_dir = TempDir::new().unwrap();
        let fetcher = Fetcher::new(tmp_dir.path().to_path_buf(), 1024);
        let resources = ResourceSet::new();

        let small = SourceDescriptor::parse(&format!("http://{}/small.pdf", addr)).unwrap();
        let temp = fetcher.fetch(&small, &resources).await.unwrap();
        assert_eq!(std::fs::read(temp.path()).unwrap(), b"%PDF-1.4 small");
        drop(temp);

        let big = SourceDescriptor::parse(&format!("http://{}/big.pdf", addr)).unwrap();
        let result = fetcher.fetch(&big, &resources).await;
        assert!(matches!(result, Err(FetchError::TooLarge { limit: 1024 })));
        assert_eq!(files_in(tmp_dir.path()), 0);
    }
}

//! Extraction pipeline: fetch, classify, extract or OCR, clean up

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::types::{ExtractRequest, ExtractionError, ExtractionResult, PipelineError};
use crate::classify::{sniff_file, Classification, Classifier, ExtractionMode, PageSpec};
use crate::config::PipelineConfig;
use crate::engine::{DocumentEngine, EngineError, OpenedDocument};
use crate::fetch::{Fetcher, ResourceSet};
use crate::ocr::OcrService;

/// Result of the blocking prepare step
enum Prepared {
    /// Text layer already pulled
    Text {
        classification: Classification,
        sections: Vec<(u32, String)>,
    },
    /// Pages still need rasterizing and OCR
    Ocr {
        classification: Classification,
        doc: Box<dyn OpenedDocument>,
    },
}

/// Runs extractions; shared by every session
///
/// Holds no per-request state. Each run owns its temp file and opened
/// document; the OCR service bounds engine concurrency.
pub struct Pipeline {
    fetcher: Fetcher,
    engine: Arc<dyn DocumentEngine>,
    ocr: Arc<OcrService>,
    classifier: Classifier,
    request_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        config: &PipelineConfig,
        engine: Arc<dyn DocumentEngine>,
        ocr: Arc<OcrService>,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(config.temp_dir.clone(), config.max_download_bytes),
            engine,
            ocr,
            classifier: Classifier::new(config.min_text_chars, config.sample_pages),
            request_timeout: config.request_timeout,
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn ocr(&self) -> &OcrService {
        &self.ocr
    }

    pub fn temp_dir(&self) -> &std::path::Path {
        self.fetcher.temp_dir()
    }

    /// Run one extraction to completion or failure
    ///
    /// Files fetched for the request are registered in `resources` and are
    /// gone by the time this returns, whatever the outcome. Dropping the
    /// returned future also deletes them.
    pub async fn extract(
        &self,
        request: &ExtractRequest,
        resources: &ResourceSet,
    ) -> Result<ExtractionResult, PipelineError> {
        let started = Instant::now();

        let result = match tokio::time::timeout(self.request_timeout, self.run(request, resources)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(self.request_timeout)),
        };

        // Anything the timed-out run left registered
        resources.purge();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(r) => tracing::info!(
                source = %request.source,
                mode = %r.mode,
                pages = ?r.pages_processed,
                elapsed_ms,
                "Extraction complete"
            ),
            Err(e) => tracing::info!(
                source = %request.source,
                kind = %e.kind(),
                error = %e,
                elapsed_ms,
                "Extraction failed"
            ),
        }

        result
    }

    async fn run(
        &self,
        request: &ExtractRequest,
        resources: &ResourceSet,
    ) -> Result<ExtractionResult, PipelineError> {
        let mut temp = self.fetcher.fetch(&request.source, resources).await?;

        let outcome = self.process(temp.path().to_path_buf(), &request.pages).await;

        if let Err(e) = temp.release() {
            tracing::warn!(path = %temp.path().display(), error = %e, "Failed to delete temp file");
        }

        outcome
    }

    async fn process(&self, path: PathBuf, pages: &PageSpec) -> Result<ExtractionResult, PipelineError> {
        let engine = self.engine.clone();
        let classifier = self.classifier.clone();
        let spec = pages.clone();

        let prepared = tokio::task::spawn_blocking(move || prepare(&path, &spec, engine.as_ref(), &classifier))
            .await
            .map_err(ExtractionError::from)??;

        match prepared {
            Prepared::Text {
                classification,
                sections,
            } => Ok(finish(classification, sections)),
            Prepared::Ocr {
                classification,
                doc,
            } => {
                let sections = self.recognize_pages(doc, &classification.pages).await?;
                Ok(finish(classification, sections))
            }
        }
    }

    /// Rasterize and recognize pages one at a time, in page order
    async fn recognize_pages(
        &self,
        doc: Box<dyn OpenedDocument>,
        pages: &[u32],
    ) -> Result<Vec<(u32, String)>, ExtractionError> {
        let doc = Arc::new(Mutex::new(doc));
        let mut sections = Vec::with_capacity(pages.len());

        for &page in pages {
            let renderer = doc.clone();
            let image = tokio::task::spawn_blocking(move || {
                let doc = renderer.lock();
                doc.page_image(page)
            })
            .await??;

            let text = match image {
                Some(bytes) => {
                    self.ocr
                        .recognize(&bytes, None)
                        .await
                        .map_err(|source| ExtractionError::Ocr { page, source })?
                        .text
                }
                None => {
                    tracing::debug!(page, "Page has nothing to recognize");
                    String::new()
                }
            };
            sections.push((page, text));
        }

        Ok(sections)
    }
}

/// Sniff, open, resolve and classify; pulls the text layer when there is one
fn prepare(
    path: &std::path::Path,
    spec: &PageSpec,
    engine: &dyn DocumentEngine,
    classifier: &Classifier,
) -> Result<Prepared, PipelineError> {
    let kind = sniff_file(path).map_err(|e| ExtractionError::Engine(EngineError::Io(e)))??;
    let doc = engine.open(path, kind).map_err(ExtractionError::Engine)?;

    // Validation happens before any page is touched
    let pages = spec.resolve(doc.page_count())?;
    let classification = classifier.classification(doc.as_ref(), pages);

    tracing::debug!(
        engine = engine.name(),
        kind = ?classification.kind,
        mode = %classification.mode,
        page_count = classification.page_count,
        pages = ?classification.pages,
        "Classified document"
    );

    match classification.mode {
        ExtractionMode::Text => {
            let mut sections = Vec::with_capacity(classification.pages.len());
            for &page in &classification.pages {
                let text = doc.page_text(page).map_err(ExtractionError::Engine)?;
                sections.push((page, text));
            }
            Ok(Prepared::Text {
                classification,
                sections,
            })
        }
        ExtractionMode::Ocr => Ok(Prepared::Ocr {
            classification,
            doc,
        }),
    }
}

fn finish(classification: Classification, sections: Vec<(u32, String)>) -> ExtractionResult {
    let text = if classification.kind.is_image() {
        let body = sections
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n");
        format!("Image content:\n{}", body.trim())
    } else {
        sections
            .into_iter()
            .map(|(page, text)| format!("Page {}:\n{}", page, text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    ExtractionResult {
        text,
        mode: classification.mode,
        pages_processed: classification.pages,
        page_count: classification.page_count,
    }
}

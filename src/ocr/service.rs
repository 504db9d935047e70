//! OCR Service
//!
//! Wraps the configured provider behind a semaphore. OCR engines are heavy
//! (a Tesseract process or a vision model per call), so the number of
//! concurrent recognitions is bounded across all sessions.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::{
    provider::{OcrProviderTrait, OllamaProvider, TesseractProvider},
    types::{OcrError, OcrProvider, OcrResult},
};

/// OCR service configuration
#[derive(Debug, Clone)]
pub struct OcrServiceConfig {
    /// Engine used for recognition
    pub provider: OcrProvider,
    /// Ollama base URL
    pub ollama_url: String,
    /// Ollama model name
    pub ollama_model: String,
    /// Language used when the caller gives none
    pub default_language: String,
    /// Concurrent recognitions across the process
    pub max_concurrent: usize,
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self {
            provider: OcrProvider::Tesseract,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llava".to_string(),
            default_language: "eng".to_string(),
            max_concurrent: 1,
        }
    }
}

/// OCR service shared by every pipeline run
pub struct OcrService {
    default_language: String,
    provider: Arc<dyn OcrProviderTrait>,
    permits: Arc<Semaphore>,
}

impl OcrService {
    /// Create a new OCR service
    pub fn new(config: OcrServiceConfig) -> Self {
        let provider: Arc<dyn OcrProviderTrait> = match config.provider {
            OcrProvider::Tesseract => Arc::new(TesseractProvider::new(&config.default_language)),
            OcrProvider::Ollama => Arc::new(OllamaProvider::new(
                &config.ollama_url,
                &config.ollama_model,
            )),
        };

        Self::with_provider(provider, config.max_concurrent, &config.default_language)
    }

    /// Create a service around an existing provider
    pub fn with_provider(
        provider: Arc<dyn OcrProviderTrait>,
        max_concurrent: usize,
        default_language: &str,
    ) -> Self {
        Self {
            default_language: default_language.to_string(),
            provider,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn provider_type(&self) -> OcrProvider {
        self.provider.provider_type()
    }

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    /// Recognitions that could start right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Perform OCR on an encoded image
    ///
    /// Waits for a permit first; dropping the future while waiting gives
    /// up the place in line.
    pub async fn recognize(
        &self,
        image_data: &[u8],
        language: Option<&str>,
    ) -> Result<OcrResult, OcrError> {
        let lang = language.unwrap_or(&self.default_language);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| OcrError::Closed)?;

        let started = std::time::Instant::now();
        let result = self.provider.recognize(image_data, Some(lang)).await;

        match &result {
            Ok(r) => tracing::debug!(
                provider = %self.provider.provider_type(),
                language = lang,
                chars = r.text.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "OCR complete"
            ),
            Err(e) => tracing::warn!(
                provider = %self.provider.provider_type(),
                language = lang,
                error = %e,
                "OCR failed"
            ),
        }

        result
    }

    /// Stop handing out permits; waiting and later calls fail with `Closed`
    pub fn close(&self) {
        self.permits.close();
    }
}

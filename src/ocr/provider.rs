//! OCR Providers
//!
//! Defines the provider trait and implementations for different OCR backends.

use std::process::Stdio;

use async_trait::async_trait;

use super::types::{OcrError, OcrProvider, OcrResult};

/// OCR provider trait
#[async_trait]
pub trait OcrProviderTrait: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> OcrProvider;

    /// Check if the provider is available
    async fn is_available(&self) -> bool;

    /// Perform OCR on an encoded image
    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError>;
}

/// Tesseract OCR provider, driving the `tesseract` binary
pub struct TesseractProvider {
    /// Default language
    default_language: String,
    /// Binary name or path
    binary: String,
}

impl TesseractProvider {
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
            binary: "tesseract".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }
}

#[async_trait]
impl OcrProviderTrait for TesseractProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError> {
        let lang = language.unwrap_or(&self.default_language);

        // Removed when `input` drops, including on cancellation
        let input = tempfile::Builder::new()
            .prefix("pdfx-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::ProcessingError(format!("Failed to create temp file: {}", e)))?
            .into_temp_path();

        tokio::fs::write(&input, image_data)
            .await
            .map_err(|e| OcrError::ProcessingError(format!("Failed to write temp file: {}", e)))?;

        let output = tokio::process::Command::new(&self.binary)
            .arg(&*input)
            .arg("stdout")
            .arg("-l")
            .arg(lang)
            .arg("--oem")
            .arg("3")
            .arg("--psm")
            .arg("3")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    OcrError::ProviderNotAvailable(format!("{} is not installed", self.binary))
                }
                _ => OcrError::ProcessingError(format!("Failed to run tesseract: {}", e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed: {}",
                stderr.trim()
            )));
        }

        Ok(OcrResult {
            text: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            confidence: 80.0, // Tesseract doesn't report page confidence on stdout
            provider: OcrProvider::Tesseract,
        })
    }
}

/// Ollama vision model provider
pub struct OllamaProvider {
    client: reqwest::Client,
    /// Ollama API URL
    base_url: String,
    /// Model name (e.g., "llava", "bakllava")
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl OcrProviderTrait for OllamaProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Ollama
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError> {
        use base64::Engine;

        let url = format!("{}/api/generate", self.base_url);
        let image_base64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let lang_hint = language
            .map(|l| format!(" The text is in {}.", l))
            .unwrap_or_default();

        let prompt = format!(
            "Extract all text from this image exactly as written.{} Return only the extracted text, nothing else.",
            lang_hint
        );

        let request = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "images": [image_base64],
            "stream": false
        });

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to call Ollama: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::ApiError(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OcrError::ApiError(format!("Failed to parse response: {}", e)))?;

        let text = result["response"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        Ok(OcrResult {
            text,
            confidence: 75.0, // LLMs don't provide confidence scores
            provider: OcrProvider::Ollama,
        })
    }
}

/// Mock provider for testing
#[cfg(test)]
pub struct MockProvider {
    pub text: String,
    pub fail: bool,
    pub delay: std::time::Duration,
    pub calls: std::sync::atomic::AtomicUsize,
    pub languages: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockProvider {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            fail: false,
            delay: std::time::Duration::ZERO,
            calls: std::sync::atomic::AtomicUsize::new(0),
            languages: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn slow(text: &str, delay: std::time::Duration) -> Self {
        Self {
            delay,
            ..Self::new(text)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl OcrProviderTrait for MockProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        !self.fail
    }

    async fn recognize(&self, image_data: &[u8], language: Option<&str>) -> Result<OcrResult, OcrError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.languages
            .lock()
            .push(language.unwrap_or_default().to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(OcrError::ProcessingError("mock failure".to_string()));
        }
        if image_data.is_empty() {
            return Err(OcrError::ProcessingError("empty image".to_string()));
        }

        Ok(OcrResult {
            text: self.text.clone(),
            confidence: 99.0,
            provider: OcrProvider::Tesseract,
        })
    }
}

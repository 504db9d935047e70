//! Server configuration
//!
//! Values come from `PDFX_*` environment variables (a `.env` file is loaded
//! first by `main`), falling back to defaults. CLI flags override the
//! transport, host and port afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::ocr::{OcrProvider, OcrServiceConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How sessions reach the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TransportKind {
    /// Server-sent events over HTTP, many concurrent sessions
    Sse,
    /// Newline-delimited JSON-RPC on stdin/stdout, one session
    Stdio,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sse" | "http" => Ok(Self::Sse),
            "stdio" => Ok(Self::Stdio),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Interval between SSE keep-alive comments
    pub keepalive_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sessions without activity for this long are closed
    pub idle_timeout: Duration,
    /// How long a closing session waits for in-flight requests
    pub drain_timeout: Duration,
    /// How often the idle sweeper runs
    pub sweep_interval: Duration,
    /// Outbound message buffer per session
    pub outbound_buffer: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound for a single extraction, fetch included
    pub request_timeout: Duration,
    /// Where scoped temporary files are created
    pub temp_dir: PathBuf,
    /// Minimum non-whitespace characters for a page to count as text
    pub min_text_chars: usize,
    /// How many of the requested pages the classifier samples
    pub sample_pages: usize,
    /// Remote downloads larger than this are rejected
    pub max_download_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub pipeline: PipelineConfig,
    pub ocr: OcrServiceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            transport: TransportKind::Sse,
            keepalive_interval: Duration::from_secs(15),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30),
            outbound_buffer: 64,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            temp_dir: std::env::temp_dir(),
            min_text_chars: 8,
            sample_pages: 5,
            max_download_bytes: 200 * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            pipeline: PipelineConfig::default(),
            ocr: OcrServiceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `PDFX_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let server = ServerConfig {
            host: env_or("PDFX_HOST", defaults.server.host)?,
            port: env_or("PDFX_PORT", defaults.server.port)?,
            transport: env_or("PDFX_TRANSPORT", defaults.server.transport)?,
            keepalive_interval: env_secs(
                "PDFX_KEEPALIVE_SECS",
                defaults.server.keepalive_interval,
            )?,
        };

        let session = SessionConfig {
            idle_timeout: env_secs("PDFX_IDLE_TIMEOUT_SECS", defaults.session.idle_timeout)?,
            drain_timeout: env_secs("PDFX_DRAIN_TIMEOUT_SECS", defaults.session.drain_timeout)?,
            sweep_interval: env_secs("PDFX_SWEEP_INTERVAL_SECS", defaults.session.sweep_interval)?,
            outbound_buffer: env_or("PDFX_OUTBOUND_BUFFER", defaults.session.outbound_buffer)?,
        };

        let pipeline = PipelineConfig {
            request_timeout: env_secs(
                "PDFX_REQUEST_TIMEOUT_SECS",
                defaults.pipeline.request_timeout,
            )?,
            temp_dir: env_or("PDFX_TEMP_DIR", defaults.pipeline.temp_dir)?,
            min_text_chars: env_or("PDFX_MIN_TEXT_CHARS", defaults.pipeline.min_text_chars)?,
            sample_pages: env_or("PDFX_SAMPLE_PAGES", defaults.pipeline.sample_pages)?,
            max_download_bytes: env_or(
                "PDFX_MAX_DOWNLOAD_BYTES",
                defaults.pipeline.max_download_bytes,
            )?,
        };

        let ocr = OcrServiceConfig {
            provider: env_or::<OcrProvider>("PDFX_OCR_ENGINE", defaults.ocr.provider)?,
            ollama_url: env_or("PDFX_OLLAMA_URL", defaults.ocr.ollama_url)?,
            ollama_model: env_or("PDFX_OLLAMA_MODEL", defaults.ocr.ollama_model)?,
            default_language: env_or("PDFX_OCR_LANGUAGE", defaults.ocr.default_language)?,
            max_concurrent: env_or("PDFX_OCR_CONCURRENCY", defaults.ocr.max_concurrent)?,
        };

        let config = Config {
            server,
            session,
            pipeline,
            ocr,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the server unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |key: &'static str, value: String| ConfigError::InvalidValue {
            key,
            value,
            reason: "must be greater than zero".to_string(),
        };

        if self.session.idle_timeout.is_zero() {
            return Err(zero("PDFX_IDLE_TIMEOUT_SECS", "0".into()));
        }
        if self.session.sweep_interval.is_zero() {
            return Err(zero("PDFX_SWEEP_INTERVAL_SECS", "0".into()));
        }
        if self.session.outbound_buffer == 0 {
            return Err(zero("PDFX_OUTBOUND_BUFFER", "0".into()));
        }
        if self.pipeline.request_timeout.is_zero() {
            return Err(zero("PDFX_REQUEST_TIMEOUT_SECS", "0".into()));
        }
        if self.ocr.max_concurrent == 0 {
            return Err(zero("PDFX_OCR_CONCURRENCY", "0".into()));
        }
        Ok(())
    }
}

fn env_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key,
                    value,
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

fn env_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.transport, TransportKind::Sse);
    }

    #[test]
    fn test_zero_ocr_concurrency_rejected() {
        let mut config = Config::default();
        config.ocr.max_concurrent = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "PDFX_OCR_CONCURRENCY", .. })
        ));
    }

    #[test]
    fn test_transport_parsing() {
        assert_eq!("stdio".parse::<TransportKind>(), Ok(TransportKind::Stdio));
        assert_eq!("SSE".parse::<TransportKind>(), Ok(TransportKind::Sse));
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_env_override_and_bad_value() {
        std::env::set_var("PDFX_TEST_ONLY_PORT", "9123");
        assert_eq!(env_or::<u16>("PDFX_TEST_ONLY_PORT", 1).unwrap(), 9123);

        std::env::set_var("PDFX_TEST_ONLY_PORT", "not-a-port");
        assert!(env_or::<u16>("PDFX_TEST_ONLY_PORT", 1).is_err());

        std::env::remove_var("PDFX_TEST_ONLY_PORT");
        assert_eq!(env_or::<u16>("PDFX_TEST_ONLY_PORT", 7).unwrap(), 7);
    }
}

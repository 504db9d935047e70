//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::engine::default_engine;
use crate::metrics::{Metrics, ProcfsSampler, ResourceSampler};
use crate::ocr::OcrService;
use crate::pipeline::Pipeline;
use crate::session::SessionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    dispatcher: Dispatcher,
    sampler: Arc<dyn ResourceSampler>,
}

impl AppState {
    pub fn new(config: Config, dispatcher: Dispatcher, sampler: Arc<dyn ResourceSampler>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                dispatcher,
                sampler,
            }),
        }
    }

    /// Wire the full server from configuration
    ///
    /// Uses the engine selected at build time, the configured OCR provider
    /// and the procfs resource sampler.
    pub fn from_config(config: Config) -> Self {
        let ocr = Arc::new(OcrService::new(config.ocr.clone()));
        let pipeline = Arc::new(Pipeline::new(&config.pipeline, default_engine(), ocr));

        tracing::info!(
            engine = pipeline.engine_name(),
            ocr = %pipeline.ocr().provider_type(),
            temp_dir = %config.pipeline.temp_dir.display(),
            "Pipeline ready"
        );

        let dispatcher = Dispatcher::new(
            SessionRegistry::new(),
            Metrics::new(),
            pipeline,
            config.session.clone(),
        );

        Self::new(config, dispatcher, Arc::new(ProcfsSampler))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Get the process resource sampler
    pub fn sampler(&self) -> &dyn ResourceSampler {
        self.inner.sampler.as_ref()
    }

    /// Close every session and stop accepting OCR work
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.dispatcher.shutdown().await;
        self.inner.dispatcher.pipeline().ocr().close();
    }
}

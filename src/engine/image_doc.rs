//! Raster image sources: one page, no text layer

use std::path::{Path, PathBuf};

use image::ImageFormat;

use super::{encode_png, EngineError, OpenedDocument};
use crate::classify::DocumentKind;

pub struct ImageDocument {
    path: PathBuf,
    format: ImageFormat,
}

impl ImageDocument {
    pub fn open(path: &Path, format: ImageFormat) -> Result<Self, EngineError> {
        // Header check only; pixels are decoded when the page is requested
        image::ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| EngineError::Load(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
        })
    }
}

impl OpenedDocument for ImageDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Image(self.format)
    }

    fn page_count(&self) -> u32 {
        1
    }

    fn page_text(&self, page: u32) -> Result<String, EngineError> {
        self.check_page(page)?;
        Ok(String::new())
    }

    fn page_image(&self, page: u32) -> Result<Option<Vec<u8>>, EngineError> {
        self.check_page(page)?;
        let bytes = std::fs::read(&self.path)?;

        // OCR backends take PNG and JPEG as-is
        if matches!(self.format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Ok(Some(bytes));
        }

        let render = |message: String| EngineError::Render { page, message };
        let img = image::load_from_memory_with_format(&bytes, self.format)
            .map_err(|e| render(e.to_string()))?;
        encode_png(&img).map(Some).map_err(|e| render(e.to_string()))
    }
}

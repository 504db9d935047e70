//! MuPDF-backed PDF engine (feature `mupdf`)
//!
//! `mupdf::Document` is neither `Send` nor `Sync`, so an opened document only
//! keeps the path and reopens it for every call. All MuPDF calls in the
//! process go through one lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use super::{encode_png, DocumentEngine, EngineError, ImageDocument, OpenedDocument};
use crate::classify::DocumentKind;

/// 150 DPI; MuPDF's identity matrix renders at 72
const OCR_SCALE: f32 = 150.0 / 72.0;

pub struct MupdfEngine {
    lock: Arc<Mutex<()>>,
}

impl MupdfEngine {
    pub fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
        }
    }
}

impl Default for MupdfEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentEngine for MupdfEngine {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn open(&self, path: &Path, kind: DocumentKind) -> Result<Box<dyn OpenedDocument>, EngineError> {
        match kind {
            DocumentKind::Pdf => Ok(Box::new(MupdfDocument::open(path, self.lock.clone())?)),
            DocumentKind::Image(format) => Ok(Box::new(ImageDocument::open(path, format)?)),
        }
    }
}

struct MupdfDocument {
    path: PathBuf,
    page_count: u32,
    lock: Arc<Mutex<()>>,
}

impl MupdfDocument {
    fn open(path: &Path, lock: Arc<Mutex<()>>) -> Result<Self, EngineError> {
        let page_count = {
            let _guard = lock.lock();
            let doc = load(path)?;
            doc.page_count().map_err(|e| EngineError::Load(e.to_string()))? as u32
        };

        Ok(Self {
            path: path.to_path_buf(),
            page_count,
            lock,
        })
    }
}

fn load(path: &Path) -> Result<Document, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Load(format!("non UTF-8 path {}", path.display())))?;
    Document::open(path_str).map_err(|e| EngineError::Load(e.to_string()))
}

impl OpenedDocument for MupdfDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn page_text(&self, page: u32) -> Result<String, EngineError> {
        self.check_page(page)?;
        let text_err = |e: mupdf::Error| EngineError::Text {
            page,
            message: e.to_string(),
        };

        let _guard = self.lock.lock();
        let doc = load(&self.path)?;
        let loaded = doc.load_page(page as i32 - 1).map_err(text_err)?;
        let text = loaded.to_text().map_err(text_err)?;
        Ok(text.trim_end().to_string())
    }

    fn page_image(&self, page: u32) -> Result<Option<Vec<u8>>, EngineError> {
        self.check_page(page)?;
        let render_err = |e: mupdf::Error| EngineError::Render {
            page,
            message: e.to_string(),
        };

        let pixmap = {
            let _guard = self.lock.lock();
            let doc = load(&self.path)?;
            let loaded = doc.load_page(page as i32 - 1).map_err(render_err)?;
            let matrix = Matrix::new_scale(OCR_SCALE, OCR_SCALE);
            loaded
                .to_pixmap(&matrix, &Colorspace::device_rgb(), false, true)
                .map_err(render_err)?
        };

        let img = pixmap_to_image(&pixmap).ok_or_else(|| EngineError::Render {
            page,
            message: "pixmap size does not match its samples".to_string(),
        })?;
        encode_png(&img).map(Some).map_err(|e| EngineError::Render {
            page,
            message: e.to_string(),
        })
    }
}

fn pixmap_to_image(pixmap: &mupdf::Pixmap) -> Option<image::DynamicImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in samples.chunks_exact(n.max(1)) {
        let r = pixel.first().copied().unwrap_or(0);
        let g = pixel.get(1).copied().unwrap_or(r);
        let b = pixel.get(2).copied().unwrap_or(r);
        rgb.extend_from_slice(&[r, g, b]);
    }

    image::RgbImage::from_raw(width, height, rgb).map(image::DynamicImage::ImageRgb8)
}

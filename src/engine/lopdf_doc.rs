//! PDF access through lopdf
//!
//! lopdf parses the whole file up front, so the file is not held open after
//! `open` returns.

use std::collections::BTreeMap;
use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use super::{encode_png, EngineError, OpenedDocument};
use crate::classify::DocumentKind;

/// Maximum Parent hops when looking for inherited resources
const MAX_INHERITANCE_DEPTH: usize = 32;

pub struct LopdfDocument {
    doc: Document,
    pages: BTreeMap<u32, ObjectId>,
}

impl LopdfDocument {
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let doc = Document::load(path).map_err(|e| EngineError::Load(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages();
        Self { doc, pages }
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, EngineError> {
        self.pages
            .get(&page)
            .copied()
            .ok_or(EngineError::PageNotFound {
                page,
                page_count: self.page_count(),
            })
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn dict_entry<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        dict.get(key).ok().and_then(|obj| self.resolve(obj))
    }

    /// Page resources, following /Parent for inherited entries
    fn page_resources(&self, page_id: ObjectId) -> Option<&Dictionary> {
        let mut current = self.doc.get_object(page_id).ok()?.as_dict().ok();
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let dict = current?;
            if let Some(resources) = self.dict_entry(dict, b"Resources") {
                return resources.as_dict().ok();
            }
            current = self
                .dict_entry(dict, b"Parent")
                .and_then(|parent| parent.as_dict().ok());
        }
        None
    }

    /// Image XObjects painted on a page
    fn page_images(&self, page_id: ObjectId) -> Vec<&Stream> {
        let Some(resources) = self.page_resources(page_id) else {
            return Vec::new();
        };
        let Some(xobjects) = self
            .dict_entry(resources, b"XObject")
            .and_then(|x| x.as_dict().ok())
        else {
            return Vec::new();
        };

        xobjects
            .iter()
            .filter_map(|(_, obj)| self.resolve(obj))
            .filter_map(|obj| obj.as_stream().ok())
            .filter(|stream| {
                matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
            })
            .collect()
    }
}

impl OpenedDocument for LopdfDocument {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Pdf
    }

    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, page: u32) -> Result<String, EngineError> {
        self.page_id(page)?;
        let text = self.doc.extract_text(&[page]).map_err(|e| EngineError::Text {
            page,
            message: e.to_string(),
        })?;
        Ok(text.trim_end().to_string())
    }

    fn page_image(&self, page: u32) -> Result<Option<Vec<u8>>, EngineError> {
        let page_id = self.page_id(page)?;

        // A scanned page is normally one full-page bitmap; take the largest
        let largest = self
            .page_images(page_id)
            .into_iter()
            .max_by_key(|stream| {
                let width = int_entry(&stream.dict, b"Width").unwrap_or(0);
                let height = int_entry(&stream.dict, b"Height").unwrap_or(0);
                width.saturating_mul(height)
            });

        let Some(stream) = largest else {
            return Ok(None);
        };

        let render = |message: String| EngineError::Render { page, message };
        let img = decode_image_stream(stream).map_err(render)?;
        encode_png(&img).map(Some).map_err(|e| render(e.to_string()))
    }
}

fn int_entry(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict.get(key).ok().and_then(|o| o.as_i64().ok())
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an image XObject into pixels
fn decode_image_stream(stream: &Stream) -> Result<DynamicImage, String> {
    let filters = filters(stream);

    if filters.iter().any(|f| f == b"DCTDecode") {
        return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
            .map_err(|e| format!("JPEG decode failed: {}", e));
    }
    if let Some(f) = filters
        .iter()
        .find(|f| matches!(f.as_slice(), b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode"))
    {
        return Err(format!("unsupported image filter {}", String::from_utf8_lossy(f)));
    }

    let data = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|e| format!("decompression failed: {}", e))?
    };

    let width = int_entry(&stream.dict, b"Width").ok_or("image has no /Width")?;
    let height = int_entry(&stream.dict, b"Height").ok_or("image has no /Height")?;
    if width <= 0 || height <= 0 {
        return Err(format!("bad image size {}x{}", width, height));
    }
    let (width, height) = (width as u32, height as u32);
    let bits = int_entry(&stream.dict, b"BitsPerComponent").unwrap_or(8);
    let pixels = width as usize * height as usize;

    let components = match stream.dict.get(b"ColorSpace") {
        Ok(Object::Name(n)) if n == b"DeviceGray" || n == b"CalGray" => 1,
        Ok(Object::Name(n)) if n == b"DeviceRGB" || n == b"CalRGB" => 3,
        Ok(Object::Name(n)) if n == b"DeviceCMYK" => 4,
        // ICC-based and friends: infer from the sample count
        _ if bits == 8 && pixels > 0 => data.len() / pixels,
        _ => 1,
    };

    match (bits, components) {
        (1, 1) => {
            let row_bytes = (width as usize + 7) / 8;
            if data.len() < row_bytes * height as usize {
                return Err("truncated 1-bit image".to_string());
            }
            let img = GrayImage::from_fn(width, height, |x, y| {
                let byte = data[y as usize * row_bytes + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            });
            Ok(DynamicImage::ImageLuma8(img))
        }
        (8, 1) => GrayImage::from_raw(width, height, truncate(data, pixels))
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| "truncated gray image".to_string()),
        (8, 3) => RgbImage::from_raw(width, height, truncate(data, pixels * 3))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "truncated RGB image".to_string()),
        (8, 4) => {
            if data.len() < pixels * 4 {
                return Err("truncated CMYK image".to_string());
            }
            let rgb: Vec<u8> = data[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = cmyk[3] as u16;
                    let channel = |c: u8| 255u16.saturating_sub(c as u16 + k) as u8;
                    [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
                })
                .collect();
            RgbImage::from_raw(width, height, rgb)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| "bad CMYK image".to_string())
        }
        (bits, components) => Err(format!(
            "unsupported image layout: {} bits x {} components",
            bits, components
        )),
    }
}

fn truncate(mut data: Vec<u8>, len: usize) -> Vec<u8> {
    data.truncate(len);
    data
}

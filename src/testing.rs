//! Document fixtures shared by unit tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tempfile::TempDir;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::engine::StandardEngine;
use crate::metrics::{Metrics, ProcfsSampler};
use crate::ocr::{MockProvider, OcrService};
use crate::pipeline::Pipeline;
use crate::session::SessionRegistry;
use crate::state::AppState;

const WORDS: [&str; 10] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

/// Side length of the bitmap painted on scanned pages
pub const SCAN_SIZE: i64 = 16;

enum FixturePage {
    Text(String),
    Scan,
}

/// A PDF whose pages carry a text layer reading "This is page <word>"
pub fn text_pdf(pages: usize) -> Vec<u8> {
    let pages: Vec<FixturePage> = (0..pages)
        .map(|i| FixturePage::Text(format!("This is page {}", WORDS[i % WORDS.len()])))
        .collect();
    build_pdf(&pages)
}

/// A PDF whose pages are bare bitmaps with no text layer
pub fn scanned_pdf(pages: usize) -> Vec<u8> {
    let pages: Vec<FixturePage> = (0..pages).map(|_| FixturePage::Scan).collect();
    build_pdf(&pages)
}

/// Page 1 has text, page 2 is a scan
pub fn mixed_pdf() -> Vec<u8> {
    build_pdf(&[
        FixturePage::Text("Cover page with real text".to_string()),
        FixturePage::Scan,
    ])
}

/// A small PNG image
pub fn png_image() -> Vec<u8> {
    let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
        8,
        8,
        image::Luma([200]),
    ));
    crate::engine::encode_png(&img).unwrap()
}

pub fn write_fixture(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Number of entries in a directory
pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Full application state over the lopdf engine and a mock OCR provider,
/// with temp files going to `temp_dir`
pub fn test_state(temp_dir: &Path, provider: MockProvider) -> AppState {
    let mut config = Config::default();
    config.pipeline.temp_dir = temp_dir.to_path_buf();
    config.session.drain_timeout = Duration::from_secs(2);

    let ocr = Arc::new(OcrService::with_provider(Arc::new(provider), 2, "eng"));
    let pipeline = Arc::new(Pipeline::new(&config.pipeline, Arc::new(StandardEngine), ocr));
    let dispatcher = Dispatcher::new(
        SessionRegistry::new(),
        Metrics::new(),
        pipeline,
        config.session.clone(),
    );
    AppState::new(config, dispatcher, Arc::new(ProcfsSampler))
}

fn build_pdf(pages: &[FixturePage]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let page_id = match page {
            FixturePage::Text(text) => add_text_page(&mut doc, pages_id, font_id, text),
            FixturePage::Scan => add_scan_page(&mut doc, pages_id),
        };
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

fn add_text_page(doc: &mut Document, pages_id: ObjectId, font_id: ObjectId, text: &str) -> ObjectId {
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    })
}

fn add_scan_page(doc: &mut Document, pages_id: ObjectId) -> ObjectId {
    let pixels = vec![128u8; (SCAN_SIZE * SCAN_SIZE) as usize];
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => SCAN_SIZE,
            "Height" => SCAN_SIZE,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        pixels,
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! {
            "Im1" => image_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![612.into(), 0.into(), 0.into(), 792.into(), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec!["Im1".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
    })
}

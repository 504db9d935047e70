//! Format detection from leading bytes, falling back to the file extension

use std::io::Read;
use std::path::Path;

use super::types::{DocumentKind, ValidationError};

/// Bytes inspected when sniffing
const SNIFF_LEN: usize = 1024;

/// Detect the document kind from its first bytes and its path
pub fn sniff_kind(head: &[u8], path: &Path) -> Result<DocumentKind, ValidationError> {
    // Some producers prepend junk before the header; readers accept it
    // anywhere in the first kilobyte.
    let window = &head[..head.len().min(SNIFF_LEN)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Ok(DocumentKind::Pdf);
    }

    if let Ok(format) = image::guess_format(window) {
        return Ok(DocumentKind::Image(format));
    }

    let mime = mime_guess::from_path(path).first();
    match mime {
        Some(m) if m.essence_str() == "application/pdf" => Ok(DocumentKind::Pdf),
        Some(m) if m.type_() == mime_guess::mime::IMAGE => {
            image::ImageFormat::from_mime_type(m.essence_str())
                .map(DocumentKind::Image)
                .ok_or_else(|| ValidationError::UnsupportedFormat(m.essence_str().to_string()))
        }
        Some(m) => Err(ValidationError::UnsupportedFormat(m.essence_str().to_string())),
        None if head.is_empty() => Err(ValidationError::UnsupportedFormat(
            "empty file".to_string(),
        )),
        None => Err(ValidationError::UnsupportedFormat(
            "unrecognized content".to_string(),
        )),
    }
}

/// Read the head of a file on disk and sniff it
pub fn sniff_file(path: &Path) -> std::io::Result<Result<DocumentKind, ValidationError>> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    std::fs::File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)?;
    Ok(sniff_kind(&head, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_pdf_magic() {
        assert_eq!(
            sniff_kind(b"%PDF-1.7\n...", Path::new("x.tmp")),
            Ok(DocumentKind::Pdf)
        );
        assert_eq!(
            sniff_kind(b"\r\n\r\n%PDF-1.4", Path::new("noext")),
            Ok(DocumentKind::Pdf)
        );
    }

    #[test]
    fn test_image_magic_beats_extension() {
        assert_eq!(
            sniff_kind(PNG_MAGIC, Path::new("scan.pdf")),
            Ok(DocumentKind::Image(image::ImageFormat::Png))
        );
    }

    #[test]
    fn test_extension_fallback() {
        assert_eq!(
            sniff_kind(b"garbage", Path::new("doc.pdf")),
            Ok(DocumentKind::Pdf)
        );
        assert!(matches!(
            sniff_kind(b"garbage", Path::new("notes.txt")),
            Err(ValidationError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            sniff_kind(b"", Path::new("blob")),
            Err(ValidationError::UnsupportedFormat(_))
        ));
    }
}

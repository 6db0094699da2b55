//! Payload building: a ready artifact → what the extraction service receives.
//!
//! PDFs and images travel as base64 attachments (`ImageData` carries any MIME
//! type, and PDF-capable providers such as Gemini read `application/pdf`
//! directly). Text travels inline. When a provider cannot take PDFs the pages
//! are rasterised to lossless PNG first; JPEG artefacts on rendered text hurt
//! extraction accuracy.

use crate::config::PdfDelivery;
use crate::error::FileError;
use crate::pipeline::render::render_pages;
use crate::pipeline::text::decode_text;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// What is sent to the extraction service for one file.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Binary content as base64 attachments (one PDF, one image, or pages).
    Attachments(Vec<ImageData>),
    /// Text content, sent inline.
    Text { name: String, content: String },
}

impl Payload {
    /// Approximate request size, for logging.
    pub fn size_hint(&self) -> usize {
        match self {
            Payload::Attachments(items) => items.iter().map(|i| i.data.len()).sum(),
            Payload::Text { content, .. } => content.len(),
        }
    }
}

/// Knobs for payload building.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub pdf_delivery: PdfDelivery,
    pub max_pages: usize,
    pub max_rendered_pixels: u32,
}

/// Build the payload for an artifact at `path` with MIME type `mime`.
pub async fn encode_file(
    path: &Path,
    mime: &str,
    name: &str,
    opts: EncodeOptions,
) -> Result<Payload, FileError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| FileError::SourceUnreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    if mime.starts_with("text/") || is_textual(mime) {
        let (content, encoding) = decode_text(&bytes);
        debug!(
            "Inline text payload for {}: {} chars ({})",
            name,
            content.len(),
            encoding
        );
        return Ok(Payload::Text {
            name: name.to_string(),
            content,
        });
    }

    if mime == "application/pdf" && opts.pdf_delivery == PdfDelivery::Rasterise {
        let pages = render_pages(path, opts.max_pages, opts.max_rendered_pixels)
            .await
            .map_err(|detail| FileError::ConversionEngine {
                converter: "pdfium".into(),
                detail,
            })?;
        let images = pages
            .iter()
            .map(encode_page)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FileError::ConversionEngine {
                converter: "png".into(),
                detail: e.to_string(),
            })?;
        return Ok(Payload::Attachments(images));
    }

    let b64 = STANDARD.encode(&bytes);
    debug!("Attachment payload for {}: {} ({} bytes base64)", name, mime, b64.len());
    let mut data = ImageData::new(b64, mime);
    if mime.starts_with("image/") {
        data = data.with_detail("high");
    }
    Ok(Payload::Attachments(vec![data]))
}

fn is_textual(mime: &str) -> bool {
    matches!(
        mime,
        "application/json" | "application/xml" | "application/rtf" | "application/yaml"
            | "application/x-yaml"
    )
}

/// Encode a rasterised page as a base64 PNG attachment.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const NATIVE: EncodeOptions = EncodeOptions {
        pdf_delivery: PdfDelivery::Native,
        max_pages: 50,
        max_rendered_pixels: 2000,
    };

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).unwrap();
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[tokio::test]
    async fn native_pdf_is_one_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        match encode_file(&path, "application/pdf", "a.pdf", NATIVE).await.unwrap() {
            Payload::Attachments(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].mime_type, "application/pdf");
                assert_eq!(STANDARD.decode(&items[0].data).unwrap(), b"%PDF-1.4 body");
            }
            other => panic!("expected attachment, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_is_inlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.json");
        std::fs::write(&path, b"{\"k\": \"caf\xE9\"}").unwrap();

        let payload = encode_file(&path, "application/json", "n.json", NATIVE)
            .await
            .unwrap();
        match &payload {
            Payload::Text { name, content } => {
                assert_eq!(name, "n.json");
                assert!(content.starts_with("{\"k\": \"caf"));
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert!(payload.size_hint() > 0);
    }

    #[tokio::test]
    async fn cp1252_csv_is_inlined_with_accents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        std::fs::write(&path, b"libell\xE9;montant\nD\xE9jeuner d'\xE9quipe;84\n").unwrap();

        match encode_file(&path, "text/csv", "ledger.csv", NATIVE).await.unwrap() {
            Payload::Text { content, .. } => {
                assert!(content.contains("libellé;montant"), "got {content:?}");
                assert!(content.contains("Déjeuner d'équipe"), "got {content:?}");
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_artifact_is_unreadable() {
        let err = encode_file(Path::new("/no/such.png"), "image/png", "such.png", NATIVE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceUnreadable);
    }
}

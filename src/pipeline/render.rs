//! PDF rasterisation for providers that cannot take PDF attachments.
//!
//! pdfium is bound at runtime: `PDFIUM_LIB_PATH` first, then the system
//! library. pdfium keeps thread-local state, so rendering always runs under
//! `spawn_blocking`. Output images are capped on their longest edge by
//! `max_rendered_pixels` rather than by DPI, since page sizes vary wildly.

use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Bind to the pdfium shared library.
pub fn bind_pdfium() -> Result<Pdfium, String> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        match Pdfium::bind_to_library(&path) {
            Ok(bindings) => return Ok(Pdfium::new(bindings)),
            Err(e) => warn!("PDFIUM_LIB_PATH '{}' could not be bound: {}", path, e),
        }
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| format!("pdfium library not found: {e}"))
}

/// Whether a pdfium library can be bound in this process.
pub fn probe_pdfium() -> bool {
    match bind_pdfium() {
        Ok(_) => true,
        Err(e) => {
            debug!("Rasteriser unavailable: {}", e);
            false
        }
    }
}

/// Render up to `max_pages` pages of the PDF at `pdf_path`.
pub async fn render_pages(
    pdf_path: &Path,
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, String> {
    let path = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || render_pages_blocking(&path, max_pages, max_pixels))
        .await
        .map_err(|e| format!("render task panicked: {e}"))?
}

fn render_pages_blocking(
    pdf_path: &Path,
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, String> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| format!("cannot open PDF: {e:?}"))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if total > max_pages {
        warn!(
            "{}: rendering first {} of {} pages",
            pdf_path.display(),
            max_pages,
            total
        );
    } else {
        info!("{}: rendering {} pages", pdf_path.display(), total);
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total.min(max_pages));
    for idx in 0..total.min(max_pages) {
        let page = pages
            .get(idx as u16)
            .map_err(|e| format!("page {}: {e:?}", idx + 1))?;
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("page {}: {e:?}", idx + 1))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }
    Ok(images)
}

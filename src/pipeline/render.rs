//! PDF rasterisation: render every page of a PDF to `page_{i}.png`.
//!
//! The pdfium library keeps thread-local state and is blocking, so rendering
//! runs on `tokio::task::spawn_blocking` to keep the runtime's worker threads
//! free. `max_rendered_pixels` caps the longest edge regardless of physical
//! page size, which keeps memory bounded for poster-sized pages.

use crate::error::ScribeError;
use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Turns a PDF into one image file per page.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render `pdf` into `dest`, returning the image paths in page order.
    async fn render(&self, pdf: &Path, dest: &Path) -> Result<Vec<PathBuf>, ScribeError>;
}

/// File name of the image for a 0-based page index.
pub fn page_file_name(index: usize) -> String {
    format!("page_{index}.png")
}

/// [`Rasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(max_rendered_pixels: u32) -> Self {
        Self { max_rendered_pixels }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn render(&self, pdf: &Path, dest: &Path) -> Result<Vec<PathBuf>, ScribeError> {
        let pdf = pdf.to_path_buf();
        let dest = dest.to_path_buf();
        let max_pixels = self.max_rendered_pixels;

        tokio::task::spawn_blocking(move || render_blocking(&pdf, &dest, max_pixels))
            .await
            .map_err(|e| ScribeError::Internal(format!("Render task panicked: {e}")))?
    }
}

fn bind_pdfium(pdf: &Path) -> Result<Pdfium, ScribeError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(lib) if !lib.is_empty() => {
            debug!("Binding pdfium from {}", lib);
            Pdfium::bind_to_library(&lib)
        }
        _ => Pdfium::bind_to_system_library(),
    };

    bindings.map(Pdfium::new).map_err(|e| ScribeError::RasterizationFailed {
        path: pdf.to_path_buf(),
        detail: format!("pdfium library unavailable: {e:?}"),
    })
}

fn render_blocking(pdf: &Path, dest: &Path, max_pixels: u32) -> Result<Vec<PathBuf>, ScribeError> {
    let failed = |detail: String| ScribeError::RasterizationFailed {
        path: pdf.to_path_buf(),
        detail,
    };

    let pdfium = bind_pdfium(pdf)?;
    let document = pdfium
        .load_pdf_from_file(pdf, None)
        .map_err(|e| failed(format!("{e:?}")))?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut paths = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("page {idx}: {e:?}")))?;
        let image = bitmap.as_image();

        let path = dest.join(page_file_name(idx));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| failed(format!("page {idx}: cannot write '{}': {e}", path.display())))?;

        debug!(
            "Rendered page {} → {}x{} px",
            idx,
            image.width(),
            image.height()
        );
        paths.push(path);
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_files_are_zero_based() {
        assert_eq!(page_file_name(0), "page_0.png");
        assert_eq!(page_file_name(12), "page_12.png");
    }
}

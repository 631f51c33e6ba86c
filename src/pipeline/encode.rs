//! Image encoding: page image bytes → base64 `ImageData` for the VLM request.
//!
//! Vision APIs accept images as base64 payloads embedded in the JSON body.
//! Pages are rendered as PNG: lossless compression keeps glyph edges crisp,
//! which matters far more for OCR accuracy than file size.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// A page image loaded from disk, ready to attach to a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl PageImage {
    /// Read an image file, inferring the MIME type from its extension.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            bytes,
            mime_type: mime_type_for(path),
        })
    }
}

/// MIME type for a rendered page, by file extension. PNG when unknown.
pub fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

/// Wrap a page image as base64 `ImageData`.
///
/// `detail: "high"` lets GPT-4-class models use the full tile budget; without
/// it fine print and small tables are lost. Other providers ignore it.
pub fn to_image_data(image: &PageImage) -> ImageData {
    let b64 = STANDARD.encode(&image.bytes);
    debug!("Encoded {} image → {} bytes base64", image.mime_type, b64.len());
    ImageData::new(b64, image.mime_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(mime_type_for(Path::new("page_0.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("scan.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("noext")), "image/png");
    }

    #[test]
    fn encodes_as_base64() {
        let img = PageImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png",
        };
        let data = to_image_data(&img);
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), img.bytes);
    }

    #[tokio::test]
    async fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_0.png");
        std::fs::write(&path, b"pixels").unwrap();
        let img = PageImage::load(&path).await.unwrap();
        assert_eq!(img.bytes, b"pixels");
        assert_eq!(img.mime_type, "image/png");
    }
}

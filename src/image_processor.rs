use image::ImageFormat;
use std::path::Path;

use crate::errors::{PostError, PostResult};

/// Largest blob the service accepts for a post thumbnail.
pub const MAX_BLOB_SIZE: usize = 1_000_000;

/// Binary image payload plus the MIME type it is uploaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl ImageBlob {
    /// Build a blob from raw bytes. A declared MIME type wins over the sniffed one.
    pub fn from_bytes(data: Vec<u8>, declared_mime: Option<&str>) -> PostResult<Self> {
        if data.is_empty() {
            return Err(PostError::client("Image payload is empty"));
        }

        let mime_type = match declared_mime {
            Some(mime) if !mime.trim().is_empty() => mime.trim().to_string(),
            _ => detect_mime_type(&data)?,
        };

        Ok(Self { data, mime_type })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

pub fn detect_mime_type(data: &[u8]) -> PostResult<String> {
    let format = image::guess_format(data)?;
    let mime = match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        other => {
            return Err(PostError::client(format!(
                "Unsupported image format: {:?}",
                other
            )))
        }
    };
    Ok(mime.to_string())
}

/// Load the rendered image for a job.
///
/// A file that does not exist or cannot be read yields `Ok(None)` so the job
/// takes the missing-image path. Bytes that are not a supported image are an error.
pub async fn load_image_blob(file_path: &Path) -> PostResult<Option<ImageBlob>> {
    let data = match tokio::fs::read(file_path).await {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Could not read image {}: {}", file_path.display(), e);
            return Ok(None);
        }
    };

    if data.is_empty() {
        log::warn!("Image {} is empty", file_path.display());
        return Ok(None);
    }

    let blob = ImageBlob::from_bytes(data, None)?;
    if blob.size() > MAX_BLOB_SIZE {
        log::warn!(
            "Image {} is {} bytes, above the {} byte blob limit",
            file_path.display(),
            blob.size(),
            MAX_BLOB_SIZE
        );
    }

    log::debug!(
        "Loaded image {} ({} bytes, {})",
        file_path.display(),
        blob.size(),
        blob.mime_type
    );
    Ok(Some(blob))
}

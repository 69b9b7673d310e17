use anyhow::{anyhow, Context, Result};
use image::{GenericImageView, ImageFormat};
use tracing::{debug, warn};

use crate::utils::http::get_http_client;

const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Single-shot download; callers surface the failure to the user.
pub async fn download_media(url: &str) -> Result<Vec<u8>> {
    let response = get_http_client()
        .get(url)
        .send()
        .await
        .map_err(|err| {
            warn!(
                "Failed to fetch media: {err} (timeout={}, connect={})",
                err.is_timeout(),
                err.is_connect()
            );
            anyhow!("media download failed: {}", err.without_url())
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "media download failed with status {}: {}",
            status,
            truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
        ));
    }

    let bytes = response
        .bytes()
        .await
        .context("failed to read media bytes")?;
    Ok(bytes.to_vec())
}

/// Photo bytes that were successfully decoded as an image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

fn mime_for_format(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        _ => "image/jpeg",
    }
}

pub fn decode_image(bytes: Vec<u8>) -> Result<DecodedImage> {
    if bytes.is_empty() {
        return Err(anyhow!("image data is empty"));
    }
    let format = image::guess_format(&bytes).context("unrecognized image format")?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .context("failed to decode image")?;
    let (width, height) = decoded.dimensions();
    let mime_type =
        detect_mime_type(&bytes).unwrap_or_else(|| mime_for_format(format).to_string());
    debug!(width, height, mime_type = %mime_type, "Decoded photo");

    Ok(DecodedImage {
        bytes,
        mime_type,
        width,
        height,
    })
}

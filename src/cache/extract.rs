//! Image extraction from host messages.
//!
//! Each [`ImageRef`] is resolved by trying, in order:
//! 1. a local file, when the reference is not URL-shaped: the literal path,
//!    then the same name under each platform cache directory
//! 2. the inline base64 payload
//! 3. the remote URL, through the host's download helper first and a direct
//!    GET as fallback
//!
//! A reference that cannot be resolved is logged and skipped.

use std::path::{Path, PathBuf};

use crate::constants::IMAGE_FETCH_TIMEOUT;
use crate::host::{ImageRef, InboundMessage, UrlDownloader};

use super::{decode_base64, ImageCache};

impl ImageCache {
    /// Bytes of every resolvable image in the trigger, quoted images first
    pub async fn extract_images_from_trigger(
        &self,
        message: &InboundMessage,
        downloader: Option<&dyn UrlDownloader>,
    ) -> Vec<Vec<u8>> {
        let platform_dirs = self.config.load().platform_cache_dirs.clone();
        let mut images = Vec::new();
        for image in message.image_refs() {
            match self.load_image_ref(image, &platform_dirs, downloader).await {
                Some(data) => images.push(data),
                None => tracing::warn!(
                    file = ?image.file,
                    url = ?image.url,
                    "Could not resolve image reference, skipping"
                ),
            }
        }
        images
    }

    async fn load_image_ref(
        &self,
        image: &ImageRef,
        platform_dirs: &[PathBuf],
        downloader: Option<&dyn UrlDownloader>,
    ) -> Option<Vec<u8>> {
        if let Some(file) = image.file.as_deref().filter(|f| !is_url(f)) {
            if let Some(data) = read_local(file, platform_dirs).await {
                return Some(data);
            }
        }

        if let Some(b64) = image.base64.as_deref().filter(|b| !b.trim().is_empty()) {
            match decode_base64(b64) {
                Ok(data) => return Some(data),
                Err(e) => tracing::debug!(error = %e, "Inline image is not valid base64"),
            }
        }

        let url = image.url.as_deref().filter(|u| !u.is_empty())?;
        if let Some(helper) = downloader {
            if let Some(path) = helper.download(url).await {
                match tokio::fs::read(&path).await {
                    Ok(data) => return Some(data),
                    Err(e) => tracing::debug!(
                        file = %path.display(),
                        error = %e,
                        "Host download helper returned an unreadable file"
                    ),
                }
            }
        }

        match self.fetch_bytes(url, IMAGE_FETCH_TIMEOUT).await {
            Ok(data) => Some(data.to_vec()),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Direct image fetch failed");
                None
            }
        }
    }
}

fn is_url(reference: &str) -> bool {
    reference.starts_with("http")
}

async fn read_local(file: &str, platform_dirs: &[PathBuf]) -> Option<Vec<u8>> {
    let literal = Path::new(file);
    let candidates = std::iter::once(literal.to_path_buf())
        .chain(platform_dirs.iter().map(|dir| dir.join(file)));

    for candidate in candidates {
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            if let Ok(data) = tokio::fs::read(&candidate).await {
                return Some(data);
            }
        }
    }
    None
}

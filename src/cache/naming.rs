//! Image file naming.
//!
//! Saved images are named `<unix-seconds>_<8-hex>.<ext>`. The leading
//! timestamp doubles as the creation time used by the sweep.

use std::path::Path;

use crate::constants::IMAGE_EXTENSIONS;

/// New unique file name for an image created at `unix_secs`
pub fn unique_file_name(unix_secs: u64, extension: &str) -> String {
    let suffix: [u8; 4] = rand::random();
    format!("{}_{}.{}", unix_secs, hex::encode(suffix), extension)
}

/// Creation timestamp encoded in a file name, if any
///
/// Takes the part before the final `.` and parses everything up to the first
/// `_` as unix seconds.
pub fn parse_timestamp(file_name: &str) -> Option<u64> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => file_name,
    };
    stem.split('_').next()?.parse().ok()
}

/// True if `path` has a recognised image extension (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

//! Key images for the muted and live states, as `data:` URIs.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::StripmuteError;
use crate::error::Result;

/// Built-in 72x72 image shown while the strip is live.
pub const LIVE_PNG: &[u8] = include_bytes!("../assets/live.png");

/// Built-in 72x72 image shown while the strip is muted.
pub const MUTED_PNG: &[u8] = include_bytes!("../assets/muted.png");

/// Maximum size accepted for a custom icon file.
pub const MAX_ICON_BYTES: u64 = 256 * 1024;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Encode PNG bytes as a `data:image/png;base64,...` URI.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Pre-encoded images for both mute states.
#[derive(Debug, Clone, PartialEq)]
pub struct MuteIcons {
    muted: String,
    live: String,
}

impl Default for MuteIcons {
    fn default() -> Self {
        MuteIcons {
            muted: png_data_uri(MUTED_PNG),
            live: png_data_uri(LIVE_PNG),
        }
    }
}

impl MuteIcons {
    /// Load icons from the given paths. An empty path keeps the built-in image.
    pub fn load(muted_path: &str, live_path: &str) -> Result<Self> {
        let defaults = Self::default();
        Ok(MuteIcons {
            muted: load_or(muted_path, defaults.muted)?,
            live: load_or(live_path, defaults.live)?,
        })
    }

    pub fn muted(&self) -> &str {
        &self.muted
    }

    pub fn live(&self) -> &str {
        &self.live
    }

    pub fn for_state(&self, muted: bool) -> &str {
        if muted { &self.muted } else { &self.live }
    }
}

fn load_or(path: &str, fallback: String) -> Result<String> {
    let path = path.trim();
    if path.is_empty() {
        return Ok(fallback);
    }
    let bytes = read_png(Path::new(path))?;
    Ok(png_data_uri(&bytes))
}

/// Read a custom icon, checking size and PNG signature.
pub fn read_png(path: &Path) -> Result<Vec<u8>> {
    let meta = std::fs::metadata(path)
        .map_err(|e| StripmuteError::Icon(format!("{}: {e}", path.display())))?;
    if meta.len() > MAX_ICON_BYTES {
        return Err(StripmuteError::Icon(format!(
            "{}: file too large: {} bytes (max {MAX_ICON_BYTES})",
            path.display(),
            meta.len()
        )));
    }
    let bytes = std::fs::read(path)?;
    if !bytes.starts_with(PNG_SIGNATURE) {
        return Err(StripmuteError::Icon(format!(
            "{}: not a PNG file",
            path.display()
        )));
    }
    Ok(bytes)
}

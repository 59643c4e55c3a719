//! Loading source textures and writing the packed mask map to disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use image::{ImageFormat, ImageReader, RgbaImage};
use tracing::debug;

use crate::compositor::ImageSource;

/// Decodes a texture as raw channel data (no sRGB decoding).
pub fn load_source(path: &Path) -> Result<ImageSource> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("failed to open texture at {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to guess format of {}", path.display()))?;
    let image = reader
        .decode()
        .with_context(|| format!("failed to decode texture at {}", path.display()))?;
    debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "loaded texture"
    );
    Ok(ImageSource::from_dynamic(&image))
}

/// Encodes `mask` as PNG at `path`, creating parent directories.
pub fn save_png(mask: &RgbaImage, path: &Path, overwrite: bool) -> Result<()> {
    ensure!(
        overwrite || !path.exists(),
        "{} already exists; pass --force or set overwrite: true to replace it",
        path.display()
    );
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    mask.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write mask map to {}", path.display()))?;
    Ok(())
}

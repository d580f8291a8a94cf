use std::path::Path;

use crate::errors::{VisualAgentError, VisualAgentResult};

/// Captures the primary monitor to `path` as PNG.
pub fn capture_primary(path: &Path) -> VisualAgentResult<()> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| VisualAgentError::Perception(format!("monitor enumeration failed: {e}")))?;
    let monitor = monitors
        .into_iter()
        .find(|m| m.is_primary())
        .ok_or_else(|| VisualAgentError::Perception("no primary monitor available".into()))?;
    let image = monitor
        .capture_image()
        .map_err(|e| VisualAgentError::Perception(format!("screen capture failed: {e}")))?;
    image.save(path)?;
    Ok(())
}

/// Writes the gray placeholder image used instead of a real capture in
/// dry runs.
pub fn write_placeholder(path: &Path) -> VisualAgentResult<()> {
    let img = image::RgbImage::from_pixel(200, 100, image::Rgb([128, 128, 128]));
    img.save(path)?;
    Ok(())
}

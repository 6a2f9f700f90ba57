use std::io::Cursor;

use base64::Engine as _;
use image::{DynamicImage, ImageFormat, RgbaImage};
use xcap::Monitor;

use crate::errors::{AgentError, AgentResult};
use crate::perception::types::ScreenshotMeta;

pub struct ScreenshotResult {
    pub image_bytes: Vec<u8>,
    pub meta: ScreenshotMeta,
}

/// Captures the primary monitor as PNG.
pub async fn capture_primary() -> AgentResult<ScreenshotResult> {
    tokio::task::spawn_blocking(capture_blocking)
        .await
        .map_err(|e| AgentError::Perception(format!("capture task failed: {e}")))?
}

fn capture_blocking() -> AgentResult<ScreenshotResult> {
    let monitors =
        Monitor::all().map_err(|e| AgentError::Perception(format!("failed to list monitors: {e}")))?;
    let monitor = monitors
        .iter()
        .find(|m| m.is_primary())
        .or_else(|| monitors.first())
        .ok_or_else(|| AgentError::Perception("no monitors found".into()))?;

    let image = monitor
        .capture_image()
        .map_err(|e| AgentError::Perception(format!("screen capture failed: {e}")))?;
    let meta = ScreenshotMeta {
        width: image.width(),
        height: image.height(),
        scale_factor: monitor.scale_factor() as f64,
    };
    let image_bytes = encode_png(image)?;
    tracing::debug!(
        width = meta.width,
        height = meta.height,
        bytes = image_bytes.len(),
        "screenshot captured"
    );
    Ok(ScreenshotResult { image_bytes, meta })
}

pub fn encode_png(image: RgbaImage) -> AgentResult<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AgentError::Perception(format!("failed to encode screenshot: {e}")))?;
    Ok(bytes)
}

/// Accepts plain base64 or a `data:image/...;base64,` URI.
pub fn decode_base64_image(encoded: &str) -> AgentResult<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AgentError::Validation(format!("screenshot is not valid base64: {e}")))
}

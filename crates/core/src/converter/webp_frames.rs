//! Animated WebP decoding into raw RGBA frames for the transcode engine.

use image::codecs::webp::WebPDecoder;
use image::AnimationDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use super::error::ConvertError;
use super::types::RawFrames;

/// Frame rate used when the file carries no usable frame delays.
const FALLBACK_FPS: f64 = 10.0;

/// Decodes every frame of an animated WebP, composited to full canvas size.
pub fn decode_webp_frames(path: &Path) -> Result<RawFrames, ConvertError> {
    let reader = BufReader::new(File::open(path)?);
    let decoder = WebPDecoder::new(reader).map_err(ConvertError::decode)?;

    let mut width = 0;
    let mut height = 0;
    let mut total_delay_ms = 0.0;
    let mut frames = Vec::new();

    for frame in decoder.into_frames() {
        let frame = frame.map_err(ConvertError::decode)?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        if denom > 0 {
            total_delay_ms += f64::from(numer) / f64::from(denom);
        }
        let buffer = frame.into_buffer();
        if frames.is_empty() {
            width = buffer.width();
            height = buffer.height();
        } else if (buffer.width(), buffer.height()) != (width, height) {
            return Err(ConvertError::decode("frame size changed mid-animation"));
        }
        frames.push(buffer.into_raw());
    }

    if frames.is_empty() {
        return Err(ConvertError::decode("no frames in animation"));
    }

    Ok(RawFrames {
        width,
        height,
        fps: frame_rate(frames.len(), total_delay_ms),
        frames: Arc::new(frames),
    })
}

/// Average frame rate, rounded to two decimals.
fn frame_rate(frame_count: usize, total_delay_ms: f64) -> f64 {
    if total_delay_ms <= 0.0 {
        return FALLBACK_FPS;
    }
    let fps = frame_count as f64 * 1000.0 / total_delay_ms;
    (fps * 100.0).round() / 100.0
}

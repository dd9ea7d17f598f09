//! Media inspection: dimensions, duration, and whether an input is animated.

mod ffprobe;
mod sniff;

pub use ffprobe::{parse_probe_output, FfprobeProbe};
pub use sniff::{is_static_only, png_file_animated, webp_file_animated, webp_header_animated};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::converter::ConvertError;

/// Facts about the first video stream of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    /// Seconds, when the container reports one.
    pub duration: Option<f64>,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub pixel_format: Option<String>,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConvertError>;

    /// Never fails: detection problems count as "not animated".
    async fn is_animated(&self, path: &Path) -> bool;
}

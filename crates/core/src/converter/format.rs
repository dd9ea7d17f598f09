//! Format names, aliases and capability tables.
//!
//! Two alias tables exist. [`handler_family`] collapses every video
//! container into `video` and every HEIF spelling into `heic`, which is what
//! handler selection and the direct-copy check care about. [`builder_format`]
//! only folds the JPEG and TIFF spellings, which is what argument synthesis
//! cares about.

use std::path::Path;

/// Input extensions the engine accepts, besides video containers.
pub const SUPPORTED_INPUT_FORMATS: &[&str] = &[
    "bmp", "exr", "gif", "hdr", "heic", "heif", "hif", "ico", "jpeg", "jpg", "jfif", "png", "svg",
    "tga", "tif", "tiff", "webp", "avif", "insp", "jxl", "jpe",
];

/// Video container extensions routed to the video handler.
pub const VIDEO_FORMATS: &[&str] = &["mp4", "webm", "mov", "m4v", "mkv"];

/// Sentinel output format meaning "same as input".
pub const ORIGINAL_FORMAT: &str = "original";

const ANIMATION_CAPABLE_OUTPUTS: &[&str] = &["webp", "gif", "png", "mp4", "webm"];

const OPAQUE_OUTPUTS: &[&str] = &["jpg", "jpeg", "jpe", "jfif", "bmp", "tiff", "tif"];

const ALPHA_CAPABLE_INPUTS: &[&str] = &[
    "png", "svg", "webp", "gif", "ico", "tga", "exr", "jxl", "dds", "tiff", "tif",
];

/// Lowercased extension of `path` without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Resolves an extension to the handler family that owns it.
pub fn handler_family(ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    let family = match ext.as_str() {
        "jpeg" | "jpe" | "jfif" => "jpg",
        "tif" => "tiff",
        "heif" | "hif" => "heic",
        e if VIDEO_FORMATS.contains(&e) => "video",
        other => other,
    };
    family.to_string()
}

/// Resolves an output format to the argument builder that produces it.
pub fn builder_format(format: &str) -> String {
    let format = format.to_ascii_lowercase();
    match format.as_str() {
        "jpeg" | "jpe" | "jfif" => "jpg".to_string(),
        "tif" => "tiff".to_string(),
        _ => format,
    }
}

pub fn is_format_supported(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_INPUT_FORMATS.contains(&ext.as_str()) || VIDEO_FORMATS.contains(&ext.as_str())
}

pub fn is_video_format(ext: &str) -> bool {
    handler_family(ext) == "video"
}

/// Whether the output format can hold more than one frame.
pub fn is_animation_capable(format: &str) -> bool {
    ANIMATION_CAPABLE_OUTPUTS.contains(&format.to_ascii_lowercase().as_str())
}

/// Whether the output format cannot represent an alpha channel.
pub fn is_opaque_output(format: &str) -> bool {
    OPAQUE_OUTPUTS.contains(&format.to_ascii_lowercase().as_str())
}

/// Whether an input with this extension may carry transparency.
pub fn may_carry_alpha(ext: &str) -> bool {
    ALPHA_CAPABLE_INPUTS.contains(&ext.to_ascii_lowercase().as_str())
}

/// Whether two format names denote the same format once aliases are applied.
///
/// Video containers only match themselves: `mp4` and `webm` share a handler
/// but not a byte layout.
pub fn same_format(a: &str, b: &str) -> bool {
    let (a, b) = (a.to_ascii_lowercase(), b.to_ascii_lowercase());
    if a == b {
        return true;
    }
    if is_video_format(&a) || is_video_format(&b) {
        return false;
    }
    handler_family(&a) == handler_family(&b)
}

//! Quality curves. Every function takes the caller's 1-100 quality (higher is
//! better) and returns the encoder's native setting (lower is better, except
//! for the GIF palette size).

fn scaled(quality: u8) -> f64 {
    f64::from(quality.clamp(1, 100)) / 100.0
}

/// `-q:v` for mjpeg-style encoders, on the 2-31 scale.
pub fn image_qscale(quality: u8) -> u32 {
    (31.0 - scaled(quality) * 29.0).round() as u32
}

/// libaom `-crf`, 0-63.
pub fn avif_crf(quality: u8) -> u32 {
    (63.0 - scaled(quality) * 63.0).round() as u32
}

/// x264/x265 `-crf`, 0-28.
pub fn mp4_crf(quality: u8) -> u32 {
    (28.0 - scaled(quality) * 28.0).round() as u32
}

/// libvpx `-crf`, 4-63.
pub fn webm_crf(quality: u8) -> u32 {
    (63.0 - scaled(quality) * 59.0).round() as u32
}

/// `palettegen=max_colors`, at least 2.
pub fn gif_palette_colors(quality: u8) -> u32 {
    ((scaled(quality) * 256.0).round() as u32).clamp(2, 256)
}

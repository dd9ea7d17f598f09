//! Container header checks that answer "is this animated?" without
//! decoding.

use std::io::SeekFrom;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const WEBP_ANIMATION_FLAG: u8 = 0x02;

/// Extensions that never hold more than one frame here.
const STATIC_ONLY: &[&str] = &[
    "jpg", "jpeg", "jpe", "jfif", "bmp", "tiff", "tif", "ico", "tga", "exr", "hdr", "dds", "svg",
    "jxl", "insp", "avif", "heic", "heif", "hif",
];

pub fn is_static_only(ext: &str) -> bool {
    STATIC_ONLY.contains(&ext.to_ascii_lowercase().as_str())
}

/// Reads the VP8X animation flag. `None` if the bytes are not a WebP header.
pub fn webp_header_animated(header: &[u8]) -> Option<bool> {
    if header.len() < 12 || &header[0..4] != b"RIFF" || &header[8..12] != b"WEBP" {
        return None;
    }
    if header.len() < 21 || &header[12..16] != b"VP8X" {
        // Simple lossy/lossless files cannot be animated.
        return Some(false);
    }
    Some(header[20] & WEBP_ANIMATION_FLAG != 0)
}

pub async fn webp_file_animated(path: &Path) -> std::io::Result<Option<bool>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = Vec::with_capacity(32);
    (&mut file).take(32).read_to_end(&mut header).await?;
    Ok(webp_header_animated(&header))
}

/// Walks PNG chunks until `acTL` (animated) or `IDAT` (static).
/// `None` if the file is not a PNG.
pub async fn png_file_animated(path: &Path) -> std::io::Result<Option<bool>> {
    let mut file = tokio::fs::File::open(path).await?;

    let mut signature = [0u8; 8];
    file.read_exact(&mut signature).await?;
    if signature != PNG_SIGNATURE {
        return Ok(None);
    }

    let mut chunk = [0u8; 8];
    loop {
        match file.read_exact(&mut chunk).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(Some(false)),
            Err(e) => return Err(e),
        }
        let length = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        match &chunk[4..8] {
            b"acTL" => return Ok(Some(true)),
            b"IDAT" | b"IEND" => return Ok(Some(false)),
            _ => {}
        }
        // Data plus CRC.
        file.seek(SeekFrom::Current(i64::from(length) + 4)).await?;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A PNG skeleton: signature, IHDR, optional acTL, IDAT, IEND. Chunk
    /// CRCs are zeroed, which the sniffer never checks.
    pub fn png_bytes(animated: bool) -> Vec<u8> {
        let mut bytes = super::PNG_SIGNATURE.to_vec();
        let mut push_chunk = |kind: &[u8; 4], data: &[u8]| {
            bytes.extend_from_slice(&(data.len() as u32).to_be_bytes());
            bytes.extend_from_slice(kind);
            bytes.extend_from_slice(data);
            bytes.extend_from_slice(&[0, 0, 0, 0]);
        };
        push_chunk(b"IHDR", &[0u8; 13]);
        if animated {
            push_chunk(b"acTL", &[0, 0, 0, 2, 0, 0, 0, 0]);
        }
        push_chunk(b"IDAT", &[0u8; 4]);
        push_chunk(b"IEND", &[]);
        bytes
    }

    pub fn webp_bytes(animated: bool) -> Vec<u8> {
        let mut bytes = b"RIFF\0\0\0\0WEBPVP8X".to_vec();
        bytes.extend_from_slice(&[10, 0, 0, 0]);
        bytes.push(if animated { 0x12 } else { 0x10 });
        bytes.extend_from_slice(&[0u8; 9]);
        bytes
    }
}

//! In-process pixel work on top of the `image` crate: decode, resize per a
//! [`SizePolicy`], flatten, encode. All functions here are blocking; async
//! callers go through [`run_blocking`].

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::error::ConvertError;
use super::format::builder_format;
use super::types::SizePolicy;

/// JPEG quality when the caller gives none.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Outputs this module can encode.
const ENCODABLE: &[&str] = &["jpg", "png", "webp", "bmp", "tiff", "tga", "gif"];

pub fn can_encode(format: &str) -> bool {
    ENCODABLE.contains(&builder_format(format).as_str())
}

/// Runs blocking pixel work off the async runtime.
pub async fn run_blocking<T, F>(f: F) -> Result<T, ConvertError>
where
    F: FnOnce() -> Result<T, ConvertError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConvertError::Io(std::io::Error::other(e)))?
}

/// Unique path for an intermediate file.
pub fn temp_file(temp_dir: &Path, ext: &str) -> PathBuf {
    temp_dir.join(format!("{}.{}", Uuid::new_v4(), ext))
}

pub fn decode(path: &Path) -> Result<DynamicImage, ConvertError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(ConvertError::decode)
}

/// Resizes per the policy; a no-op when the dimensions already match.
pub fn apply_size(img: DynamicImage, size: &SizePolicy) -> DynamicImage {
    let (width, height) = size.resolve(img.width(), img.height());
    if (width, height) == (img.width(), img.height()) {
        return img;
    }
    img.resize_exact(width, height, FilterType::Lanczos3)
}

/// Composites onto opaque white.
pub fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, p) in rgba.enumerate_pixels() {
        let alpha = u32::from(p[3]);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(p[0]), blend(p[1]), blend(p[2])]));
    }
    out
}

/// Encodes `img` as `format` into `path`.
pub fn encode(img: &DynamicImage, format: &str, quality: Option<u8>, path: &Path) -> Result<(), ConvertError> {
    let format = builder_format(format);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);

    match format.as_str() {
        "jpg" => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY).clamp(1, 100);
            let rgb = flatten_on_white(img);
            JpegEncoder::new_with_quality(&mut writer, quality)
                .encode_image(&rgb)
                .map_err(ConvertError::encode)
        }
        // No alpha in BMP output either.
        "bmp" => DynamicImage::ImageRgb8(flatten_on_white(img))
            .write_to(&mut writer, ImageFormat::Bmp)
            .map_err(ConvertError::encode),
        other => {
            let image_format = match other {
                "png" => ImageFormat::Png,
                "webp" => ImageFormat::WebP,
                "tiff" => ImageFormat::Tiff,
                "tga" => ImageFormat::Tga,
                "gif" => ImageFormat::Gif,
                _ => return Err(ConvertError::encode(format!("cannot encode {}", other))),
            };
            // The WebP encoder is lossless-only and wants 8-bit RGB(A).
            let img = if image_format == ImageFormat::WebP {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                img.clone()
            };
            img.write_to(&mut writer, image_format)
                .map_err(ConvertError::encode)
        }
    }
}

/// Decode, resize, encode.
pub fn transform_file(
    source: &Path,
    size: &SizePolicy,
    format: &str,
    quality: Option<u8>,
    output: &Path,
) -> Result<(), ConvertError> {
    let img = apply_size(decode(source)?, size);
    encode(&img, format, quality, output)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::path::Path;

    /// Writes a half-transparent RGBA PNG.
    pub fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 128]));
        DynamicImage::ImageRgba8(img).save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_png;
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn test_flatten_on_white() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0])));
        assert_eq!(flatten_on_white(&img).get_pixel(0, 0), &Rgb([255, 255, 255]));

        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 255])));
        assert_eq!(flatten_on_white(&img).get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_apply_size() {
        let img = DynamicImage::new_rgba8(400, 200);
        let resized = apply_size(img, &SizePolicy::MaxSide(100));
        assert_eq!((resized.width(), resized.height()), (100, 50));

        let img = DynamicImage::new_rgba8(40, 20);
        let same = apply_size(img, &SizePolicy::MaxWidth(100));
        assert_eq!((same.width(), same.height()), (40, 20));
    }

    #[test]
    fn test_transform_png_to_jpg() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.png");
        let out = dir.path().join("nested/out.jpg");
        write_png(&src, 64, 32);

        transform_file(&src, &SizePolicy::MaxWidth(16), "jpg", Some(80), &out).unwrap();
        let decoded = image::open(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_encode_rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let img = DynamicImage::new_rgba8(2, 2);
        let err = encode(&img, "psd", None, &dir.path().join("x.psd")).unwrap_err();
        assert!(matches!(err, ConvertError::Encode { .. }));
    }

    #[test]
    fn test_can_encode_aliases() {
        assert!(can_encode("jpeg"));
        assert!(can_encode("tif"));
        assert!(!can_encode("avif"));
        assert!(!can_encode("ico"));
    }
}

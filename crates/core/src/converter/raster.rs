//! In-process raster backend for the common still formats.

use async_trait::async_trait;

use super::config::ConverterConfig;
use super::error::ConvertError;
use super::format::builder_format;
use super::imaging::{run_blocking, transform_file};
use super::traits::{BackendKind, ConverterBackend};
use super::types::{ConversionContext, ConversionRequest, ConvertOutput};
use super::validate::validate_output_file;

/// Inputs the `image` crate decodes.
const RASTER_INPUTS: &[&str] = &[
    "png", "jpg", "jpeg", "jpe", "jfif", "gif", "webp", "bmp", "tiff", "tif", "ico", "tga", "exr",
    "hdr", "dds",
];

const RASTER_OUTPUTS: &[&str] = &["jpg", "png", "webp"];

/// Decodes with the `image` crate, resizes, and encodes jpg, png or webp.
pub struct RasterBackend {
    config: ConverterConfig,
}

impl RasterBackend {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConverterBackend for RasterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Raster
    }

    fn can_handle(&self, ctx: &ConversionContext) -> bool {
        // Animation and lossy WebP are the transcode backend's job.
        !ctx.output.want_animated
            && !ctx.output.is_lossy_webp()
            && RASTER_INPUTS.contains(&ctx.input.ext.as_str())
            && self.supports_output(&ctx.output.ext)
    }

    fn supports_output(&self, format: &str) -> bool {
        RASTER_OUTPUTS.contains(&builder_format(format).as_str())
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        request.validate()?;
        if !self.can_handle(&request.context) {
            return Err(ConvertError::unsupported(
                &request.context.input.ext,
                &request.spec.format,
            ));
        }
        if request.cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let source = request.source.clone();
        let output_path = request.output_path();
        let size = request.spec.size;
        let format = request.spec.format.clone();
        let quality = request.spec.quality;
        let target = output_path.clone();
        run_blocking(move || transform_file(&source, &size, &format, quality, &target)).await?;

        if request.cancel.is_cancelled() {
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(ConvertError::Cancelled);
        }

        validate_output_file(
            &output_path,
            self.config.output_min_size_bytes,
            self.config.output_wait_timeout(),
        )
        .await?;
        request.progress.report(100.0);

        Ok(ConvertOutput {
            output_path,
            backend: BackendKind::Raster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::imaging::fixtures::write_png;
    use crate::converter::types::{SizePolicy, TargetSpec};
    use tempfile::TempDir;

    fn request(dir: &TempDir, format: &str) -> ConversionRequest {
        let src = dir.path().join("in.png");
        write_png(&src, 40, 20);
        ConversionRequest::new(
            src,
            dir.path().join("out"),
            TargetSpec::new(format, "result").with_size(SizePolicy::MaxWidth(20)),
            ConversionContext::new("png", format, false),
        )
    }

    #[tokio::test]
    async fn test_png_to_webp() {
        let dir = TempDir::new().unwrap();
        let backend = RasterBackend::new(ConverterConfig::default());
        let output = backend.convert(&request(&dir, "webp")).await.unwrap();

        assert_eq!(output.backend, BackendKind::Raster);
        let img = image::open(&output.output_path).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_rejects_other_outputs() {
        let dir = TempDir::new().unwrap();
        let backend = RasterBackend::new(ConverterConfig::default());
        assert!(!backend.supports_output("avif"));
        assert!(backend.supports_output("jpeg"));

        let err = backend.convert(&request(&dir, "tiff")).await.unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let backend = RasterBackend::new(ConverterConfig::default());
        let request = request(&dir, "jpg");
        request.cancel.cancel();

        let err = backend.convert(&request).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_animated_output_not_handled() {
        let backend = RasterBackend::new(ConverterConfig::default());
        assert!(!backend.can_handle(&ConversionContext::new("gif", "webp", true)));
        assert!(backend.can_handle(&ConversionContext::new("gif", "webp", false)));
        assert!(!backend.can_handle(&ConversionContext::new("heic", "jpg", false)));
    }

    #[tokio::test]
    async fn test_webp_with_quality_left_to_engine() {
        let dir = TempDir::new().unwrap();
        let backend = RasterBackend::new(ConverterConfig::default());
        assert!(!backend.can_handle(&ConversionContext::new("png", "webp", false).with_quality(Some(60))));
        assert!(backend.can_handle(&ConversionContext::new("png", "jpg", false).with_quality(Some(60))));

        let mut request = request(&dir, "webp");
        request.spec = request.spec.clone().with_quality(60);
        request.context = request.context.clone().with_quality(Some(60));
        let err = backend.convert(&request).await.unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
    }
}

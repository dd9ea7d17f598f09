//! SVG rendering through `rsvg-convert`.
//!
//! The SVG is rendered to PNG on stdout at its natural size first. When the
//! size policy changes the dimensions it is rendered again at the target
//! size, so scaling happens in vector space rather than on pixels.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::config::ConverterConfig;
use super::error::ConvertError;
use super::format::builder_format;
use super::imaging::{encode, run_blocking};
use super::traits::{BackendKind, ConverterBackend};
use super::types::{ConversionContext, ConversionRequest, ConvertOutput};
use super::validate::validate_output_file;
use crate::process::{ProcessRegistry, ProcessSpec};

const VECTOR_OUTPUTS: &[&str] = &["png", "jpg", "webp"];

pub struct VectorBackend {
    rsvg_convert_path: PathBuf,
    config: ConverterConfig,
    registry: ProcessRegistry,
}

impl VectorBackend {
    pub fn new(rsvg_convert_path: impl Into<PathBuf>, config: ConverterConfig, registry: ProcessRegistry) -> Self {
        Self {
            rsvg_convert_path: rsvg_convert_path.into(),
            config,
            registry,
        }
    }

    async fn render(
        &self,
        request: &ConversionRequest,
        size: Option<(u32, u32)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ConvertError> {
        let mut args = vec!["-f".to_string(), "png".to_string()];
        if let Some((width, height)) = size {
            args.extend([
                "-w".to_string(),
                width.to_string(),
                "-h".to_string(),
                height.to_string(),
            ]);
        }
        args.push(request.source.to_string_lossy().into_owned());

        let spec = ProcessSpec::new(&self.rsvg_convert_path)
            .args(args)
            .capture_stdout();
        let exit = self.registry.run_tool("rsvg-convert", spec, cancel).await?;
        if exit.stdout.is_empty() {
            return Err(ConvertError::decode("rsvg-convert produced no output"));
        }
        Ok(exit.stdout)
    }
}

#[async_trait]
impl ConverterBackend for VectorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vector
    }

    fn can_handle(&self, ctx: &ConversionContext) -> bool {
        ctx.input.ext == "svg" && self.supports_output(&ctx.output.ext)
    }

    fn supports_output(&self, format: &str) -> bool {
        VECTOR_OUTPUTS.contains(&builder_format(format).as_str())
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        request.validate()?;
        if !self.can_handle(&request.context) {
            return Err(ConvertError::unsupported(
                &request.context.input.ext,
                &request.spec.format,
            ));
        }

        let natural = self.render(request, None, &request.cancel).await?;
        let size = request.spec.size;
        let (natural, iw, ih) = run_blocking(move || {
            let img = image::load_from_memory(&natural).map_err(ConvertError::decode)?;
            let (w, h) = (img.width(), img.height());
            Ok((img, w, h))
        })
        .await?;
        request.progress.report(50.0);

        let target = size.resolve(iw, ih);
        let img = if target == (iw, ih) {
            natural
        } else {
            let bytes = self.render(request, Some(target), &request.cancel).await?;
            run_blocking(move || image::load_from_memory(&bytes).map_err(ConvertError::decode)).await?
        };

        let output_path = request.output_path();
        let format = request.spec.format.clone();
        let quality = request.spec.quality;
        let path = output_path.clone();
        run_blocking(move || encode(&img, &format, quality, &path)).await?;

        validate_output_file(
            &output_path,
            self.config.output_min_size_bytes,
            self.config.output_wait_timeout(),
        )
        .await?;
        request.progress.report(100.0);

        Ok(ConvertOutput {
            output_path,
            backend: BackendKind::Vector,
        })
    }
}

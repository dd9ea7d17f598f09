//! HEIC/HEIF decoding through the platform tools.
//!
//! `sips` is tried first on macOS, `heif-convert` everywhere else and as the
//! macOS fallback. Both decode to a PNG in the temp directory, which is then
//! resized and encoded in-process.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::capabilities::HostOs;
use super::config::{ConverterConfig, ToolPaths};
use super::error::ConvertError;
use super::format::handler_family;
use super::imaging::{can_encode, run_blocking, temp_file, transform_file};
use super::traits::{BackendKind, ConverterBackend};
use super::types::{ConversionContext, ConversionRequest, ConvertOutput};
use super::validate::validate_output_file;
use crate::process::{ProcessRegistry, ProcessSpec};

pub struct HeicBackend {
    sips_path: PathBuf,
    heif_convert_path: PathBuf,
    config: ConverterConfig,
    registry: ProcessRegistry,
    os: HostOs,
}

impl HeicBackend {
    pub fn new(tools: &ToolPaths, config: ConverterConfig, registry: ProcessRegistry) -> Self {
        Self {
            sips_path: tools.sips_path.clone(),
            heif_convert_path: tools.heif_convert_path.clone(),
            config,
            registry,
            os: HostOs::current(),
        }
    }

    /// Overrides the detected OS, which decides whether `sips` is tried.
    pub fn with_os(mut self, os: HostOs) -> Self {
        self.os = os;
        self
    }

    async fn decode_to_png(&self, request: &ConversionRequest, png: &Path) -> Result<(), ConvertError> {
        let source = request.source.to_string_lossy().into_owned();
        let target = png.to_string_lossy().into_owned();

        if self.os == HostOs::MacOs {
            let spec = ProcessSpec::new(&self.sips_path).args([
                "-s",
                "format",
                "png",
                source.as_str(),
                "--out",
                target.as_str(),
            ]);
            match self.registry.run_tool("sips", spec, &request.cancel).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => warn!(error = %e, "sips failed, falling back to heif-convert"),
            }
        }

        let spec = ProcessSpec::new(&self.heif_convert_path).args([source, target]);
        self.registry
            .run_tool("heif-convert", spec, &request.cancel)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ConverterBackend for HeicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Heic
    }

    fn can_handle(&self, ctx: &ConversionContext) -> bool {
        handler_family(&ctx.input.ext) == "heic" && self.supports_output(&ctx.output.ext)
    }

    fn supports_output(&self, format: &str) -> bool {
        handler_family(format) != "heic" && can_encode(format)
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        request.validate()?;
        if handler_family(&request.spec.format) == "heic" {
            return Err(ConvertError::OutputFormatDisabled {
                format: request.spec.format.clone(),
            });
        }
        if !self.can_handle(&request.context) {
            return Err(ConvertError::unsupported(
                &request.context.input.ext,
                &request.spec.format,
            ));
        }

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        tokio::fs::create_dir_all(&request.dest_dir).await?;
        let png = temp_file(&self.config.temp_dir, "png");
        let output_path = request.output_path();

        let result = async {
            self.decode_to_png(request, &png).await?;
            request.progress.report(50.0);

            if request.spec.format == "png" && request.spec.size.is_original() {
                tokio::fs::copy(&png, &output_path).await?;
            } else {
                let (source, target) = (png.clone(), output_path.clone());
                let size = request.spec.size;
                let format = request.spec.format.clone();
                let quality = request.spec.quality;
                run_blocking(move || transform_file(&source, &size, &format, quality, &target)).await?;
            }
            Ok::<_, ConvertError>(())
        }
        .await;

        if let Err(e) = tokio::fs::remove_file(&png).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %png.display(), error = %e, "Failed to remove intermediate file");
            }
        }
        result?;

        validate_output_file(
            &output_path,
            self.config.output_min_size_bytes,
            self.config.output_wait_timeout(),
        )
        .await?;
        debug!(output = %output_path.display(), "HEIC decoded");
        request.progress.report(100.0);

        Ok(ConvertOutput {
            output_path,
            backend: BackendKind::Heic,
        })
    }
}

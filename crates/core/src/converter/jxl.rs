//! JPEG XL decoding through `djxl`. Only ever produces PNG.

use async_trait::async_trait;
use std::path::PathBuf;

use super::config::ConverterConfig;
use super::error::ConvertError;
use super::imaging::{apply_size, decode, encode, run_blocking};
use super::traits::{BackendKind, ConverterBackend};
use super::types::{ConversionContext, ConversionRequest, ConvertOutput};
use super::validate::validate_output_file;
use crate::process::{ProcessRegistry, ProcessSpec};

pub struct JxlBackend {
    djxl_path: PathBuf,
    config: ConverterConfig,
    registry: ProcessRegistry,
}

impl JxlBackend {
    pub fn new(djxl_path: impl Into<PathBuf>, config: ConverterConfig, registry: ProcessRegistry) -> Self {
        Self {
            djxl_path: djxl_path.into(),
            config,
            registry,
        }
    }
}

#[async_trait]
impl ConverterBackend for JxlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Jxl
    }

    fn can_handle(&self, ctx: &ConversionContext) -> bool {
        ctx.input.ext == "jxl" && self.supports_output(&ctx.output.ext)
    }

    fn supports_output(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("png")
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        request.validate()?;
        if !self.can_handle(&request.context) {
            return Err(ConvertError::unsupported(
                &request.context.input.ext,
                &request.spec.format,
            ));
        }

        tokio::fs::create_dir_all(&request.dest_dir).await?;
        let output_path = request.output_path();
        let spec = ProcessSpec::new(&self.djxl_path).args([
            request.source.to_string_lossy().into_owned(),
            output_path.to_string_lossy().into_owned(),
        ]);
        self.registry.run_tool("djxl", spec, &request.cancel).await?;

        if !request.spec.size.is_original() {
            request.progress.report(50.0);
            let path = output_path.clone();
            let size = request.spec.size;
            run_blocking(move || {
                let img = apply_size(decode(&path)?, &size);
                encode(&img, "png", None, &path)
            })
            .await?;
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
            backend: BackendKind::Jxl,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::converter::imaging::fixtures::write_png;
    use crate::converter::types::{SizePolicy, TargetSpec};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_djxl(dir: &TempDir) -> PathBuf {
        let fixture = dir.path().join("decoded.png");
        write_png(&fixture, 64, 32);
        let script = dir.path().join("djxl");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncp '{}' \"$2\"\n", fixture.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn request(dir: &TempDir, spec: TargetSpec) -> ConversionRequest {
        let context = ConversionContext::new("jxl", &spec.format, false);
        ConversionRequest::new(dir.path().join("in.jxl"), dir.path().join("out"), spec, context)
    }

    #[tokio::test]
    async fn test_decodes_with_size() {
        let dir = TempDir::new().unwrap();
        let backend = JxlBackend::new(fake_djxl(&dir), ConverterConfig::default(), ProcessRegistry::new());
        let spec = TargetSpec::new("png", "in").with_size(SizePolicy::MaxSide(16));

        let output = backend.convert(&request(&dir, spec)).await.unwrap();
        let img = image::open(&output.output_path).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
    }

    #[tokio::test]
    async fn test_only_png_output() {
        let dir = TempDir::new().unwrap();
        let backend = JxlBackend::new(fake_djxl(&dir), ConverterConfig::default(), ProcessRegistry::new());

        let err = backend
            .convert(&request(&dir, TargetSpec::new("jpg", "in")))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_decoder_failure() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("djxl");
        std::fs::write(&script, "#!/bin/sh\necho 'bad codestream' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let backend = JxlBackend::new(script, ConverterConfig::default(), ProcessRegistry::new());

        let err = backend
            .convert(&request(&dir, TargetSpec::new("png", "in")))
            .await
            .unwrap_err();
        match err {
            ConvertError::ExternalToolFailure { tool, code, stderr } => {
                assert_eq!(tool, "djxl");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad codestream");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

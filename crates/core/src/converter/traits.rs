//! Trait definitions for the converter module.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::error::ConvertError;
use super::types::{ConversionContext, ConversionRequest, ConvertOutput};

/// The closed set of converter backends a plan can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// External transcoding engine (ffmpeg).
    Transcode,
    /// In-process raster codec.
    Raster,
    /// SVG renderer.
    Vector,
    /// HEIC/HEIF decoder.
    Heic,
    /// JPEG XL decoder.
    Jxl,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::Raster => "raster",
            Self::Vector => "vector",
            Self::Heic => "heic",
            Self::Jxl => "jxl",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asks an in-flight conversion to stop. Errors are reported, never raised.
pub type TerminateFn = Box<dyn FnOnce() -> Result<(), ConvertError> + Send + 'static>;

/// A conversion already started, paired with a way to stop it.
pub struct CancellableConversion {
    pub outcome: BoxFuture<'static, Result<ConvertOutput, ConvertError>>,
    pub terminate: TerminateFn,
}

impl fmt::Debug for CancellableConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableConversion").finish_non_exhaustive()
    }
}

/// A converter implementation with the uniform `convert` contract.
#[async_trait]
pub trait ConverterBackend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Capability predicate. Plans skip a backend that returns false.
    fn can_handle(&self, _ctx: &ConversionContext) -> bool {
        true
    }

    /// Whether the backend writes this output format itself.
    fn supports_output(&self, _format: &str) -> bool {
        true
    }

    /// Converts `request.source` into `request.output_path()`.
    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError>;

    /// Starts a conversion and hands back a terminate handle.
    ///
    /// Terminating cancels `request.cancel`; backends that spawn processes
    /// watch that token and stop their process gracefully.
    fn convert_cancellable(self: Arc<Self>, request: ConversionRequest) -> CancellableConversion {
        let token = request.cancel.clone();
        let outcome = async move { self.convert(&request).await }.boxed();
        CancellableConversion {
            outcome,
            terminate: Box::new(move || {
                token.cancel();
                Ok(())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TargetSpec;
    use std::path::PathBuf;

    struct EchoBackend;

    #[async_trait]
    impl ConverterBackend for EchoBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Raster
        }

        async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
            if request.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled);
            }
            Ok(ConvertOutput {
                output_path: request.output_path(),
                backend: self.kind(),
            })
        }
    }

    fn request() -> ConversionRequest {
        ConversionRequest::new(
            "/in/a.png",
            "/out",
            TargetSpec::new("jpg", "a"),
            ConversionContext::new("png", "jpg", false),
        )
    }

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Transcode.to_string(), "transcode");
        assert_eq!(BackendKind::Jxl.as_str(), "jxl");
    }

    #[tokio::test]
    async fn test_default_cancellable_runs_convert() {
        let backend: Arc<dyn ConverterBackend> = Arc::new(EchoBackend);
        let conversion = backend.convert_cancellable(request());
        let output = conversion.outcome.await.unwrap();
        assert_eq!(output.output_path, PathBuf::from("/out/a.jpg"));
    }

    #[tokio::test]
    async fn test_terminate_cancels_token() {
        let backend: Arc<dyn ConverterBackend> = Arc::new(EchoBackend);
        let conversion = backend.convert_cancellable(request());
        (conversion.terminate)().unwrap();
        let result = conversion.outcome.await;
        assert!(matches!(result, Err(ConvertError::Cancelled)));
    }
}

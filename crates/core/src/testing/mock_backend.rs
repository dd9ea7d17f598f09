//! Mock converter backend for testing.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::converter::format::builder_format;
use crate::converter::{
    BackendKind, ConversionContext, ConversionRequest, ConvertError, ConvertOutput,
    ConverterBackend,
};

/// What the next conversions do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Write a small output file and succeed.
    Succeed,
    Fail(String),
    Cancelled,
    /// Block until the request's cancel token fires.
    WaitForCancel,
    /// Sleep, then succeed unless cancelled meanwhile.
    Delay(Duration),
    /// Block until cancelled, then take this long to stop, like a process
    /// finishing its writes after SIGTERM.
    SlowToStop(Duration),
}

/// Scriptable [`ConverterBackend`].
///
/// Records every request it receives. Capability checks follow the input and
/// output lists given at construction; `None` accepts anything.
#[derive(Debug)]
pub struct MockBackend {
    kind: BackendKind,
    inputs: Option<Vec<String>>,
    outputs: Option<Vec<String>>,
    static_only: bool,
    behavior: Mutex<MockBehavior>,
    calls: Mutex<Vec<ConversionRequest>>,
}

impl MockBackend {
    /// Accepts every conversion and succeeds.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            inputs: None,
            outputs: None,
            static_only: false,
            behavior: Mutex::new(MockBehavior::Succeed),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = Some(inputs.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = Some(outputs.iter().map(|s| builder_format(s)).collect());
        self
    }

    /// Refuse conversions that want animated output.
    pub fn static_only(mut self) -> Self {
        self.static_only = true;
        self
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    pub fn calls(&self) -> Vec<ConversionRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn succeed(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        let output_path = request.output_path();
        tokio::fs::create_dir_all(&request.dest_dir).await?;
        tokio::fs::write(&output_path, format!("{} output", self.kind)).await?;
        request.progress.report(100.0);
        Ok(ConvertOutput {
            output_path,
            backend: self.kind,
        })
    }
}

#[async_trait]
impl ConverterBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn can_handle(&self, ctx: &ConversionContext) -> bool {
        let input_ok = self
            .inputs
            .as_ref()
            .is_none_or(|inputs| inputs.contains(&ctx.input.ext));
        let animation_ok = !(self.static_only && ctx.output.want_animated);
        input_ok && animation_ok && self.supports_output(&ctx.output.ext)
    }

    fn supports_output(&self, format: &str) -> bool {
        self.outputs
            .as_ref()
            .is_none_or(|outputs| outputs.contains(&builder_format(format)))
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        let behavior = self.behavior.lock().unwrap_or_else(PoisonError::into_inner).clone();

        match behavior {
            MockBehavior::Succeed => self.succeed(request).await,
            MockBehavior::Fail(reason) => Err(ConvertError::external_tool(self.kind.as_str(), Some(1), reason)),
            MockBehavior::Cancelled => Err(ConvertError::Cancelled),
            MockBehavior::WaitForCancel => {
                request.cancel.cancelled().await;
                Err(ConvertError::Cancelled)
            }
            MockBehavior::SlowToStop(linger) => {
                request.cancel.cancelled().await;
                tokio::time::sleep(linger).await;
                Err(ConvertError::Cancelled)
            }
            MockBehavior::Delay(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => self.succeed(request).await,
                    _ = request.cancel.cancelled() => Err(ConvertError::Cancelled),
                }
            }
        }
    }
}

/// One mock per backend kind, with capability tables shaped like the real
/// backends.
#[derive(Debug, Clone)]
pub struct MockBackends {
    pub transcode: Arc<MockBackend>,
    pub raster: Arc<MockBackend>,
    pub vector: Arc<MockBackend>,
    pub heic: Arc<MockBackend>,
    pub jxl: Arc<MockBackend>,
    pub probe: Arc<super::MockProbe>,
}

impl MockBackends {
    pub fn new() -> Self {
        Self {
            transcode: Arc::new(MockBackend::new(BackendKind::Transcode)),
            raster: Arc::new(
                MockBackend::new(BackendKind::Raster)
                    .with_inputs(&[
                        "png", "jpg", "jpeg", "jpe", "jfif", "gif", "webp", "bmp", "tiff", "tif",
                        "ico", "tga", "exr", "hdr", "dds",
                    ])
                    .with_outputs(&["jpg", "png", "webp"])
                    .static_only(),
            ),
            vector: Arc::new(
                MockBackend::new(BackendKind::Vector)
                    .with_inputs(&["svg"])
                    .with_outputs(&["png", "jpg", "webp"]),
            ),
            heic: Arc::new(
                MockBackend::new(BackendKind::Heic)
                    .with_inputs(&["heic", "heif", "hif"])
                    .with_outputs(&["jpg", "png", "webp", "bmp", "tiff", "tga", "gif"]),
            ),
            jxl: Arc::new(
                MockBackend::new(BackendKind::Jxl)
                    .with_inputs(&["jxl"])
                    .with_outputs(&["png"]),
            ),
            probe: Arc::new(super::MockProbe::new()),
        }
    }

    /// Every mock backend, in [`BackendKind`] order.
    pub fn all(&self) -> [&Arc<MockBackend>; 5] {
        [&self.transcode, &self.raster, &self.vector, &self.heic, &self.jxl]
    }

    /// Total conversions across every backend.
    pub fn total_calls(&self) -> usize {
        self.all().iter().map(|b| b.call_count()).sum()
    }
}

impl Default for MockBackends {
    fn default() -> Self {
        Self::new()
    }
}

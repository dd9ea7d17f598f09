//! Format handlers: per input family, choose backends and run them.
//!
//! A [`FormatHandler`] probes the source once to build the
//! [`ConversionContext`], asks its [`HandlerFamily`] for a [`Strategy`], and
//! either walks a fallback [`Plan`] or runs a staged pipeline.

mod executor;
mod pipeline;
mod plan;

pub use executor::execute_plan;
pub use plan::{HandlerFamily, Plan, Strategy};

use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::converter::format::extension_of;
use crate::converter::{
    BackendSet, CancellableConversion, ConversionContext, ConversionRequest, ConvertError,
    ConvertOutput, ProgressSink, TargetSpec,
};
use crate::metrics;
use crate::probe::MediaProbe;

/// Everything handlers share: the backends, the probe and the temp directory.
pub struct ConversionServices {
    pub backends: BackendSet,
    pub probe: Arc<dyn MediaProbe>,
    pub temp_dir: PathBuf,
}

impl ConversionServices {
    pub fn new(backends: BackendSet, probe: Arc<dyn MediaProbe>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            backends,
            probe,
            temp_dir: temp_dir.into(),
        }
    }
}

/// One file to convert, as handed to a handler.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub dest_dir: PathBuf,
    pub spec: TargetSpec,
    pub progress: ProgressSink,
    pub cancel: CancellationToken,
}

impl ConversionJob {
    pub fn new(source: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>, spec: TargetSpec) -> Self {
        Self {
            source: source.into(),
            dest_dir: dest_dir.into(),
            spec,
            progress: ProgressSink::none(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone)]
pub struct FormatHandler {
    family: HandlerFamily,
    services: Arc<ConversionServices>,
}

impl FormatHandler {
    /// The handler for `source`'s extension.
    pub fn for_source(services: Arc<ConversionServices>, source: &Path) -> Result<Self, ConvertError> {
        let ext = extension_of(source);
        let family = HandlerFamily::for_input(&ext).ok_or_else(|| ConvertError::UnsupportedFormat {
            input: ext,
            output: "*".to_string(),
        })?;
        Ok(Self { family, services })
    }

    pub fn family(&self) -> HandlerFamily {
        self.family
    }

    pub fn plan(&self, ctx: &ConversionContext) -> Result<Plan, ConvertError> {
        self.family.plan(ctx)
    }

    pub async fn convert(&self, job: ConversionJob) -> Result<ConvertOutput, ConvertError> {
        let started = Instant::now();
        let input_ext = extension_of(&job.source);
        let mut spec = job.spec;
        if spec.is_original_format() {
            spec.format = input_ext.clone();
        }

        let animated = self.services.probe.is_animated(&job.source).await;
        let context = ConversionContext::new(&input_ext, &spec.format, animated).with_quality(spec.quality);
        let strategy = self.family.strategy(&context, &self.services.backends)?;
        debug!(
            family = %self.family,
            source = %job.source.display(),
            animated,
            strategy = ?strategy,
            "Converting"
        );

        let format = spec.format.clone();
        let request = ConversionRequest::new(job.source, job.dest_dir, spec, context)
            .with_progress(job.progress)
            .with_cancel(job.cancel);

        let result = match strategy {
            Strategy::Fallback(plan) => execute_plan(&self.services.backends, &plan, &request).await,
            Strategy::ViaPng {
                decode,
                encode,
                carry_size,
                quality,
            } => {
                pipeline::convert_via_png(&self.services, &request, decode, encode, carry_size, quality)
                    .await
            }
            Strategy::DecodedFrames => pipeline::convert_decoded_frames(&self.services, &request).await,
        };

        if let Ok(output) = &result {
            let elapsed = started.elapsed().as_secs_f64();
            metrics::CONVERSION_DURATION
                .with_label_values(&[format.as_str()])
                .observe(elapsed);
            info!(
                output = %output.output_path.display(),
                backend = %output.backend,
                elapsed_secs = elapsed,
                "Conversion finished"
            );
        }
        result
    }

    /// Starts the conversion; terminating cancels the job's token, which
    /// stops whichever process the current backend is running.
    pub fn convert_cancellable(self, job: ConversionJob) -> CancellableConversion {
        let token = job.cancel.clone();
        CancellableConversion {
            outcome: async move { self.convert(job).await }.boxed(),
            terminate: Box::new(move || {
                token.cancel();
                Ok(())
            }),
        }
    }
}

//! Runs a plan: each backend in order until one succeeds.

use tracing::{debug, warn};

use super::plan::Plan;
use crate::converter::{BackendFailure, BackendSet, ConversionRequest, ConvertError, ConvertOutput};
use crate::metrics;

/// Returns the first success. Backends whose capability check rejects the
/// request are skipped; a cancellation stops the plan at once.
pub async fn execute_plan(
    backends: &BackendSet,
    plan: &Plan,
    request: &ConversionRequest,
) -> Result<ConvertOutput, ConvertError> {
    let mut failures = Vec::new();

    for kind in plan.steps().iter().copied() {
        if request.cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let backend = backends.get(kind);
        if !backend.can_handle(&request.context) {
            debug!(
                backend = %kind,
                input = %request.context.input.ext,
                output = %request.context.output.ext,
                "Backend cannot handle conversion, skipping"
            );
            continue;
        }

        match backend.convert(request).await {
            Ok(output) => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "success"])
                    .inc();
                return Ok(output);
            }
            Err(e) if e.is_cancelled() => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "cancelled"])
                    .inc();
                return Err(e);
            }
            Err(e) => {
                metrics::CONVERSIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "failed"])
                    .inc();
                metrics::BACKEND_FALLTHROUGHS.inc();
                warn!(
                    backend = %kind,
                    source = %request.source.display(),
                    error = %e,
                    "Backend failed, trying next"
                );
                failures.push(BackendFailure {
                    backend: kind,
                    error: e.to_string(),
                });
            }
        }
    }

    let input = request.context.input.ext.clone();
    let output = request.context.output.ext.clone();
    if failures.is_empty() {
        Err(ConvertError::unsupported(input, output))
    } else {
        Err(ConvertError::BackendExhausted {
            input,
            output,
            failures,
        })
    }
}

//! Multi-stage conversions.

use tracing::{debug, warn};

use super::executor::execute_plan;
use super::plan::Plan;
use super::ConversionServices;
use crate::converter::imaging::{run_blocking, temp_file};
use crate::converter::{
    decode_webp_frames, BackendKind, ConversionRequest, ConvertError, ConvertOutput, SizePolicy,
    TargetSpec,
};

/// Decodes to a task-unique PNG in the temp directory, then converts that
/// PNG to the target. The PNG is removed whatever the outcome.
pub async fn convert_via_png(
    services: &ConversionServices,
    request: &ConversionRequest,
    decode: BackendKind,
    encode: BackendKind,
    carry_size: bool,
    quality: Option<u8>,
) -> Result<ConvertOutput, ConvertError> {
    tokio::fs::create_dir_all(&services.temp_dir).await?;
    let intermediate = temp_file(&services.temp_dir, "png");
    let stem = intermediate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut stage_spec = TargetSpec::new("png", stem).with_size(if carry_size {
        request.spec.size
    } else {
        SizePolicy::Original
    });
    stage_spec.quality = quality;

    let result = async {
        let first = request
            .stage(&request.source, &services.temp_dir, stage_spec)
            .with_progress(request.progress.scaled(0.0, 50.0));
        let decoded = execute_plan(&services.backends, &Plan::single(decode), &first).await?;
        debug!(intermediate = %decoded.output_path.display(), "Intermediate PNG written");

        let second = request
            .stage(&decoded.output_path, &request.dest_dir, request.spec.clone())
            .with_progress(request.progress.scaled(50.0, 50.0));
        execute_plan(&services.backends, &Plan::single(encode), &second).await
    }
    .await;

    remove_intermediate(&intermediate).await;
    result
}

/// Decodes an animated WebP in-process and streams its frames to the
/// transcoder.
pub async fn convert_decoded_frames(
    services: &ConversionServices,
    request: &ConversionRequest,
) -> Result<ConvertOutput, ConvertError> {
    let source = request.source.clone();
    let frames = run_blocking(move || decode_webp_frames(&source)).await?;
    debug!(
        source = %request.source.display(),
        frames = frames.frames.len(),
        fps = frames.fps,
        "Decoded animation frames"
    );

    let request = request.clone().with_frames(frames);
    execute_plan(&services.backends, &Plan::single(BackendKind::Transcode), &request).await
}

async fn remove_intermediate(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete intermediate file"),
    }
}

//! FFmpeg-based transcode backend.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::ConvertError;
use super::traits::{BackendKind, ConverterBackend};
use super::types::{ConversionRequest, ConvertOutput, ProgressSink};
use super::validate::validate_output_file;
use crate::args::{ArgumentSynthesizer, EngineInput};
use crate::probe::MediaProbe;
use crate::process::{classify_exit, ProcessExit, ProcessRegistry, ProcessSpec};

/// Runs ffmpeg through the process registry.
pub struct TranscodeBackend {
    ffmpeg_path: PathBuf,
    config: ConverterConfig,
    registry: ProcessRegistry,
    synthesizer: ArgumentSynthesizer,
    probe: Option<Arc<dyn MediaProbe>>,
}

impl TranscodeBackend {
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        config: ConverterConfig,
        registry: ProcessRegistry,
        synthesizer: ArgumentSynthesizer,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            config,
            registry,
            synthesizer,
            probe: None,
        }
    }

    /// Enables intermediate progress, using the probe for input duration.
    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    async fn input_duration(&self, request: &ConversionRequest) -> Option<f64> {
        if let Some(frames) = &request.frames {
            return Some(frames.duration()).filter(|d| *d > 0.0);
        }
        let probe = self.probe.as_ref()?;
        match probe.probe(&request.source).await {
            Ok(info) => info.duration.filter(|d| *d > 0.0),
            Err(e) => {
                debug!(source = %request.source.display(), error = %e, "No duration, progress limited to completion");
                None
            }
        }
    }

    async fn run(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        request.validate()?;
        tokio::fs::create_dir_all(&request.dest_dir).await?;

        let animated = request.context.output.want_animated || request.frames.is_some();
        let output_args = self.synthesizer.build_args(
            &request.source,
            &request.dest_dir,
            &request.spec,
            animated,
        )?;
        let input = match &request.frames {
            Some(frames) => EngineInput::RawFrames {
                width: frames.width,
                height: frames.height,
                fps: frames.fps,
            },
            None => EngineInput::File(&request.source),
        };
        let args = self.synthesizer.engine_args(
            input,
            Some(self.config.ffmpeg_log_level.as_str()),
            output_args,
        );

        let duration = self.input_duration(request).await;
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let mut spec = ProcessSpec::new(&self.ffmpeg_path).args(args).stderr_lines(line_tx);
        if let Some(frames) = &request.frames {
            spec = spec.stdin_chunks(frames.frames.clone());
        }

        let progress = request.progress.clone();
        let reporter = tokio::spawn(report_progress(line_rx, duration, progress));

        debug!(
            source = %request.source.display(),
            format = %request.spec.format,
            "Starting ffmpeg"
        );
        let exit = self.registry.run(spec, &request.cancel).await;
        let _ = reporter.await;
        let exit = exit?;

        if request.cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        let exit = ProcessExit {
            stderr: strip_progress_lines(&exit.stderr),
            ..exit
        };
        classify_exit("ffmpeg", &exit)?;

        let output_path = request.output_path();
        let engine_output =
            self.synthesizer
                .engine_output_path(&request.dest_dir, &request.spec, animated);
        if engine_output != output_path {
            tokio::fs::rename(&engine_output, &output_path).await?;
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
            backend: BackendKind::Transcode,
        })
    }
}

#[async_trait]
impl ConverterBackend for TranscodeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Transcode
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConvertOutput, ConvertError> {
        self.run(request).await
    }
}

async fn report_progress(
    mut lines: mpsc::UnboundedReceiver<String>,
    duration: Option<f64>,
    progress: ProgressSink,
) {
    let time_regex = Regex::new(r"^out_time_(?:us|ms)=(\d+)").ok();
    let clock_regex = Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok();

    while let Some(line) = lines.recv().await {
        let Some(total) = duration else { continue };
        if let Some(seconds) = parse_progress_time(&line, time_regex.as_ref(), clock_regex.as_ref()) {
            progress.report((seconds / total * 100.0).min(99.0));
        }
    }
}

/// Seconds of output written, from either the `-progress` key or the stats
/// line. Both `out_time_us` and `out_time_ms` carry microseconds.
fn parse_progress_time(line: &str, time_regex: Option<&Regex>, clock_regex: Option<&Regex>) -> Option<f64> {
    if let Some(caps) = time_regex.and_then(|re| re.captures(line)) {
        let micros = caps.get(1)?.as_str().parse::<f64>().ok()?;
        return Some(micros / 1_000_000.0);
    }
    let caps = clock_regex.and_then(|re| re.captures(line))?;
    let hours = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let minutes = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let seconds = caps.get(3)?.as_str().parse::<f64>().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Drops `key=value` progress lines so only diagnostics remain.
fn strip_progress_lines(stderr: &str) -> String {
    let Some(re) = Regex::new(r"^[a-z0-9_]+=\S*$").ok() else {
        warn!("Progress filter unavailable, keeping raw stderr");
        return stderr.to_string();
    };
    stderr
        .lines()
        .filter(|line| !re.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::capabilities::EncoderCapabilities;
    use crate::converter::types::{ConversionContext, TargetSpec};
    use std::sync::Mutex;

    fn regexes() -> (Regex, Regex) {
        (
            Regex::new(r"^out_time_(?:us|ms)=(\d+)").unwrap(),
            Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap(),
        )
    }

    #[test]
    fn test_parse_progress_time() {
        let (t, c) = regexes();
        assert_eq!(parse_progress_time("out_time_us=2500000", Some(&t), Some(&c)), Some(2.5));
        assert_eq!(parse_progress_time("out_time_ms=1000000", Some(&t), Some(&c)), Some(1.0));
        assert_eq!(
            parse_progress_time("frame=10 fps=0.0 time=00:01:02.50 bitrate=N/A", Some(&t), Some(&c)),
            Some(62.5)
        );
        assert_eq!(parse_progress_time("progress=continue", Some(&t), Some(&c)), None);
    }

    #[test]
    fn test_strip_progress_lines() {
        let stderr = "frame=1\nout_time_us=0\n/out/x.jpg: Could not open file\nprogress=end";
        assert_eq!(strip_progress_lines(stderr), "/out/x.jpg: Could not open file");
    }

    #[tokio::test]
    async fn test_progress_reporter_scales_by_duration() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ProgressSink::new(move |p| seen.lock().unwrap().push(p))
        };
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("out_time_us=1000000".to_string()).unwrap();
        tx.send("out_time_us=4000000".to_string()).unwrap();
        tx.send("out_time_us=9000000".to_string()).unwrap();
        drop(tx);

        report_progress(rx, Some(4.0), sink).await;
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 99.0, 99.0]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_ffmpeg() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = TranscodeBackend::new(
            "/nonexistent/ffmpeg",
            ConverterConfig::default(),
            ProcessRegistry::new(),
            ArgumentSynthesizer::new(EncoderCapabilities::software_only()),
        );
        let request = ConversionRequest::new(
            dir.path().join("in.png"),
            dir.path().join("out"),
            TargetSpec::new("jpg", "in"),
            ConversionContext::new("png", "jpg", false),
        );

        let err = backend.convert(&request).await.unwrap_err();
        assert!(matches!(err, ConvertError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_is_classified() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(
            &fake,
            "#!/bin/sh\necho 'out_time_us=0' >&2\necho 'in.png: Invalid data found when processing input' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = TranscodeBackend::new(
            &fake,
            ConverterConfig::default(),
            ProcessRegistry::new(),
            ArgumentSynthesizer::default(),
        );
        let request = ConversionRequest::new(
            dir.path().join("in.png"),
            dir.path().join("out"),
            TargetSpec::new("jpg", "in"),
            ConversionContext::new("png", "jpg", false),
        );

        let err = backend.convert(&request).await.unwrap_err();
        assert!(matches!(err, ConvertError::InvalidInputData));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apng_is_renamed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("ffmpeg");
        // Writes its last argument, like ffmpeg does.
        std::fs::write(
            &fake,
            "#!/bin/sh\nfor last; do :; done\nprintf 'frames' > \"$last\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = TranscodeBackend::new(
            &fake,
            ConverterConfig::default(),
            ProcessRegistry::new(),
            ArgumentSynthesizer::default(),
        );
        let request = ConversionRequest::new(
            dir.path().join("in.gif"),
            dir.path().join("out"),
            TargetSpec::new("png", "anim"),
            ConversionContext::new("gif", "png", true),
        );

        let output = backend.convert(&request).await.unwrap();
        assert_eq!(output.output_path, dir.path().join("out/anim.png"));
        assert!(output.output_path.exists());
        assert!(!dir.path().join("out/anim.apng").exists());
    }
}

//! ffprobe-backed [`MediaProbe`].

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::sniff::{is_static_only, png_file_animated, webp_file_animated};
use super::{MediaInfo, MediaProbe};
use crate::converter::format::{extension_of, is_video_format};
use crate::converter::ConvertError;
use crate::process::{ProcessExit, ProcessRegistry, ProcessSpec};

/// Probes media with ffprobe and caches results per path.
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    registry: ProcessRegistry,
    timeout: Duration,
    cache: Mutex<HashMap<PathBuf, MediaInfo>>,
}

impl FfprobeProbe {
    pub fn new(ffprobe_path: impl Into<PathBuf>, registry: ProcessRegistry, timeout: Duration) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            registry,
            timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn cached(&self, path: &Path) -> Option<MediaInfo> {
        self.cache.lock().ok()?.get(path).cloned()
    }

    /// Runs ffprobe with a deadline, terminating it on expiry.
    async fn run_ffprobe(&self, args: Vec<String>) -> Result<ProcessExit, ConvertError> {
        let spec = ProcessSpec::new(&self.ffprobe_path).args(args).capture_stdout();
        let cancel = CancellationToken::new();
        let run = self.registry.run(spec, &cancel);
        tokio::pin!(run);

        tokio::select! {
            exit = &mut run => exit,
            _ = tokio::time::sleep(self.timeout) => {
                cancel.cancel();
                let _ = run.await;
                Err(ConvertError::probe(format!(
                    "ffprobe timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Number of decoded frames in the first video stream.
    async fn count_frames(&self, path: &Path) -> Result<u64, ConvertError> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-count_frames".to_string(),
            "-show_entries".to_string(),
            "stream=nb_read_frames".to_string(),
            "-of".to_string(),
            "default=nokey=1:noprint_wrappers=1".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let exit = self.run_ffprobe(args).await?;
        if !exit.success() {
            return Err(ConvertError::probe(format!(
                "ffprobe exited with code {:?}: {}",
                exit.code,
                exit.stderr.trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&exit.stdout);
        stdout
            .trim()
            .parse::<u64>()
            .map_err(|_| ConvertError::probe(format!("unexpected frame count: {}", stdout.trim())))
    }

    async fn detect_animation(&self, path: &Path) -> Result<bool, ConvertError> {
        let ext = extension_of(path);
        if is_static_only(&ext) {
            return Ok(false);
        }
        if is_video_format(&ext) {
            return Ok(true);
        }

        let sniffed = match ext.as_str() {
            "webp" => webp_file_animated(path).await?,
            "png" => png_file_animated(path).await?,
            _ => None,
        };
        if let Some(animated) = sniffed {
            return Ok(animated);
        }

        Ok(self.count_frames(path).await? > 1)
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConvertError> {
        if let Some(info) = self.cached(path) {
            return Ok(info);
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-show_format".to_string(),
            path.to_string_lossy().into_owned(),
        ];
        let exit = self.run_ffprobe(args).await?;
        if !exit.success() || exit.stdout.is_empty() {
            return Err(ConvertError::probe(format!(
                "ffprobe failed: {}",
                if exit.stderr.trim().is_empty() {
                    format!("exited with code {:?}", exit.code)
                } else {
                    exit.stderr.trim().to_string()
                }
            )));
        }

        let info = parse_probe_output(&String::from_utf8_lossy(&exit.stdout))?;
        debug!(path = %path.display(), width = info.width, height = info.height, "Probed media");

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path.to_path_buf(), info.clone());
        }
        Ok(info)
    }

    async fn is_animated(&self, path: &Path) -> bool {
        match self.detect_animation(path).await {
            Ok(animated) => animated,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Animation detection failed, assuming static");
                false
            }
        }
    }
}

/// Parses `ffprobe -print_format json -show_streams -show_format` output.
pub fn parse_probe_output(output: &str) -> Result<MediaInfo, ConvertError> {
    #[derive(Deserialize)]
    struct ProbeOutput {
        #[serde(default)]
        format: Option<ProbeFormat>,
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    #[derive(Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }

    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        codec_name: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        pix_fmt: Option<String>,
    }

    let probe: ProbeOutput = serde_json::from_str(output)
        .map_err(|e| ConvertError::probe(format!("Failed to parse ffprobe output: {}", e)))?;

    if probe.streams.is_empty() {
        return Err(ConvertError::probe("No streams found in media file"));
    }
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ConvertError::probe("No video stream found in media file"))?;

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(ConvertError::probe(format!(
            "Invalid dimensions: {}x{}",
            width, height
        )));
    }

    Ok(MediaInfo {
        width,
        height,
        duration: probe
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok()),
        fps: video.r_frame_rate.as_deref().and_then(parse_frame_rate),
        codec: video.codec_name.clone(),
        pixel_format: video.pix_fmt.clone(),
    })
}

/// Parses "30/1" or "24000/1001", rounded to two decimals.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().ok()?;
            let den = den.parse::<f64>().ok()?;
            if num == 0.0 || den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse::<f64>().ok()?,
    };
    Some((fps * 100.0).round() / 100.0)
}

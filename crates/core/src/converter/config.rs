//! Configuration for the converter backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Paths to the external tools. Bare names are resolved on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    #[serde(default = "default_heif_convert_path")]
    pub heif_convert_path: PathBuf,

    /// macOS only.
    #[serde(default = "default_sips_path")]
    pub sips_path: PathBuf,

    #[serde(default = "default_djxl_path")]
    pub djxl_path: PathBuf,

    #[serde(default = "default_rsvg_convert_path")]
    pub rsvg_convert_path: PathBuf,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_heif_convert_path() -> PathBuf {
    PathBuf::from("heif-convert")
}

fn default_sips_path() -> PathBuf {
    PathBuf::from("sips")
}

fn default_djxl_path() -> PathBuf {
    PathBuf::from("djxl")
}

fn default_rsvg_convert_path() -> PathBuf {
    PathBuf::from("rsvg-convert")
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            heif_convert_path: default_heif_convert_path(),
            sips_path: default_sips_path(),
            djxl_path: default_djxl_path(),
            rsvg_convert_path: default_rsvg_convert_path(),
        }
    }
}

/// Runtime settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Temporary directory for intermediate files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Smallest output accepted as a successful conversion.
    #[serde(default = "default_output_min_size")]
    pub output_min_size_bytes: u64,

    /// How long to wait for the output file to appear after the tool exits.
    #[serde(default = "default_output_wait_timeout")]
    pub output_wait_timeout_ms: u64,

    /// Time between a graceful terminate and a forced kill.
    #[serde(default = "default_kill_grace_period")]
    pub kill_grace_period_ms: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("convertino")
}

fn default_output_min_size() -> u64 {
    1
}

fn default_output_wait_timeout() -> u64 {
    5000
}

fn default_kill_grace_period() -> u64 {
    1000
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            output_min_size_bytes: default_output_min_size(),
            output_wait_timeout_ms: default_output_wait_timeout(),
            kill_grace_period_ms: default_kill_grace_period(),
            probe_timeout_secs: default_probe_timeout(),
            ffmpeg_log_level: default_log_level(),
        }
    }
}

impl ConverterConfig {
    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, temp_dir: PathBuf) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub fn with_output_wait_timeout(mut self, timeout: Duration) -> Self {
        self.output_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn output_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.output_wait_timeout_ms)
    }

    pub fn kill_grace_period(&self) -> Duration {
        Duration::from_millis(self.kill_grace_period_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConverterConfig::default();
        assert_eq!(config.output_min_size_bytes, 1);
        assert_eq!(config.output_wait_timeout(), Duration::from_secs(5));
        assert_eq!(config.kill_grace_period(), Duration::from_secs(1));
        assert_eq!(config.ffmpeg_log_level, "error");
        assert!(config.temp_dir.ends_with("convertino"));
    }

    #[test]
    fn test_config_builder() {
        let config = ConverterConfig::default()
            .with_temp_dir(PathBuf::from("/tmp/test"))
            .with_output_wait_timeout(Duration::from_millis(250));

        assert_eq!(config.temp_dir, PathBuf::from("/tmp/test"));
        assert_eq!(config.output_wait_timeout_ms, 250);
    }

    #[test]
    fn test_tool_paths_partial_toml() {
        let tools: ToolPaths = toml::from_str(r#"ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg""#).unwrap();
        assert_eq!(tools.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(tools.djxl_path, PathBuf::from("djxl"));
    }
}

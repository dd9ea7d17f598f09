//! Argument synthesis for the transcoding engine.
//!
//! [`ArgumentSynthesizer`] turns a [`TargetSpec`] into the exact ffmpeg
//! argument vector. It is pure: nothing here touches the filesystem or spawns
//! a process, which keeps every format rule unit-testable.

mod builders;
mod filter;
mod ico;
pub mod quality;

pub use builders::{BuildContext, OutputBuilder, DEFAULT_QUALITY};
pub use filter::{needs_background, size_filter, Pixels, ScaleDim, ScaleFilter, WHITE_BACKGROUND_FILTER};
pub use ico::{icon_filter, icon_size, ICO_SIZES};

use std::path::{Path, PathBuf};

use crate::converter::capabilities::EncoderCapabilities;
use crate::converter::format::extension_of;
use crate::converter::{ConvertError, TargetSpec};

/// Where the engine reads its frames from.
#[derive(Debug, Clone, Copy)]
pub enum EngineInput<'a> {
    File(&'a Path),
    /// Raw RGBA frames on stdin.
    RawFrames { width: u32, height: u32, fps: f64 },
}

/// Builds ffmpeg argument vectors.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSynthesizer {
    capabilities: EncoderCapabilities,
}

impl ArgumentSynthesizer {
    pub fn new(capabilities: EncoderCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> &EncoderCapabilities {
        &self.capabilities
    }

    /// Output arguments for converting `source` into `dest_dir` per `spec`.
    ///
    /// `spec.format` must already be concrete (`original` resolved).
    pub fn build_args(
        &self,
        source: &Path,
        dest_dir: &Path,
        spec: &TargetSpec,
        animated: bool,
    ) -> Result<Vec<String>, ConvertError> {
        if spec.is_original_format() {
            return Err(ConvertError::invalid_spec(
                "output format must be resolved before building arguments",
            ));
        }
        let builder = OutputBuilder::for_format(&spec.format)
            .ok_or_else(|| ConvertError::unsupported(extension_of(source), &spec.format))?;

        builder.build(&BuildContext {
            source,
            dest_dir,
            spec,
            animated,
            capabilities: &self.capabilities,
        })
    }

    /// The path the engine writes to, which differs from the final path
    /// for animated PNG.
    pub fn engine_output_path(&self, dest_dir: &Path, spec: &TargetSpec, animated: bool) -> PathBuf {
        BuildContext {
            source: Path::new(""),
            dest_dir,
            spec,
            animated,
            capabilities: &self.capabilities,
        }
        .engine_output_path()
    }

    /// Full command line: input, overwrite, threads, optional progress
    /// reporting, then `output_args`.
    pub fn engine_args(
        &self,
        input: EngineInput<'_>,
        log_level: Option<&str>,
        output_args: Vec<String>,
    ) -> Vec<String> {
        let mut args = Vec::with_capacity(output_args.len() + 16);
        match input {
            EngineInput::File(path) => {
                args.push("-i".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
            EngineInput::RawFrames { width, height, fps } => {
                args.extend(
                    [
                        "-f",
                        "rawvideo",
                        "-pix_fmt",
                        "rgba",
                        "-s",
                        &format!("{}x{}", width, height),
                        "-r",
                        &fps.to_string(),
                        "-i",
                        "pipe:0",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
            }
        }
        args.extend(["-y", "-threads", "0"].iter().map(|s| s.to_string()));
        if let Some(level) = log_level {
            args.extend(
                ["-loglevel", level, "-progress", "pipe:2", "-nostats"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        args.extend(output_args);
        args
    }
}

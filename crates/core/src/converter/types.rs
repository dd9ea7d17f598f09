//! Types describing a requested conversion.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::error::ConvertError;
use super::format::{is_animation_capable, may_carry_alpha, ORIGINAL_FORMAT};
use super::traits::BackendKind;

/// Video codec requested for MP4/WebM output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Vp8,
    Vp9,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame rate for animated output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AnimatedFps {
    /// Keep whatever rate the source has.
    #[default]
    SameAsSource,
    Fixed(f64),
}

impl AnimatedFps {
    /// The explicit rate, if one was requested.
    pub fn explicit(&self) -> Option<f64> {
        match self {
            Self::Fixed(fps) if *fps > 0.0 => Some(*fps),
            _ => None,
        }
    }
}

impl Serialize for AnimatedFps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::SameAsSource => serializer.serialize_str("sameAsSource"),
            Self::Fixed(fps) => serializer.serialize_f64(*fps),
        }
    }
}

impl<'de> Deserialize<'de> for AnimatedFps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(fps) => Ok(Self::Fixed(fps)),
            Raw::Text(text) if text == "sameAsSource" => Ok(Self::SameAsSource),
            Raw::Text(text) => text
                .parse::<f64>()
                .map(Self::Fixed)
                .map_err(|_| serde::de::Error::custom(format!("invalid animatedFps: {}", text))),
        }
    }
}

/// Named resizing strategy as supplied by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SizeType {
    Original,
    MaxWidth,
    MaxHeight,
    MinWidth,
    MinHeight,
    MaxSide,
    MinSide,
    Exact,
}

/// Validated size policy. Carrying the value inside the variant keeps
/// "value present iff not original" true by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePolicy {
    #[default]
    Original,
    MaxWidth(u32),
    MaxHeight(u32),
    MinWidth(u32),
    MinHeight(u32),
    MaxSide(u32),
    MinSide(u32),
    Exact {
        width: Option<u32>,
        height: Option<u32>,
    },
}

impl SizePolicy {
    /// Builds a policy from the loose caller fields.
    pub fn from_parts(
        size_type: SizeType,
        size_value: Option<u32>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<Self, ConvertError> {
        let value = || match size_value {
            Some(0) => Err(ConvertError::invalid_spec("sizeValue must be positive")),
            Some(v) => Ok(v),
            None => Err(ConvertError::MissingArgument { what: "sizeValue" }),
        };

        Ok(match size_type {
            SizeType::Original => Self::Original,
            SizeType::MaxWidth => Self::MaxWidth(value()?),
            SizeType::MaxHeight => Self::MaxHeight(value()?),
            SizeType::MinWidth => Self::MinWidth(value()?),
            SizeType::MinHeight => Self::MinHeight(value()?),
            SizeType::MaxSide => Self::MaxSide(value()?),
            SizeType::MinSide => Self::MinSide(value()?),
            SizeType::Exact => {
                let width = width.filter(|w| *w > 0);
                let height = height.filter(|h| *h > 0);
                if width.is_none() && height.is_none() {
                    return Err(ConvertError::MissingArgument {
                        what: "width or height",
                    });
                }
                Self::Exact { width, height }
            }
        })
    }

    pub fn size_type(&self) -> SizeType {
        match self {
            Self::Original => SizeType::Original,
            Self::MaxWidth(_) => SizeType::MaxWidth,
            Self::MaxHeight(_) => SizeType::MaxHeight,
            Self::MinWidth(_) => SizeType::MinWidth,
            Self::MinHeight(_) => SizeType::MinHeight,
            Self::MaxSide(_) => SizeType::MaxSide,
            Self::MinSide(_) => SizeType::MinSide,
            Self::Exact { .. } => SizeType::Exact,
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self, Self::Original)
    }

    /// The single size value, for every policy except `Original` and `Exact`.
    pub fn value(&self) -> Option<u32> {
        match self {
            Self::MaxWidth(v)
            | Self::MaxHeight(v)
            | Self::MinWidth(v)
            | Self::MinHeight(v)
            | Self::MaxSide(v)
            | Self::MinSide(v) => Some(*v),
            Self::Original | Self::Exact { .. } => None,
        }
    }

    /// Computes output dimensions from intrinsic ones, with the same meaning
    /// as the scale expressions handed to the transcoding engine.
    pub fn resolve(&self, iw: u32, ih: u32) -> (u32, u32) {
        let iw = iw.max(1);
        let ih = ih.max(1);
        let by_width = |w: u32| (w, scale_other(ih, iw, w));
        let by_height = |h: u32| (scale_other(iw, ih, h), h);

        match *self {
            Self::Original => (iw, ih),
            Self::MaxWidth(v) => by_width(iw.min(v)),
            Self::MaxHeight(v) => by_height(ih.min(v)),
            Self::MinWidth(v) => by_width(iw.max(v)),
            Self::MinHeight(v) => by_height(ih.max(v)),
            Self::MaxSide(v) if iw > ih => by_width(v),
            Self::MaxSide(v) => by_height(v),
            Self::MinSide(v) if iw > ih => by_height(v),
            Self::MinSide(v) => by_width(v),
            Self::Exact {
                width: Some(w),
                height: Some(h),
            } => (w, h),
            Self::Exact {
                width: Some(w),
                height: None,
            } => by_width(w),
            Self::Exact {
                width: None,
                height: Some(h),
            } => by_height(h),
            Self::Exact { .. } => (iw, ih),
        }
    }
}

/// Scales `other` by `target / base`, rounding and never returning zero.
fn scale_other(other: u32, base: u32, target: u32) -> u32 {
    let scaled = (other as f64 * target as f64 / base as f64).round() as u32;
    scaled.max(1)
}

/// What a single conversion should produce.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    /// Output extension, lowercase. Never `original` once handed to a backend.
    pub format: String,
    /// 1-100, higher is better.
    pub quality: Option<u8>,
    pub size: SizePolicy,
    pub codec: Option<Codec>,
    pub animated_fps: AnimatedFps,
    /// Output base name without extension.
    pub file_name: String,
}

impl TargetSpec {
    pub fn new(format: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            format: format.into().to_ascii_lowercase(),
            quality: None,
            size: SizePolicy::Original,
            codec: None,
            animated_fps: AnimatedFps::SameAsSource,
            file_name: file_name.into(),
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_size(mut self, size: SizePolicy) -> Self {
        self.size = size;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_animated_fps(mut self, fps: AnimatedFps) -> Self {
        self.animated_fps = fps;
        self
    }

    pub fn is_original_format(&self) -> bool {
        self.format == ORIGINAL_FORMAT
    }

    /// `<file_name>.<format>`
    pub fn output_file_name(&self) -> String {
        format!("{}.{}", self.file_name, self.format)
    }
}

/// Per-task options in the shape callers send them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub size_type: Option<SizeType>,
    #[serde(default)]
    pub size_value: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub codec: Option<Codec>,
    #[serde(default)]
    pub animated_fps: AnimatedFps,
    /// Output directory.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Replace the host library item with the converted file.
    #[serde(default, alias = "isReplaceMode")]
    pub replace_mode: bool,
}

impl TaskOptions {
    /// Validates the loose fields into a [`TargetSpec`].
    pub fn to_spec(&self) -> Result<TargetSpec, ConvertError> {
        let format = self
            .format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or(ConvertError::MissingArgument { what: "format" })?;
        let file_name = self
            .file_name
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or(ConvertError::MissingArgument { what: "fileName" })?;

        if let Some(q) = self.quality {
            if !(1..=100).contains(&q) {
                return Err(ConvertError::invalid_spec(format!(
                    "quality must be within 1-100, got {}",
                    q
                )));
            }
        }

        let size = SizePolicy::from_parts(
            self.size_type.unwrap_or(SizeType::Original),
            self.size_value,
            self.width,
            self.height,
        )?;

        Ok(TargetSpec {
            format: format.to_ascii_lowercase(),
            quality: self.quality,
            size,
            codec: self.codec,
            animated_fps: self.animated_fps,
            file_name: file_name.to_string(),
        })
    }

    pub fn output_dir(&self) -> Result<&Path, ConvertError> {
        self.output
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConvertError::MissingArgument { what: "output" })
    }
}

/// Properties of the input that drive backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTraits {
    pub ext: String,
    pub animated: bool,
    pub has_alpha: bool,
}

/// Properties of the requested output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTraits {
    pub ext: String,
    pub want_animated: bool,
    /// Caller-requested quality, if any.
    pub quality: Option<u8>,
}

impl OutputTraits {
    /// WebP with an explicit quality needs a lossy encoder.
    pub fn is_lossy_webp(&self) -> bool {
        self.ext == "webp" && self.quality.is_some()
    }
}

/// Derived, read-only view of one conversion, computed once before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionContext {
    pub input: InputTraits,
    pub output: OutputTraits,
}

impl ConversionContext {
    pub fn new(input_ext: &str, output_ext: &str, animated: bool) -> Self {
        let input_ext = input_ext.to_ascii_lowercase();
        let output_ext = output_ext.to_ascii_lowercase();
        Self {
            input: InputTraits {
                has_alpha: may_carry_alpha(&input_ext),
                ext: input_ext,
                animated,
            },
            output: OutputTraits {
                want_animated: animated && is_animation_capable(&output_ext),
                ext: output_ext,
                quality: None,
            },
        }
    }

    pub fn with_quality(mut self, quality: Option<u8>) -> Self {
        self.output.quality = quality;
        self
    }
}

/// Receives task-level progress in percent (0-100).
#[derive(Clone, Default)]
pub struct ProgressSink(Option<Arc<dyn Fn(f64) + Send + Sync>>);

impl ProgressSink {
    pub fn new(f: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn report(&self, percent: f64) {
        if let Some(f) = &self.0 {
            f(percent.clamp(0.0, 100.0));
        }
    }

    /// Maps 0-100 onto `start..start + span`, for one stage of a pipeline.
    pub fn scaled(&self, start: f64, span: f64) -> Self {
        match &self.0 {
            Some(f) => {
                let f = f.clone();
                Self::new(move |p| f(start + p.clamp(0.0, 100.0) * span / 100.0))
            }
            None => Self(None),
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProgressSink")
            .field(&self.0.is_some())
            .finish()
    }
}

/// Everything a backend needs to run one conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub source: PathBuf,
    pub dest_dir: PathBuf,
    pub spec: TargetSpec,
    pub context: ConversionContext,
    pub progress: ProgressSink,
    pub cancel: CancellationToken,
    /// Raw RGBA frames to feed the engine over stdin instead of `-i <source>`.
    pub frames: Option<Arc<RawFrames>>,
}

impl ConversionRequest {
    pub fn new(
        source: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
        spec: TargetSpec,
        context: ConversionContext,
    ) -> Self {
        Self {
            source: source.into(),
            dest_dir: dest_dir.into(),
            spec,
            context,
            progress: ProgressSink::none(),
            cancel: CancellationToken::new(),
            frames: None,
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

    pub fn with_frames(mut self, frames: RawFrames) -> Self {
        self.frames = Some(Arc::new(frames));
        self
    }

    /// Request for an intermediate stage. Shares progress and cancellation.
    pub fn stage(&self, source: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>, spec: TargetSpec) -> Self {
        let source = source.into();
        let input_ext = super::format::extension_of(&source);
        let context = ConversionContext::new(&input_ext, &spec.format, false).with_quality(spec.quality);
        Self {
            source,
            dest_dir: dest_dir.into(),
            spec,
            context,
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
            frames: None,
        }
    }

    /// `<dest_dir>/<file_name>.<format>`
    pub fn output_path(&self) -> PathBuf {
        self.dest_dir.join(self.spec.output_file_name())
    }

    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.source.as_os_str().is_empty() {
            return Err(ConvertError::MissingArgument { what: "source" });
        }
        if self.dest_dir.as_os_str().is_empty() {
            return Err(ConvertError::MissingArgument { what: "output" });
        }
        if self.spec.format.is_empty() {
            return Err(ConvertError::MissingArgument { what: "format" });
        }
        if self.spec.file_name.is_empty() {
            return Err(ConvertError::MissingArgument { what: "fileName" });
        }
        Ok(())
    }
}

/// Decoded RGBA frames of equal size.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrames {
    pub width: u32,
    pub height: u32,
    /// Frames per second of the decoded sequence.
    pub fps: f64,
    pub frames: Arc<Vec<Vec<u8>>>,
}

impl RawFrames {
    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frames.len() as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Successful conversion result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOutput {
    pub output_path: PathBuf,
    pub backend: BackendKind,
}

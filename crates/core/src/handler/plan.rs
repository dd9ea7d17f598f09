//! Which backends a handler family tries, and in what shape.

use serde::Serialize;
use std::fmt;

use crate::converter::format::handler_family;
use crate::converter::{BackendKind, BackendSet, ConversionContext, ConvertError};

/// Ordered backends to attempt; the first success wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan(Vec<BackendKind>);

impl Plan {
    pub fn new(steps: impl Into<Vec<BackendKind>>) -> Self {
        Self(steps.into())
    }

    pub fn single(kind: BackendKind) -> Self {
        Self(vec![kind])
    }

    pub fn steps(&self) -> &[BackendKind] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.0.iter().map(BackendKind::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// How one conversion is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Fallback(Plan),
    /// `decode` writes an intermediate PNG, `encode` turns it into the target.
    ViaPng {
        decode: BackendKind,
        encode: BackendKind,
        /// Apply the size policy while decoding too.
        carry_size: bool,
        quality: Option<u8>,
    },
    /// Decode animation frames in-process and pipe them to the transcoder.
    DecodedFrames,
}

/// Handler families, keyed by input extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerFamily {
    /// JPEG and anything without its own rules.
    Image,
    Avif,
    Bmp,
    Png,
    Gif,
    Webp,
    /// EXR, HDR, ICO, INSP, TGA and TIFF, which need the engine's pixel
    /// format handling first.
    Precise,
    Heic,
    Jxl,
    Svg,
    Video,
}

impl HandlerFamily {
    /// The family owning an input extension, `None` if it is not supported.
    pub fn for_input(ext: &str) -> Option<Self> {
        let family = match handler_family(ext).as_str() {
            "jpg" => Self::Image,
            "avif" => Self::Avif,
            "bmp" => Self::Bmp,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            "exr" | "hdr" | "ico" | "insp" | "tga" | "tiff" => Self::Precise,
            "heic" => Self::Heic,
            "jxl" => Self::Jxl,
            "svg" => Self::Svg,
            "video" => Self::Video,
            _ => return None,
        };
        Some(family)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Avif => "avif",
            Self::Bmp => "bmp",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Precise => "precise",
            Self::Heic => "heic",
            Self::Jxl => "jxl",
            Self::Svg => "svg",
            Self::Video => "video",
        }
    }

    /// Ordered backends for a direct conversion.
    pub fn plan(&self, ctx: &ConversionContext) -> Result<Plan, ConvertError> {
        reject_disabled_output(ctx)?;

        use BackendKind::*;
        let animated = ctx.input.animated;
        let plan = match self {
            Self::Image => default_plan(ctx),
            Self::Avif if ctx.output.ext == "avif" => Plan::single(Transcode),
            Self::Avif | Self::Precise => Plan::new([Transcode, Raster]),
            Self::Bmp => Plan::new([Raster, Transcode]),
            Self::Png | Self::Gif | Self::Webp if animated => Plan::single(Transcode),
            Self::Png | Self::Gif | Self::Webp => Plan::new([Raster, Transcode]),
            Self::Heic => Plan::single(Heic),
            Self::Jxl => Plan::single(Jxl),
            Self::Svg => Plan::single(Vector),
            Self::Video => Plan::single(Transcode),
        };
        Ok(plan)
    }

    /// Picks between a direct plan and a staged pipeline.
    pub fn strategy(&self, ctx: &ConversionContext, backends: &BackendSet) -> Result<Strategy, ConvertError> {
        reject_disabled_output(ctx)?;

        let out = ctx.output.ext.as_str();
        let strategy = match self {
            Self::Svg
                if ctx.output.is_lossy_webp()
                    || !backends.get(BackendKind::Raster).supports_output(out) =>
            {
                Strategy::ViaPng {
                    decode: BackendKind::Vector,
                    encode: BackendKind::Transcode,
                    carry_size: true,
                    quality: Some(100),
                }
            }
            Self::Jxl if out != "png" => Strategy::ViaPng {
                decode: BackendKind::Jxl,
                encode: BackendKind::Transcode,
                carry_size: true,
                quality: None,
            },
            Self::Heic if !backends.get(BackendKind::Heic).supports_output(out) => Strategy::ViaPng {
                decode: BackendKind::Heic,
                encode: BackendKind::Transcode,
                carry_size: false,
                quality: None,
            },
            Self::Webp if ctx.input.animated => Strategy::DecodedFrames,
            _ => Strategy::Fallback(self.plan(ctx)?),
        };
        Ok(strategy)
    }
}

impl fmt::Display for HandlerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Animated input or GIF output goes to the engine first; stills are
/// cheaper in-process.
fn default_plan(ctx: &ConversionContext) -> Plan {
    if ctx.output.ext == "gif" || ctx.input.animated {
        Plan::new([BackendKind::Transcode, BackendKind::Raster])
    } else {
        Plan::new([BackendKind::Raster, BackendKind::Transcode])
    }
}

fn reject_disabled_output(ctx: &ConversionContext) -> Result<(), ConvertError> {
    if handler_family(&ctx.output.ext) == "heic" {
        return Err(ConvertError::OutputFormatDisabled {
            format: ctx.output.ext.clone(),
        });
    }
    Ok(())
}

//! Typed construction of ffmpeg filter expressions.
//!
//! The expressions are evaluated by ffmpeg against the decoded frame, so
//! sizes never need to be probed up front. Numbers are validated here before
//! they are interpolated.

use std::fmt;

use crate::converter::format::{is_opaque_output, may_carry_alpha};
use crate::converter::{ConvertError, SizePolicy};

/// Flattens alpha onto an opaque white background.
pub const WHITE_BACKGROUND_FILTER: &str =
    "split[orig][bg];[bg]drawbox=color=white@1.0:replace=1:t=fill[bgwhite];[bgwhite][orig]overlay";

/// Whether an input with `source_ext` needs flattening for `output_format`.
pub fn needs_background(source_ext: &str, output_format: &str) -> bool {
    is_opaque_output(output_format) && may_carry_alpha(source_ext)
}

/// A positive pixel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixels(u32);

impl Pixels {
    pub fn new(value: u32) -> Result<Self, ConvertError> {
        if value == 0 {
            return Err(ConvertError::invalid_spec("size values must be positive"));
        }
        Ok(Self(value))
    }

    /// Rounds up to the next even number.
    pub fn even(self) -> Self {
        Self(self.0.div_ceil(2) * 2)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Width,
    Height,
}

impl Intrinsic {
    fn var(self) -> &'static str {
        match self {
            Self::Width => "iw",
            Self::Height => "ih",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    AtMost,
    AtLeast,
}

impl Bound {
    fn func(self) -> &'static str {
        match self {
            Self::AtMost => "min",
            Self::AtLeast => "max",
        }
    }
}

/// One axis of a `scale` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDim {
    /// Follow the aspect ratio; `even` asks ffmpeg for an even result.
    Auto { even: bool },
    Fixed(Pixels),
    /// Clamp the intrinsic size against `value`.
    Clamp {
        bound: Bound,
        of: Intrinsic,
        value: Pixels,
        even: bool,
    },
}

impl fmt::Display for ScaleDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Auto { even: false } => f.write_str("-1"),
            Self::Auto { even: true } => f.write_str("-2"),
            Self::Fixed(px) => write!(f, "{}", px),
            // The quotes keep the comma from splitting the filter chain.
            Self::Clamp {
                bound,
                of,
                value,
                even: false,
            } => write!(f, "{}'({},{})'", bound.func(), of.var(), value),
            Self::Clamp {
                bound,
                of,
                value,
                even: true,
            } => write!(f, "ceil({}'({},{})'/2)*2", bound.func(), of.var(), value),
        }
    }
}

/// A complete `scale=...` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    Axes { width: ScaleDim, height: ScaleDim },
    /// Axes picked by orientation: `landscape` when `iw > ih`.
    Oriented {
        landscape: (ScaleDim, ScaleDim),
        portrait: (ScaleDim, ScaleDim),
    },
}

impl fmt::Display for ScaleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Axes { width, height } => write!(f, "scale={}:{}", width, height),
            Self::Oriented {
                landscape,
                portrait,
            } => write!(
                f,
                "scale='if(gt(iw,ih),{},{})':'if(gt(iw,ih),{},{})'",
                landscape.0, portrait.0, landscape.1, portrait.1
            ),
        }
    }
}

/// Builds the scale filter for a size policy. `even` applies video-codec
/// rounding: values round up to even and the free axis uses `-2`.
pub fn size_filter(size: &SizePolicy, even: bool) -> Result<Option<ScaleFilter>, ConvertError> {
    let px = |v: u32| -> Result<Pixels, ConvertError> {
        let p = Pixels::new(v)?;
        Ok(if even { p.even() } else { p })
    };
    let auto = ScaleDim::Auto { even };
    let clamp = |bound, of, v| -> Result<ScaleDim, ConvertError> {
        Ok(ScaleDim::Clamp {
            bound,
            of,
            value: px(v)?,
            even,
        })
    };

    let filter = match *size {
        SizePolicy::Original => return Ok(None),
        SizePolicy::MaxWidth(v) => ScaleFilter::Axes {
            width: clamp(Bound::AtMost, Intrinsic::Width, v)?,
            height: auto,
        },
        SizePolicy::MaxHeight(v) => ScaleFilter::Axes {
            width: auto,
            height: clamp(Bound::AtMost, Intrinsic::Height, v)?,
        },
        SizePolicy::MinWidth(v) => ScaleFilter::Axes {
            width: clamp(Bound::AtLeast, Intrinsic::Width, v)?,
            height: auto,
        },
        SizePolicy::MinHeight(v) => ScaleFilter::Axes {
            width: auto,
            height: clamp(Bound::AtLeast, Intrinsic::Height, v)?,
        },
        SizePolicy::MaxSide(v) => {
            let fixed = ScaleDim::Fixed(px(v)?);
            ScaleFilter::Oriented {
                landscape: (fixed, auto),
                portrait: (auto, fixed),
            }
        }
        SizePolicy::MinSide(v) => {
            let fixed = ScaleDim::Fixed(px(v)?);
            ScaleFilter::Oriented {
                landscape: (auto, fixed),
                portrait: (fixed, auto),
            }
        }
        SizePolicy::Exact { width, height } => {
            let dim = |v: Option<u32>| -> Result<ScaleDim, ConvertError> {
                Ok(match v {
                    Some(v) => ScaleDim::Fixed(px(v)?),
                    None => auto,
                })
            };
            if width.is_none() && height.is_none() {
                return Ok(None);
            }
            ScaleFilter::Axes {
                width: dim(width)?,
                height: dim(height)?,
            }
        }
    };

    Ok(Some(filter))
}

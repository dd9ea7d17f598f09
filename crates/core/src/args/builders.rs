//! Per-format argument builders.
//!
//! Every builder prepends its codec arguments to the shared base sequence
//! `quality, -vf filters, frames, output`. GIF is the exception: its palette
//! chain replaces `-vf` entirely.

use std::path::{Path, PathBuf};

use super::filter::{needs_background, size_filter, WHITE_BACKGROUND_FILTER};
use super::ico::icon_filter;
use super::quality;
use crate::converter::capabilities::EncoderCapabilities;
use crate::converter::format::{builder_format, extension_of, is_animation_capable};
use crate::converter::{Codec, ConvertError, TargetSpec};

/// Quality used by builders that always need one.
pub const DEFAULT_QUALITY: u8 = 80;

/// Inputs shared by every builder.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub source: &'a Path,
    pub dest_dir: &'a Path,
    pub spec: &'a TargetSpec,
    pub animated: bool,
    pub capabilities: &'a EncoderCapabilities,
}

impl BuildContext<'_> {
    fn source_ext(&self) -> String {
        extension_of(self.source)
    }

    /// Where the engine writes. Animated PNG is written as `.apng` first.
    pub fn engine_output_path(&self) -> PathBuf {
        if self.animated && builder_format(&self.spec.format) == "png" {
            return self.dest_dir.join(format!("{}.apng", self.spec.file_name));
        }
        self.dest_dir.join(self.spec.output_file_name())
    }

    fn fps_args(&self) -> Vec<String> {
        match self.spec.animated_fps.explicit() {
            Some(fps) => vec!["-r".to_string(), fps.to_string()],
            None => Vec::new(),
        }
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn qscale_args(q: Option<u8>) -> Vec<String> {
    match q {
        Some(q) => vec!["-q:v".to_string(), quality::image_qscale(q).to_string()],
        None => Vec::new(),
    }
}

/// The shared tail: quality, filter chain, frame limit, output path.
struct Base {
    quality: Vec<String>,
    size_filter: Option<String>,
    single_frame: bool,
}

impl Base {
    fn image(cx: &BuildContext<'_>) -> Result<Self, ConvertError> {
        Ok(Self {
            quality: qscale_args(cx.spec.quality),
            size_filter: size_filter(&cx.spec.size, false)?.map(|f| f.to_string()),
            single_frame: !is_animation_capable(&cx.spec.format),
        })
    }

    fn render(self, cx: &BuildContext<'_>) -> Vec<String> {
        let mut args = self.quality;

        let mut filters = Vec::new();
        if needs_background(&cx.source_ext(), &cx.spec.format) {
            filters.push(WHITE_BACKGROUND_FILTER.to_string());
        }
        filters.extend(self.size_filter);
        if !filters.is_empty() {
            args.push("-vf".to_string());
            args.push(filters.join(","));
        }

        if self.single_frame {
            args.extend(strings(&["-frames:v", "1"]));
        }

        args.push(cx.engine_output_path().to_string_lossy().into_owned());
        args
    }
}

/// One builder per output format the engine can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBuilder {
    Jpg,
    Bmp,
    Tiff,
    Tga,
    Exr,
    Hdr,
    Dds,
    Ico,
    Avif,
    Webp,
    Png,
    Gif,
    Mp4,
    Webm,
}

impl OutputBuilder {
    /// Resolves aliases (`jpeg`, `tif`, ...) to a builder.
    pub fn for_format(format: &str) -> Option<Self> {
        Some(match builder_format(format).as_str() {
            "jpg" => Self::Jpg,
            "bmp" => Self::Bmp,
            "tiff" => Self::Tiff,
            "tga" => Self::Tga,
            "exr" => Self::Exr,
            "hdr" => Self::Hdr,
            "dds" => Self::Dds,
            "ico" => Self::Ico,
            "avif" => Self::Avif,
            "webp" => Self::Webp,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "mp4" => Self::Mp4,
            "webm" => Self::Webm,
            _ => return None,
        })
    }

    pub fn build(&self, cx: &BuildContext<'_>) -> Result<Vec<String>, ConvertError> {
        let spec = cx.spec;
        let mut args = match self {
            Self::Jpg => Vec::new(),
            Self::Bmp => strings(&["-frames:v", "1"]),
            Self::Tiff => strings(&["-pix_fmt", "rgba"]),
            Self::Tga => strings(&["-c:v", "targa", "-pix_fmt", "bgra"]),
            Self::Exr => strings(&["-pix_fmt", "gbrapf32le"]),
            Self::Hdr => strings(&["-c:v", "hdr", "-pix_fmt", "rgb24"]),
            Self::Dds => strings(&["-c:v", "dds", "-pix_fmt", "bgra"]),
            Self::Ico => strings(&["-pix_fmt", "bgra"]),
            Self::Avif => {
                let crf = quality::avif_crf(spec.quality.unwrap_or(DEFAULT_QUALITY));
                let mut args = strings(&["-c:v", "libaom-av1", "-crf"]);
                args.push(crf.to_string());
                args.extend(strings(&[
                    "-strict",
                    "experimental",
                    "-pix_fmt",
                    "yuva420p",
                    "-cpu-used",
                    "8",
                    "-row-mt",
                    "1",
                    "-tiles",
                    "2x2",
                ]));
                args
            }
            Self::Webp if cx.animated => {
                let mut args = strings(&[
                    "-c:v",
                    "libwebp_anim",
                    "-lossless",
                    "1",
                    "-pix_fmt",
                    "rgb24",
                    "-loop",
                    "0",
                ]);
                args.extend(cx.fps_args());
                args
            }
            Self::Webp => strings(&["-c:v", "libwebp"]),
            Self::Png if cx.animated => {
                let mut args = strings(&["-c:v", "apng", "-plays", "0"]);
                args.extend(cx.fps_args());
                args
            }
            Self::Png => strings(&["-c:v", "png"]),
            Self::Gif => return self.build_gif(cx),
            Self::Mp4 => return self.build_mp4(cx),
            Self::Webm => return self.build_webm(cx),
        };

        let mut base = Base::image(cx)?;
        match self {
            // The frame limit is already part of the prefix.
            Self::Bmp => base.single_frame = false,
            Self::Ico => base.size_filter = Some(icon_filter(&spec.size)),
            // Carried by -crf above.
            Self::Avif => base.quality.clear(),
            Self::Webp => {
                let flag = if cx.animated { "-qscale" } else { "-q:v" };
                base.quality = match spec.quality {
                    Some(q) => vec![flag.to_string(), q.to_string()],
                    None => Vec::new(),
                };
            }
            _ => {}
        }

        args.extend(base.render(cx));
        Ok(args)
    }

    fn build_gif(&self, cx: &BuildContext<'_>) -> Result<Vec<String>, ConvertError> {
        let colors = match cx.spec.quality {
            Some(q) => quality::gif_palette_colors(q),
            None => 256,
        };
        let palette = format!(
            "split[a][b];[a]palettegen=max_colors={}[p];[b][p]paletteuse",
            colors
        );
        let chain = match size_filter(&cx.spec.size, false)? {
            Some(size) => format!("[0:v]{}[processed];[processed]{}", size, palette),
            None => palette,
        };

        let mut args = strings(&["-vcodec", "gif", "-loop", "0"]);
        args.extend(cx.fps_args());
        args.push("-filter_complex".to_string());
        args.push(chain);
        args.push(cx.engine_output_path().to_string_lossy().into_owned());
        Ok(args)
    }

    fn build_mp4(&self, cx: &BuildContext<'_>) -> Result<Vec<String>, ConvertError> {
        let codec = cx.spec.codec.unwrap_or(Codec::H264);
        if matches!(codec, Codec::Vp8 | Codec::Vp9) {
            return Err(ConvertError::invalid_spec(format!(
                "codec {} cannot be written to mp4",
                codec
            )));
        }
        let encoder = cx.capabilities.encoder_for(codec);

        let mut args = vec!["-c:v".to_string(), encoder.name.to_string()];
        if !encoder.hardware {
            args.extend(strings(&["-preset", "ultrafast"]));
        }
        args.extend(cx.fps_args());

        let crf = quality::mp4_crf(cx.spec.quality.unwrap_or(DEFAULT_QUALITY));
        args.extend(video_base(cx, crf)?.render(cx));
        Ok(args)
    }

    fn build_webm(&self, cx: &BuildContext<'_>) -> Result<Vec<String>, ConvertError> {
        let codec = cx.spec.codec.unwrap_or(Codec::Vp9);
        if matches!(codec, Codec::H264 | Codec::H265) {
            return Err(ConvertError::invalid_spec(format!(
                "codec {} cannot be written to webm",
                codec
            )));
        }
        let encoder = cx.capabilities.encoder_for(codec);

        let mut args = vec!["-c:v".to_string(), encoder.name.to_string()];
        args.extend(strings(&["-pix_fmt", "yuva420p", "-cpu-used", "5"]));
        if codec == Codec::Vp8 {
            args.extend(strings(&["-auto-alt-ref", "0"]));
        }
        args.extend(cx.fps_args());

        let crf = quality::webm_crf(cx.spec.quality.unwrap_or(DEFAULT_QUALITY));
        args.extend(video_base(cx, crf)?.render(cx));
        Ok(args)
    }
}

fn video_base(cx: &BuildContext<'_>, crf: u32) -> Result<Base, ConvertError> {
    Ok(Base {
        quality: vec!["-crf".to_string(), crf.to_string()],
        size_filter: size_filter(&cx.spec.size, true)?.map(|f| f.to_string()),
        single_frame: false,
    })
}

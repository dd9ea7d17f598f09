//! Converter backends.
//!
//! Every backend implements [`ConverterBackend`]: convert one source into
//! `<dest_dir>/<file_name>.<format>` or fail with a [`ConvertError`]. The set
//! of backends is closed ([`BackendKind`]) and a [`BackendSet`] holds one of
//! each, so plans name backends by kind rather than by string.
//!
//! - [`TranscodeBackend`] runs ffmpeg with arguments from
//!   [`crate::args::ArgumentSynthesizer`].
//! - [`RasterBackend`] uses the `image` crate in-process.
//! - [`VectorBackend`], [`HeicBackend`] and [`JxlBackend`] wrap single-purpose
//!   decoders (`rsvg-convert`, `sips`/`heif-convert`, `djxl`).

pub mod capabilities;
mod config;
mod error;
mod ffmpeg;
pub mod format;
mod heic;
pub(crate) mod imaging;
mod jxl;
mod raster;
mod traits;
mod types;
mod validate;
mod vector;
mod webp_frames;

use std::sync::Arc;

use crate::args::ArgumentSynthesizer;
use crate::probe::MediaProbe;
use crate::process::ProcessRegistry;

pub use capabilities::{EncoderCapabilities, GpuVendor, HostOs};
pub use config::{ConverterConfig, ToolPaths};
pub use error::{BackendFailure, ConvertError};
pub use ffmpeg::TranscodeBackend;
pub use heic::HeicBackend;
pub use jxl::JxlBackend;
pub use raster::RasterBackend;
pub use traits::{BackendKind, CancellableConversion, ConverterBackend, TerminateFn};
pub use types::{
    AnimatedFps, Codec, ConversionContext, ConversionRequest, ConvertOutput, InputTraits,
    OutputTraits, ProgressSink, RawFrames, SizePolicy, SizeType, TargetSpec, TaskOptions,
};
pub use validate::validate_output_file;
pub use vector::VectorBackend;
pub use webp_frames::decode_webp_frames;

/// One backend of each kind.
#[derive(Clone)]
pub struct BackendSet {
    transcode: Arc<dyn ConverterBackend>,
    raster: Arc<dyn ConverterBackend>,
    vector: Arc<dyn ConverterBackend>,
    heic: Arc<dyn ConverterBackend>,
    jxl: Arc<dyn ConverterBackend>,
}

impl BackendSet {
    pub fn new(
        transcode: Arc<dyn ConverterBackend>,
        raster: Arc<dyn ConverterBackend>,
        vector: Arc<dyn ConverterBackend>,
        heic: Arc<dyn ConverterBackend>,
        jxl: Arc<dyn ConverterBackend>,
    ) -> Self {
        Self {
            transcode,
            raster,
            vector,
            heic,
            jxl,
        }
    }

    /// The production backends, sharing one process registry.
    pub fn from_config(
        tools: &ToolPaths,
        config: &ConverterConfig,
        registry: &ProcessRegistry,
        capabilities: EncoderCapabilities,
        probe: Arc<dyn MediaProbe>,
    ) -> Self {
        let transcode = TranscodeBackend::new(
            &tools.ffmpeg_path,
            config.clone(),
            registry.clone(),
            ArgumentSynthesizer::new(capabilities),
        )
        .with_probe(probe);

        Self {
            transcode: Arc::new(transcode),
            raster: Arc::new(RasterBackend::new(config.clone())),
            vector: Arc::new(VectorBackend::new(
                &tools.rsvg_convert_path,
                config.clone(),
                registry.clone(),
            )),
            heic: Arc::new(HeicBackend::new(tools, config.clone(), registry.clone())),
            jxl: Arc::new(JxlBackend::new(&tools.djxl_path, config.clone(), registry.clone())),
        }
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn ConverterBackend> {
        match kind {
            BackendKind::Transcode => &self.transcode,
            BackendKind::Raster => &self.raster,
            BackendKind::Vector => &self.vector,
            BackendKind::Heic => &self.heic,
            BackendKind::Jxl => &self.jxl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProbe;

    #[test]
    fn test_backend_set_resolves_every_kind() {
        let set = BackendSet::from_config(
            &ToolPaths::default(),
            &ConverterConfig::default(),
            &ProcessRegistry::new(),
            EncoderCapabilities::software_only(),
            Arc::new(MockProbe::new()),
        );
        for kind in [
            BackendKind::Transcode,
            BackendKind::Raster,
            BackendKind::Vector,
            BackendKind::Heic,
            BackendKind::Jxl,
        ] {
            assert_eq!(set.get(kind).kind(), kind);
        }
    }
}

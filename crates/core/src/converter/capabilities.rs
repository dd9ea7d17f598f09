//! Hardware encoder selection.
//!
//! This is a pure lookup keyed by (codec, OS, GPU vendor). Nothing is probed:
//! a hardware encoder missing at run time surfaces as an ffmpeg failure, and
//! the plan falls through like any other backend error.

use serde::{Deserialize, Serialize};

use super::types::Codec;

/// GPU vendor the host reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    /// Unknown or no GPU. Always selects software encoders.
    #[default]
    None,
    Nvidia,
    Amd,
    Intel,
    Apple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
    Other,
}

impl HostOs {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }
}

/// The encoder picked for a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderChoice {
    /// ffmpeg encoder name.
    pub name: &'static str,
    pub hardware: bool,
}

impl EncoderChoice {
    const fn software(name: &'static str) -> Self {
        Self {
            name,
            hardware: false,
        }
    }

    const fn hardware(name: &'static str) -> Self {
        Self {
            name,
            hardware: true,
        }
    }
}

/// Software encoder for each codec.
pub fn software_encoder(codec: Codec) -> EncoderChoice {
    match codec {
        Codec::H264 => EncoderChoice::software("libx264"),
        Codec::H265 => EncoderChoice::software("libx265"),
        Codec::Vp8 => EncoderChoice::software("libvpx"),
        Codec::Vp9 => EncoderChoice::software("libvpx-vp9"),
    }
}

/// Resolves the encoder for `codec` on `os` with a `vendor` GPU.
pub fn resolve_video_encoder(codec: Codec, os: HostOs, vendor: GpuVendor) -> EncoderChoice {
    use GpuVendor as V;
    use HostOs as O;

    if vendor == V::None {
        return software_encoder(codec);
    }

    let hardware = match (codec, os, vendor) {
        (Codec::H264, O::MacOs, _) => Some("h264_videotoolbox"),
        (Codec::H265, O::MacOs, _) => Some("hevc_videotoolbox"),
        (Codec::H264, O::Windows | O::Linux, V::Nvidia) => Some("h264_nvenc"),
        (Codec::H265, O::Windows | O::Linux, V::Nvidia) => Some("hevc_nvenc"),
        (Codec::H264, O::Windows, V::Amd) => Some("h264_amf"),
        (Codec::H265, O::Windows, V::Amd) => Some("hevc_amf"),
        (Codec::H264, O::Windows | O::Linux, V::Intel) => Some("h264_qsv"),
        (Codec::H265, O::Windows | O::Linux, V::Intel) => Some("hevc_qsv"),
        (Codec::Vp9, O::Windows | O::Linux, V::Intel) => Some("vp9_qsv"),
        _ => None,
    };

    hardware
        .map(EncoderChoice::hardware)
        .unwrap_or_else(|| software_encoder(codec))
}

/// Host facts the encoder lookup depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderCapabilities {
    pub os: HostOs,
    pub gpu_vendor: GpuVendor,
    pub hardware_enabled: bool,
}

impl Default for EncoderCapabilities {
    fn default() -> Self {
        Self::software_only()
    }
}

impl EncoderCapabilities {
    pub fn new(os: HostOs, gpu_vendor: GpuVendor) -> Self {
        Self {
            os,
            gpu_vendor,
            hardware_enabled: true,
        }
    }

    /// Current OS with the given vendor.
    pub fn detect(gpu_vendor: GpuVendor, hardware_enabled: bool) -> Self {
        Self {
            os: HostOs::current(),
            gpu_vendor,
            hardware_enabled,
        }
    }

    pub fn software_only() -> Self {
        Self {
            os: HostOs::current(),
            gpu_vendor: GpuVendor::None,
            hardware_enabled: false,
        }
    }

    pub fn encoder_for(&self, codec: Codec) -> EncoderChoice {
        if !self.hardware_enabled {
            return software_encoder(codec);
        }
        resolve_video_encoder(codec, self.os, self.gpu_vendor)
    }

    pub fn has_hardware_encoder(&self) -> bool {
        [Codec::H264, Codec::H265, Codec::Vp8, Codec::Vp9]
            .into_iter()
            .any(|c| self.encoder_for(c).hardware)
    }
}

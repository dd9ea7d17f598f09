use serde::{Deserialize, Serialize};

use crate::converter::{ConverterConfig, EncoderCapabilities, GpuVendor, ToolPaths};
use crate::orchestrator::OrchestratorConfig;

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolPaths,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub queue: OrchestratorConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
}

/// Hardware encoder configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HardwareConfig {
    /// GPU vendor used for encoder lookup. Nothing is probed.
    #[serde(default)]
    pub gpu_vendor: GpuVendor,
    /// Set to false to always use software encoders.
    #[serde(default = "default_hardware_enabled")]
    pub enabled: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            gpu_vendor: GpuVendor::default(),
            enabled: default_hardware_enabled(),
        }
    }
}

fn default_hardware_enabled() -> bool {
    true
}

impl HardwareConfig {
    /// Encoder capabilities of this host under this configuration.
    pub fn capabilities(&self) -> EncoderCapabilities {
        EncoderCapabilities::detect(self.gpu_vendor, self.enabled)
    }
}

pub mod args;
pub mod config;
pub mod converter;
pub mod engine;
pub mod handler;
pub mod host;
pub mod metrics;
pub mod orchestrator;
pub mod probe;
pub mod process;
pub mod queue;
pub mod testing;

pub use args::ArgumentSynthesizer;
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, HardwareConfig,
};
pub use converter::{
    BackendKind, BackendSet, ConvertError, ConvertOutput, ConverterBackend, ConverterConfig,
    SizePolicy, SizeType, TargetSpec, TaskOptions, ToolPaths,
};
pub use engine::ConversionEngine;
pub use handler::{ConversionJob, ConversionServices, FormatHandler};
pub use host::{HostError, HostItem, HostLibrary, NoopHost};
pub use orchestrator::{
    BatchCallbacks, BatchOrchestrator, BatchResult, BatchTask, OrchestratorConfig,
    OrchestratorError, TaskFailure, TaskOutcome, TaskSuccess,
};
pub use probe::{FfprobeProbe, MediaInfo, MediaProbe};
pub use process::ProcessRegistry;
pub use queue::{ConversionQueue, Outcome};

//! The conversion engine: every shared component, built once from config.
//!
//! Owned by whoever runs batches. Dropping it or calling
//! [`ConversionEngine::shutdown`] is the only teardown there is.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::converter::BackendSet;
use crate::handler::ConversionServices;
use crate::host::{HostLibrary, NoopHost};
use crate::orchestrator::{BatchOrchestrator, OrchestratorConfig};
use crate::probe::{FfprobeProbe, MediaProbe};
use crate::process::ProcessRegistry;

pub struct ConversionEngine {
    registry: ProcessRegistry,
    services: Arc<ConversionServices>,
    orchestrator: Arc<BatchOrchestrator>,
}

impl ConversionEngine {
    /// Builds the production backends with no host library attached.
    pub fn from_config(config: &Config) -> Self {
        Self::with_host(config, Arc::new(NoopHost))
    }

    pub fn with_host(config: &Config, host: Arc<dyn HostLibrary>) -> Self {
        let registry = ProcessRegistry::with_grace_period(config.converter.kill_grace_period());
        let probe: Arc<dyn MediaProbe> = Arc::new(FfprobeProbe::new(
            &config.tools.ffprobe_path,
            registry.clone(),
            config.converter.probe_timeout(),
        ));
        let capabilities = config.hardware.capabilities();
        info!(
            os = ?capabilities.os,
            gpu_vendor = ?capabilities.gpu_vendor,
            hardware = capabilities.has_hardware_encoder(),
            "Building conversion engine"
        );

        let backends = BackendSet::from_config(
            &config.tools,
            &config.converter,
            &registry,
            capabilities,
            Arc::clone(&probe),
        );
        let services = Arc::new(ConversionServices::new(
            backends,
            probe,
            config.converter.temp_dir.clone(),
        ));
        let orchestrator = Arc::new(BatchOrchestrator::new(
            config.queue.clone(),
            Arc::clone(&services),
            host,
        ));

        Self {
            registry,
            services,
            orchestrator,
        }
    }

    /// An engine over caller-supplied services, for tests and embedding.
    pub fn with_services(
        queue: OrchestratorConfig,
        services: Arc<ConversionServices>,
        host: Arc<dyn HostLibrary>,
    ) -> Self {
        let orchestrator = Arc::new(BatchOrchestrator::new(queue, Arc::clone(&services), host));
        Self {
            registry: ProcessRegistry::new(),
            services,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> Arc<BatchOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn services(&self) -> Arc<ConversionServices> {
        Arc::clone(&self.services)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Cancels any running batch, then kills whatever processes are left.
    pub fn shutdown(&self) {
        if self.orchestrator.is_running() {
            self.orchestrator.cancel();
        }
        let killed = self.registry.kill_all();
        if killed > 0 {
            warn!(killed, "Killed leftover external processes");
        }
    }
}

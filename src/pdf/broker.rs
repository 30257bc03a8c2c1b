//! Application-root service wiring the registry, executor and gateway

use std::sync::Arc;

use super::backend::DocumentBackend;
use super::gateway::RenderGateway;
use super::registry::DocumentRegistry;
use super::service::{RenderExecutor, default_worker_count};
use crate::settings::Settings;

/// Owns everything needed to open documents and render their pages.
///
/// Construct one at the application root and pass references down. Dropping
/// it stops the worker pool once the work already queued has run.
pub struct PageBroker {
    gateway: RenderGateway,
    registry: Arc<DocumentRegistry>,
    // Declared last so the pool outlives the handles above during drop
    executor: RenderExecutor,
}

impl PageBroker {
    /// Start a broker with `num_workers` render threads (0 picks one per core)
    pub fn new(backend: Arc<dyn DocumentBackend>, num_workers: usize) -> std::io::Result<Self> {
        let num_workers = if num_workers == 0 {
            default_worker_count()
        } else {
            num_workers
        };

        let executor = RenderExecutor::new(num_workers)?;
        let registry = Arc::new(DocumentRegistry::new(backend, executor.queue())?);
        let gateway = RenderGateway::new(Arc::clone(&registry), executor.queue());

        Ok(Self {
            gateway,
            registry,
            executor,
        })
    }

    pub fn from_settings(
        backend: Arc<dyn DocumentBackend>,
        settings: &Settings,
    ) -> std::io::Result<Self> {
        Self::new(backend, settings.workers)
    }

    #[must_use]
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    #[must_use]
    pub fn gateway(&self) -> &RenderGateway {
        &self.gateway
    }

    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.executor.num_workers()
    }

    /// Stop accepting work. Jobs already queued still run; later renders
    /// resolve with `ExecutorStopped`.
    pub fn shutdown(&self) {
        self.executor.shutdown();
    }
}

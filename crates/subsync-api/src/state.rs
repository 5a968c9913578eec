//! Application state.

use subsync_worker::{SubsyncService, WorkerConfig, WorkerResult};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub service: SubsyncService,
}

impl AppState {
    /// Create new application state and its storage directories.
    pub async fn new(config: ApiConfig, worker_config: WorkerConfig) -> WorkerResult<Self> {
        Self::with_service(config, SubsyncService::new(worker_config)).await
    }

    /// Wrap an already built service.
    pub async fn with_service(config: ApiConfig, service: SubsyncService) -> WorkerResult<Self> {
        service.prepare().await?;
        Ok(Self { config, service })
    }
}

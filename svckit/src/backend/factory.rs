// svckit/src/backend/factory.rs
//
// Factory Pattern for runtime backend selection
// Supports: hosted (PostgREST + realtime), in-memory mock
//

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BackendConfig;
use crate::errors::SyncError;
use super::hosted::HostedBackend;
use super::memory::MemoryBackend;
use super::service::DataService;

/// Supported backend drivers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendDriver {
    Hosted,
    #[default]
    Memory,
}

impl From<&str> for BackendDriver {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "hosted" | "supabase" | "remote" => BackendDriver::Hosted,
            "memory" | "mock" | "demo" => BackendDriver::Memory,
            _ => BackendDriver::Memory, // Fall back to the mock data
        }
    }
}

impl From<String> for BackendDriver {
    fn from(s: String) -> Self {
        BackendDriver::from(s.as_str())
    }
}

/// Backend factory
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend for the given driver
    pub fn create(
        driver: BackendDriver,
        config: &BackendConfig,
    ) -> Result<Arc<dyn DataService>, SyncError> {
        info!("Creating backend with driver: {:?}", driver);

        match driver {
            BackendDriver::Hosted => Ok(Arc::new(HostedBackend::new(config)?)),
            BackendDriver::Memory => Ok(Arc::new(MemoryBackend::new())),
        }
    }

    /// Create from config (reads driver field from config)
    pub fn create_from_config(config: &BackendConfig) -> Result<Arc<dyn DataService>, SyncError> {
        let driver = BackendDriver::from(config.driver.as_str());
        Self::create(driver, config)
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the data service behind the feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// `hosted` for the managed service, `memory` for the in-process mock.
    pub driver: String,
    /// Project URL, e.g. `https://xyzcompany.supabase.co`.
    pub url: String,
    pub api_key: Option<String>,
    /// Bearer token for row-level security; falls back to `api_key`.
    pub access_token: Option<String>,
    pub schema: String,
    pub request_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            driver: "memory".to_string(),
            url: "http://localhost:54321".to_string(),
            api_key: None,
            access_token: None,
            schema: "public".to_string(),
            request_timeout_ms: 10_000,
            heartbeat_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

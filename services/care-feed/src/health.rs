use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::warn;

use svckit::backend::DataService;
use svckit::metrics;

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub driver: String,
    pub healthy: bool,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HealthChecker {
    service: Arc<dyn DataService>,
}

impl HealthChecker {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self { service }
    }

    pub async fn check_backend(&self) -> BackendHealth {
        let start = Instant::now();
        let result = self.service.health_check().await;
        let elapsed = start.elapsed();
        metrics::record_operation(
            "health_check",
            self.service.driver_name(),
            result.is_ok(),
            elapsed.as_secs_f64(),
        );

        if let Err(e) = &result {
            warn!("Backend health check failed: {}", e);
        }

        BackendHealth {
            driver: self.service.driver_name().to_string(),
            healthy: result.is_ok(),
            latency_ms: elapsed.as_secs_f64() * 1000.0,
            error: result.err().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svckit::backend::MemoryBackend;

    #[tokio::test]
    async fn test_memory_backend_healthy() {
        let checker = HealthChecker::new(Arc::new(MemoryBackend::new()));
        let health = checker.check_backend().await;
        assert!(health.healthy);
        assert_eq!(health.driver, "memory");
        assert!(health.error.is_none());
    }
}

// services/care-feed/src/runtime.rs
//
// Both feeds plus the backend and filter they share, started together.
//

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use svckit::backend::{BackendFactory, DataService, MemoryBackend};
use svckit::errors::SyncError;
use svckit::types::NotificationRecord;

use crate::appointments::AppointmentFeed;
use crate::config::CareFeedConfig;
use crate::filter::{FilterGovernor, RecordFilter};
use crate::mock::MockDataGenerator;
use crate::notice::NoticeSink;
use crate::notifications::NotificationFeed;

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedStats {
    pub appointments: usize,
    pub urgent: usize,
    pub notifications: usize,
    pub unread: usize,
    pub emergencies: usize,
}

pub struct CareFeeds {
    service: Arc<dyn DataService>,
    pub appointments: AppointmentFeed,
    pub notifications: NotificationFeed,
    governor: Arc<FilterGovernor>,
    demo: bool,
    generator: Mutex<Option<JoinHandle<()>>>,
}

impl CareFeeds {
    /// Start both feeds. In demo mode the backend is an in-memory mock seeded
    /// with sample data and fed by the mock generator.
    pub async fn start(
        config: &CareFeedConfig,
        demo: bool,
        notices: Arc<dyn NoticeSink>,
    ) -> Result<Self, SyncError> {
        let (service, generator): (Arc<dyn DataService>, Option<MockDataGenerator>) = if demo {
            let backend = Arc::new(MemoryBackend::new());
            let generator = MockDataGenerator::new(backend.clone());
            generator.seed();
            (backend as Arc<dyn DataService>, Some(generator))
        } else {
            (BackendFactory::create_from_config(&config.backend)?, None)
        };

        let governor = Arc::new(FilterGovernor::new(
            &config.feeds.filter,
            config.clinician.doctor_id.clone(),
        ));
        let filter: Arc<dyn RecordFilter<NotificationRecord>> = governor.clone();

        let appointments = AppointmentFeed::start(service.clone(), notices.clone(), None).await?;
        let notifications = NotificationFeed::start(service.clone(), notices, Some(filter)).await?;

        let generator = generator.map(|g| g.spawn(config.feeds.demo_tick()));
        info!(
            "Care feeds started (driver={}, demo={})",
            service.driver_name(),
            demo
        );

        Ok(Self {
            service,
            appointments,
            notifications,
            governor,
            demo,
            generator: Mutex::new(generator),
        })
    }

    pub fn service(&self) -> Arc<dyn DataService> {
        self.service.clone()
    }

    pub fn is_demo(&self) -> bool {
        self.demo
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            appointments: self.appointments.len(),
            urgent: self.appointments.urgent_count(),
            notifications: self.notifications.len(),
            unread: self.notifications.unread_count(),
            emergencies: self.notifications.emergency_count(),
        }
    }

    /// Apply a reloaded notification filter and resync the notification feed
    /// when it changed.
    pub async fn reload_filter(&self, config: &CareFeedConfig) {
        let changed = self
            .governor
            .reload_config(&config.feeds.filter, config.clinician.doctor_id.clone());
        if !changed {
            return;
        }
        if let Err(e) = self.notifications.resync().await {
            warn!("Notification resync after filter reload failed: {}", e);
        }
    }

    /// Stop the mock generator and close both feeds.
    pub async fn shutdown(&self) {
        if let Some(generator) = self.generator.lock().take() {
            generator.abort();
        }
        self.appointments.close().await;
        self.notifications.close().await;
        info!("Care feeds shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::RecordingNoticeSink;

    #[tokio::test]
    async fn test_demo_mode_loads_sample_data() {
        let sink = Arc::new(RecordingNoticeSink::new());
        let feeds = CareFeeds::start(&CareFeedConfig::default(), true, sink.clone())
            .await
            .unwrap();
        feeds.appointments.wait_until_loaded().await;
        feeds.notifications.wait_until_loaded().await;

        let stats = feeds.stats();
        assert_eq!(stats.appointments, 3);
        assert_eq!(stats.urgent, 1);
        assert_eq!(stats.notifications, 3);
        assert_eq!(stats.unread, 2);
        assert_eq!(stats.emergencies, 1);
        assert!(feeds.is_demo());

        feeds.shutdown().await;
        assert!(sink.notices().is_empty());
    }

    #[tokio::test]
    async fn test_hosted_without_key_fails_to_start() {
        let mut config = CareFeedConfig::default();
        config.backend.driver = "hosted".to_string();

        let result = CareFeeds::start(&config, false, Arc::new(RecordingNoticeSink::new())).await;
        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }
}

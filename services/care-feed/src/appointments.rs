// services/care-feed/src/appointments.rs
//
// Live mirror of the appointments table.
//

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::watch;

use svckit::backend::DataService;
use svckit::errors::SyncError;
use svckit::types::{AppointmentRecord, APPOINTMENTS_TABLE};

use crate::feed::{Feed, FeedRecord, FeedView};
use crate::filter::RecordFilter;
use crate::notice::{Notice, NoticeSink};

impl FeedRecord for AppointmentRecord {
    type Id = i64;

    const TABLE: &'static str = APPOINTMENTS_TABLE;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn parse_row(row: &Value) -> Result<Self, SyncError> {
        AppointmentRecord::from_row(row)
    }

    fn key_of(row: &Value) -> Option<i64> {
        AppointmentRecord::id_of(row)
    }

    fn load_failed_notice() -> Notice {
        Notice::alert("Error", "Failed to load appointments")
    }

    fn created_notice(&self) -> Option<Notice> {
        Some(Notice::info(
            "New Appointment",
            format!("New appointment with {} scheduled", self.display_name()),
        ))
    }

    fn deleted_notice(&self) -> Option<Notice> {
        Some(Notice::info(
            "Appointment Cancelled",
            format!("Appointment with {} was cancelled", self.display_name()),
        ))
    }
}

pub struct AppointmentFeed {
    feed: Feed<AppointmentRecord>,
}

impl AppointmentFeed {
    pub async fn start(
        service: Arc<dyn DataService>,
        notices: Arc<dyn NoticeSink>,
        filter: Option<Arc<dyn RecordFilter<AppointmentRecord>>>,
    ) -> Result<Self, SyncError> {
        let feed = Feed::start(service, notices, filter).await?;
        Ok(Self { feed })
    }

    pub fn view(&self) -> FeedView<AppointmentRecord> {
        self.feed.view()
    }

    pub fn get(&self, id: i64) -> Option<AppointmentRecord> {
        self.feed.get(&id)
    }

    pub fn len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.feed.is_loading()
    }

    pub fn urgent_count(&self) -> usize {
        self.feed.count(AppointmentRecord::is_urgent)
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.feed.changes()
    }

    pub async fn wait_until_loaded(&self) {
        self.feed.wait_until_loaded().await
    }

    pub async fn close(&self) {
        self.feed.close().await
    }
}

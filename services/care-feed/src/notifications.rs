// services/care-feed/src/notifications.rs
//
// Live mirror of the notifications table, plus the mark-as-read action.
//

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, error, info};

use svckit::backend::DataService;
use svckit::errors::SyncError;
use svckit::metrics;
use svckit::types::{NotificationKind, NotificationPriority, NotificationRecord, NOTIFICATIONS_TABLE};

use crate::feed::{DeleteHook, Feed, FeedRecord, FeedView};
use crate::filter::RecordFilter;
use crate::notice::{Notice, NoticeSink};

impl FeedRecord for NotificationRecord {
    type Id = String;

    const TABLE: &'static str = NOTIFICATIONS_TABLE;

    fn id(&self) -> &String {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn parse_row(row: &Value) -> Result<Self, SyncError> {
        NotificationRecord::from_row(row)
    }

    fn key_of(row: &Value) -> Option<String> {
        NotificationRecord::id_of(row)
    }

    fn load_failed_notice() -> Notice {
        Notice::alert("Error", "Failed to load notifications")
    }

    fn created_notice(&self) -> Option<Notice> {
        let notice = if self.priority == NotificationPriority::High {
            Notice::alert(self.title.clone(), self.message.clone())
        } else {
            Notice::info(self.title.clone(), self.message.clone())
        };
        Some(notice)
    }
}

pub struct NotificationFeed {
    feed: Feed<NotificationRecord>,
    /// Ids whose read confirmation has already been announced. Pruned as
    /// rows are deleted.
    acknowledged: Arc<Mutex<HashSet<String>>>,
}

impl NotificationFeed {
    pub async fn start(
        service: Arc<dyn DataService>,
        notices: Arc<dyn NoticeSink>,
        filter: Option<Arc<dyn RecordFilter<NotificationRecord>>>,
    ) -> Result<Self, SyncError> {
        let acknowledged = Arc::new(Mutex::new(HashSet::new()));
        let pruned = acknowledged.clone();
        let on_deleted: DeleteHook<String> = Box::new(move |id: &String| {
            pruned.lock().remove(id);
        });

        let feed = Feed::start_with_delete_hook(service, notices, filter, Some(on_deleted)).await?;
        Ok(Self { feed, acknowledged })
    }

    pub fn view(&self) -> FeedView<NotificationRecord> {
        self.feed.view()
    }

    pub fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.feed.get(&id.to_string())
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

    pub fn unread_count(&self) -> usize {
        self.feed.count(|n| !n.read)
    }

    pub fn emergency_count(&self) -> usize {
        self.feed.count(|n| n.kind == NotificationKind::Emergency)
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.feed.changes()
    }

    pub async fn wait_until_loaded(&self) {
        self.feed.wait_until_loaded().await
    }

    /// Persist `read = true` for `id`, then reflect it locally.
    ///
    /// Local state only changes after the backend confirms the write. A
    /// record already read locally is not written again.
    pub async fn mark_read(&self, id: &str) -> Result<(), SyncError> {
        let id = id.to_string();
        match self.feed.get(&id) {
            Some(record) if record.read => {
                debug!("Notification {} already read", id);
                return Ok(());
            }
            Some(_) => {}
            None => debug!("Notification {} not mirrored locally", id),
        }

        let service = self.feed.service();
        let start = Instant::now();
        let result = service
            .update(NOTIFICATIONS_TABLE, "id", &Value::String(id.clone()), json!({ "read": true }))
            .await
            .and_then(|matched| {
                if matched == 0 {
                    Err(SyncError::BackendError(format!("notification {} not found", id)))
                } else {
                    Ok(matched)
                }
            });
        metrics::record_operation(
            "update",
            service.driver_name(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );

        if let Err(e) = result {
            error!("Error marking notification {} as read: {}", id, e);
            return Err(e);
        }

        self.feed.modify(&id, |record| {
            let changed = !record.read;
            record.read = true;
            changed
        });

        let first = self.acknowledged.lock().insert(id.clone());
        if first {
            info!("Notification {} marked as read", id);
            self.feed.notices().show(Notice::info("Notification", "Marked as read"));
        }
        Ok(())
    }

    /// Re-apply the filter and merge a fresh snapshot. Call after the
    /// filter has been reloaded.
    pub async fn resync(&self) -> Result<(), SyncError> {
        self.feed.resync().await
    }

    pub async fn close(&self) {
        self.feed.close().await
    }
}

// svckit/src/backend/memory.rs
//
// In-process data service used for demo mode and tests.
// Same capability surface as the hosted backend, backed by a DashMap of
// tables and a broadcast channel of row changes.
//

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::service::{DataService, Subscription};
use crate::errors::SyncError;
use crate::types::{parse_timestamp, RowChange};

const CHANGE_BUFFER: usize = 1024;

pub struct MemoryBackend {
    tables: DashMap<String, Vec<Value>>,
    changes: broadcast::Sender<RowChange>,
    fail_fetches: AtomicBool,
    fail_updates: AtomicBool,
    fetch_paused: watch::Sender<bool>,
    active_subscriptions: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let (fetch_paused, _) = watch::channel(false);

        Self {
            tables: DashMap::new(),
            changes,
            fail_fetches: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
            fetch_paused,
            active_subscriptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Load rows without emitting change events.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        info!("Seeding {} rows into {}", rows.len(), table);
        self.tables.entry(table.to_string()).or_default().extend(rows);
    }

    pub fn insert(&self, table: &str, row: Value) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        self.emit(RowChange::insert(table, row));
    }

    /// Remove every row whose `key_column` equals `key`, emitting a delete
    /// per removed row. Returns the number removed.
    pub fn delete(&self, table: &str, key_column: &str, key: &Value) -> usize {
        let removed: Vec<Value> = match self.tables.get_mut(table) {
            Some(mut rows) => {
                let (gone, kept): (Vec<Value>, Vec<Value>) = rows
                    .drain(..)
                    .partition(|row| key_matches(row.get(key_column), key));
                *rows = kept;
                gone
            }
            None => Vec::new(),
        };

        let count = removed.len();
        for row in removed {
            self.emit(RowChange::delete(table, row));
        }
        count
    }

    /// Push a change to subscribers without touching stored rows.
    pub fn emit(&self, change: RowChange) {
        debug!("Emitting {} on {}", change.kind.as_str(), change.table);
        // No receivers just means nobody is subscribed yet.
        let _ = self.changes.send(change);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.get(table).map(|rows| rows.value().clone()).unwrap_or_default()
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Hold every snapshot query until [`MemoryBackend::resume_fetches`].
    pub fn pause_fetches(&self) {
        self.fetch_paused.send_replace(true);
    }

    pub fn resume_fetches(&self) {
        self.fetch_paused.send_replace(false);
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::SeqCst)
    }
}

/// Keys compare by their text form, like an `eq.` filter against the hosted
/// backend: `1` and `"1"` address the same row.
fn key_matches(column: Option<&Value>, key: &Value) -> bool {
    fn text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
    match column {
        Some(Value::Null) | None => false,
        Some(value) => text(value) == text(key),
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataService for MemoryBackend {
    async fn fetch_ordered(&self, table: &str, order_column: &str) -> Result<Vec<Value>, SyncError> {
        let mut gate = self.fetch_paused.subscribe();
        gate.wait_for(|paused| !*paused)
            .await
            .map_err(|e| SyncError::BackendError(format!("fetch gate closed: {}", e)))?;

        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(SyncError::BackendError(format!("fetch of {} rejected", table)));
        }

        let mut rows = self.rows(table);
        rows.sort_by(|a, b| {
            let key = |row: &Value| {
                row.get(order_column)
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
            };
            key(b).cmp(&key(a))
        });
        Ok(rows)
    }

    async fn subscribe(&self, table: &str) -> Result<Subscription, SyncError> {
        let mut changes = self.changes.subscribe();
        let (subscription, mut producer) = Subscription::channel(table);
        let active = self.active_subscriptions.clone();
        let table = table.to_string();

        active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut producer.released => break,
                    msg = changes.recv() => match msg {
                        Ok(change) if change.table == table => {
                            if producer.events.send(change).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        // Dropped changes cannot be replayed; end the stream
                        // rather than let the consumer drift from the table.
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Subscription on {} lagged, {} changes dropped; closing", table, skipped);
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            active.fetch_sub(1, Ordering::SeqCst);
            debug!("Memory subscription on {} closed", table);
        });

        Ok(subscription)
    }

    async fn update(&self, table: &str, key_column: &str, key: &Value, patch: Value) -> Result<u64, SyncError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SyncError::BackendError(format!("update of {} rejected", table)));
        }
        let Value::Object(fields) = patch else {
            return Err(SyncError::ValidationError("update patch must be a JSON object".to_string()));
        };

        let mut updated = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| key_matches(row.get(key_column), key)) {
                let old = row.clone();
                if let Some(obj) = row.as_object_mut() {
                    for (column, value) in &fields {
                        obj.insert(column.clone(), value.clone());
                    }
                }
                updated.push((row.clone(), old));
            }
        }

        let count = updated.len() as u64;
        for (row, old) in updated {
            self.emit(RowChange::update(table, row, Some(old)));
        }
        Ok(count)
    }

    async fn health_check(&self) -> Result<(), SyncError> {
        Ok(())
    }

    fn driver_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeKind;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fetch_orders_newest_first() {
        let backend = MemoryBackend::new();
        backend.seed(
            "appointments",
            vec![
                json!({"id": 1, "created_at": "2024-01-10T08:00:00Z"}),
                json!({"id": 2, "created_at": "2024-01-12T08:00:00Z"}),
                json!({"id": 3, "created_at": "2024-01-11T08:00:00Z"}),
            ],
        );

        let rows = backend.fetch_ordered("appointments", "created_at").await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_table() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe("notifications").await.unwrap();

        backend.insert("appointments", json!({"id": 1}));
        backend.insert("notifications", json!({"id": "n1"}));

        let change = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.table, "notifications");
        assert_eq!(change.kind, ChangeKind::Insert);
    }

    #[tokio::test]
    async fn test_update_merges_and_emits() {
        let backend = MemoryBackend::new();
        backend.seed("notifications", vec![json!({"id": "n1", "read": false})]);
        let mut sub = backend.subscribe("notifications").await.unwrap();

        let matched = backend
            .update("notifications", "id", &json!("n1"), json!({"read": true}))
            .await
            .unwrap();
        assert_eq!(matched, 1);
        assert_eq!(backend.rows("notifications")[0]["read"], json!(true));

        let change = tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.old_record.unwrap()["read"], json!(false));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MemoryBackend::new();
        backend.set_fail_fetches(true);
        backend.set_fail_updates(true);

        assert!(backend.fetch_ordered("appointments", "created_at").await.is_err());
        assert!(backend
            .update("notifications", "id", &json!("n1"), json!({"read": true}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_release_stops_forwarder() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe("appointments").await.unwrap();
        assert_eq!(backend.active_subscriptions(), 1);

        sub.release();
        tokio::time::timeout(Duration::from_secs(1), async {
            while backend.active_subscriptions() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_lagged_subscription_ends() {
        let backend = MemoryBackend::new();
        let mut sub = backend.subscribe("appointments").await.unwrap();

        // The forwarder has not run yet, so the broadcast buffer overflows
        for id in 0..(CHANGE_BUFFER + 10) {
            backend.emit(RowChange::insert("appointments", json!({ "id": id })));
        }

        let next = tokio::time::timeout(Duration::from_secs(1), sub.next()).await.unwrap();
        assert!(next.is_none());
        tokio::time::timeout(Duration::from_secs(1), async {
            while backend.active_subscriptions() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_key_matches_by_text() {
        assert!(key_matches(Some(&json!(1)), &json!("1")));
        assert!(key_matches(Some(&json!("n1")), &json!("n1")));
        assert!(!key_matches(Some(&json!(2)), &json!("1")));
        assert!(!key_matches(None, &json!("1")));
    }

    #[tokio::test]
    async fn test_delete_removes_rows() {
        let backend = MemoryBackend::new();
        backend.seed("appointments", vec![json!({"id": 1}), json!({"id": 2})]);

        assert_eq!(backend.delete("appointments", "id", &json!(1)), 1);
        assert_eq!(backend.rows("appointments").len(), 1);
    }
}

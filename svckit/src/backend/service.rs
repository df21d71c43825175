use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::errors::SyncError;
use crate::metrics;
use crate::types::RowChange;

/// The capability triple every feed depends on: an ordered snapshot query,
/// a per-table change stream and a row-level update.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Full contents of `table`, newest `order_column` first.
    async fn fetch_ordered(&self, table: &str, order_column: &str) -> Result<Vec<Value>, SyncError>;

    /// Open a live change stream for `table`.
    async fn subscribe(&self, table: &str) -> Result<Subscription, SyncError>;

    /// Merge `patch` into every row whose `key_column` equals `key`.
    /// Returns the number of rows matched.
    async fn update(&self, table: &str, key_column: &str, key: &Value, patch: Value) -> Result<u64, SyncError>;

    async fn health_check(&self) -> Result<(), SyncError>;

    fn driver_name(&self) -> &str;
}

/// Consumer end of a live change stream.
///
/// The stream stays open until [`Subscription::release`] is called or the
/// value is dropped, whichever comes first. Release is signalled to the
/// producer exactly once.
pub struct Subscription {
    table: String,
    events: mpsc::UnboundedReceiver<RowChange>,
    release: Option<oneshot::Sender<()>>,
}

/// Producer end held by the task that pumps backend events.
pub struct SubscriptionProducer {
    pub events: mpsc::UnboundedSender<RowChange>,
    pub released: oneshot::Receiver<()>,
}

impl Subscription {
    pub fn channel(table: &str) -> (Self, SubscriptionProducer) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = oneshot::channel();
        metrics::subscription_opened(table);

        (
            Self {
                table: table.to_string(),
                events: events_rx,
                release: Some(release_tx),
            },
            SubscriptionProducer {
                events: events_tx,
                released: release_rx,
            },
        )
    }

    /// Next change, or `None` once the producer has gone away.
    pub async fn next(&mut self) -> Option<RowChange> {
        self.events.recv().await
    }

    /// Returns `true` only for the call that actually released the stream.
    pub fn release(&mut self) -> bool {
        match self.release.take() {
            Some(tx) => {
                let _ = tx.send(());
                self.events.close();
                metrics::subscription_closed(&self.table);
                debug!("Released subscription on {}", self.table);
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_release_is_signalled_once() {
        let (mut sub, mut producer) = Subscription::channel("appointments");

        assert!(sub.release());
        assert!(!sub.release());
        assert!(sub.is_released());
        assert!((&mut producer.released).await.is_ok());
    }

    #[tokio::test]
    async fn test_events_flow_until_producer_drops() {
        let (mut sub, producer) = Subscription::channel("appointments");
        producer
            .events
            .send(RowChange::insert("appointments", json!({"id": 1})))
            .unwrap();
        drop(producer);

        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let (sub, producer) = Subscription::channel("notifications");
        drop(sub);
        assert!(producer.released.await.is_ok());
    }
}

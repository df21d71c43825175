// svckit/src/backend/hosted.rs
//
// Hosted backend: PostgREST for snapshot queries and row updates,
// realtime websocket for the change feed.
//

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use super::realtime::{self, InboundFrame};
use super::service::{DataService, Subscription};
use crate::config::BackendConfig;
use crate::errors::SyncError;

pub struct HostedBackend {
    http: reqwest::Client,
    rest_url: String,
    realtime_url: String,
    api_key: String,
    access_token: String,
    schema: String,
    heartbeat: Duration,
    join_timeout: Duration,
    next_ref: AtomicU64,
}

impl HostedBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, SyncError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SyncError::ConfigError("backend.api_key is required for the hosted driver".to_string()))?;

        let base = config.url.trim_end_matches('/');
        let ws_base = if let Some(host) = base.strip_prefix("https://") {
            format!("wss://{}", host)
        } else if let Some(host) = base.strip_prefix("http://") {
            format!("ws://{}", host)
        } else {
            return Err(SyncError::ConfigError(format!("backend.url must be http(s): {}", base)));
        };

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SyncError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

        info!("Hosted backend configured for {}", base);

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1", base),
            realtime_url: format!(
                "{}/realtime/v1/websocket?apikey={}&vsn={}",
                ws_base,
                api_key,
                realtime::PROTOCOL_VERSION
            ),
            access_token: config.access_token.clone().unwrap_or_else(|| api_key.clone()),
            api_key,
            schema: config.schema.clone(),
            heartbeat: config.heartbeat_interval(),
            join_timeout: config.request_timeout(),
            next_ref: AtomicU64::new(1),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::BackendError(format!("HTTP {}: {}", status, body)))
    }
}

/// PostgREST filter literal for `eq.` comparisons.
fn filter_literal(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read frames until the server answers the join sent with `join_ref`.
/// Anything else arriving first is skipped.
async fn await_join<S>(source: &mut S, topic: &str, table: &str, join_ref: u64) -> Result<(), SyncError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = source.next().await {
        match msg? {
            Message::Text(text) => match realtime::decode_frame(&text, table) {
                Ok(InboundFrame::Reply { msg_ref: Some(r), ok, detail }) if r == join_ref => {
                    if ok {
                        return Ok(());
                    }
                    return Err(SyncError::SubscriptionError(format!(
                        "join of {} rejected: {}",
                        topic, detail
                    )));
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping undecodable frame on {}: {}", topic, e),
            },
            Message::Close(frame) => {
                return Err(SyncError::SubscriptionError(format!(
                    "connection for {} closed before join reply: {:?}",
                    topic, frame
                )));
            }
            _ => {}
        }
    }
    Err(SyncError::SubscriptionError(format!(
        "connection for {} ended before join reply",
        topic
    )))
}

#[async_trait]
impl DataService for HostedBackend {
    async fn fetch_ordered(&self, table: &str, order_column: &str) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/{}", self.rest_url, table);
        debug!("Fetching {} ordered by {} desc", table, order_column);

        let response = self
            .authorized(self.http.get(&url))
            .header("Accept-Profile", &self.schema)
            .query(&[("select", "*".to_string()), ("order", format!("{}.desc", order_column))])
            .send()
            .await?;

        let rows = Self::check_status(response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    async fn subscribe(&self, table: &str) -> Result<Subscription, SyncError> {
        let (stream, _) = connect_async(self.realtime_url.as_str()).await?;
        let (mut sink, mut source) = stream.split();

        let topic = realtime::channel_topic(&self.schema, table);
        let join_ref = self.next_ref.fetch_add(1, Ordering::SeqCst);
        let join = realtime::join_frame(&topic, &self.schema, table, &self.access_token, join_ref);
        sink.send(Message::Text(join.to_string())).await?;

        // Changes only flow once the server has registered the listener
        match tokio::time::timeout(self.join_timeout, await_join(&mut source, &topic, table, join_ref)).await {
            Ok(joined) => joined?,
            Err(_) => return Err(SyncError::TimeoutError(self.join_timeout)),
        }
        info!("Joined realtime channel {}", topic);

        let (subscription, mut producer) = Subscription::channel(table);
        let table = table.to_string();
        let period = self.heartbeat;

        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(period);
            heartbeat.tick().await;
            let mut msg_ref = join_ref;

            loop {
                tokio::select! {
                    _ = &mut producer.released => {
                        msg_ref += 1;
                        let leave = realtime::leave_frame(&topic, msg_ref);
                        let _ = sink.send(Message::Text(leave.to_string())).await;
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        msg_ref += 1;
                        let beat = realtime::heartbeat_frame(msg_ref);
                        if let Err(e) = sink.send(Message::Text(beat.to_string())).await {
                            warn!("Heartbeat on {} failed: {}", topic, e);
                            break;
                        }
                    }
                    msg = source.next() => match msg {
                        Some(Ok(Message::Text(text))) => match realtime::decode_frame(&text, &table) {
                            Ok(InboundFrame::Change(change)) => {
                                if producer.events.send(change).is_err() {
                                    break;
                                }
                            }
                            Ok(InboundFrame::Reply { ok: false, detail, .. }) => {
                                error!("Realtime channel {} rejected request: {}", topic, detail);
                            }
                            Ok(InboundFrame::System { ok: false, detail }) => {
                                error!("Realtime channel {} reported: {}", topic, detail);
                            }
                            Ok(_) => {}
                            Err(e) => debug!("Skipping undecodable frame on {}: {}", topic, e),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            warn!("Realtime connection for {} closed by server: {:?}", topic, frame);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Realtime connection for {} failed: {}", topic, e);
                            break;
                        }
                        None => break,
                    },
                }
            }
            debug!("Realtime pump for {} stopped", topic);
        });

        Ok(subscription)
    }

    async fn update(&self, table: &str, key_column: &str, key: &Value, patch: Value) -> Result<u64, SyncError> {
        let url = format!("{}/{}", self.rest_url, table);
        let filter = format!("eq.{}", filter_literal(key));

        let response = self
            .authorized(self.http.patch(&url))
            .header("Content-Profile", &self.schema)
            .header("Prefer", "return=representation")
            .query(&[(key_column, filter.as_str())])
            .json(&patch)
            .send()
            .await?;

        let rows = Self::check_status(response).await?.json::<Vec<Value>>().await?;
        Ok(rows.len() as u64)
    }

    async fn health_check(&self) -> Result<(), SyncError> {
        let response = self
            .authorized(self.http.get(format!("{}/", self.rest_url)))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    fn driver_name(&self) -> &str {
        "hosted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// How the local realtime server answers the join.
    #[derive(Clone, Copy)]
    enum JoinAnswer {
        Accept,
        Reject,
        Silent,
    }

    /// Single-connection realtime server on a free local port. Returns the
    /// project URL to configure the backend with.
    async fn realtime_server(answer: JoinAnswer) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let join: Value = match ws.next().await {
                Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected join frame, got {:?}", other),
            };
            assert_eq!(join["event"], "phx_join");

            let status = match answer {
                JoinAnswer::Accept => "ok",
                JoinAnswer::Reject => "error",
                JoinAnswer::Silent => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    return;
                }
            };
            let presence = json!({"topic": join["topic"], "event": "presence_state", "payload": {}, "ref": null});
            ws.send(Message::Text(presence.to_string())).await.unwrap();
            let reply = json!({
                "topic": join["topic"],
                "event": "phx_reply",
                "payload": {"status": status, "response": {"reason": "unauthorized"}},
                "ref": join["ref"],
            });
            ws.send(Message::Text(reply.to_string())).await.unwrap();

            if let JoinAnswer::Accept = answer {
                let change = json!({
                    "topic": join["topic"],
                    "event": "postgres_changes",
                    "payload": {"data": {"table": "notifications", "type": "INSERT", "record": {"id": "n1"}}},
                    "ref": null,
                });
                ws.send(Message::Text(change.to_string())).await.unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        });

        format!("http://{}", addr)
    }

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            driver: "hosted".to_string(),
            url: url.to_string(),
            api_key: Some("anon-key".to_string()),
            ..BackendConfig::default()
        }
    }

    #[test]
    fn test_urls_derived_from_project_url() {
        let backend = HostedBackend::new(&config("https://demo.supabase.co/")).unwrap();
        assert_eq!(backend.rest_url, "https://demo.supabase.co/rest/v1");
        assert!(backend.realtime_url.starts_with("wss://demo.supabase.co/realtime/v1/websocket?apikey=anon-key"));
        assert_eq!(backend.access_token, "anon-key");
    }

    #[test]
    fn test_plain_http_uses_ws() {
        let backend = HostedBackend::new(&config("http://localhost:54321")).unwrap();
        assert!(backend.realtime_url.starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut cfg = config("https://demo.supabase.co");
        cfg.api_key = None;
        assert!(matches!(HostedBackend::new(&cfg), Err(SyncError::ConfigError(_))));
    }

    #[test]
    fn test_bad_scheme_rejected() {
        assert!(HostedBackend::new(&config("ftp://demo")).is_err());
    }

    #[test]
    fn test_filter_literal() {
        assert_eq!(filter_literal(&json!("abc")), "abc");
        assert_eq!(filter_literal(&json!(42)), "42");
    }

    #[tokio::test]
    async fn test_subscribe_waits_for_join_reply() {
        let url = realtime_server(JoinAnswer::Accept).await;
        let backend = HostedBackend::new(&config(&url)).unwrap();

        let mut sub = backend.subscribe("notifications").await.unwrap();
        let change = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.record.unwrap()["id"], "n1");
        assert_eq!(sub.table(), "notifications");
    }

    #[tokio::test]
    async fn test_rejected_join_is_an_error() {
        let url = realtime_server(JoinAnswer::Reject).await;
        let backend = HostedBackend::new(&config(&url)).unwrap();

        match backend.subscribe("notifications").await {
            Err(SyncError::SubscriptionError(msg)) => assert!(msg.contains("unauthorized")),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("rejected join returned a subscription"),
        }
    }

    #[tokio::test]
    async fn test_unanswered_join_times_out() {
        let url = realtime_server(JoinAnswer::Silent).await;
        let mut cfg = config(&url);
        cfg.request_timeout_ms = 200;
        let backend = HostedBackend::new(&cfg).unwrap();

        assert!(matches!(
            backend.subscribe("notifications").await,
            Err(SyncError::TimeoutError(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running backend at localhost:54321
    async fn test_hosted_health_check() {
        let backend = HostedBackend::new(&config("http://localhost:54321")).unwrap();
        assert!(backend.health_check().await.is_ok());
    }
}

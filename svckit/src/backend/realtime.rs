// svckit/src/backend/realtime.rs
//
// Frames for the hosted change feed (Phoenix channel protocol over websocket).
//

use serde_json::{json, Value};

use crate::errors::SyncError;
use crate::types::{ChangeKind, RowChange};

pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Change(RowChange),
    Reply { msg_ref: Option<u64>, ok: bool, detail: String },
    System { ok: bool, detail: String },
    Ignored,
}

pub fn channel_topic(schema: &str, table: &str) -> String {
    format!("realtime:{}:{}", schema, table)
}

pub fn join_frame(topic: &str, schema: &str, table: &str, access_token: &str, join_ref: u64) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": schema, "table": table }
                ]
            },
            "access_token": access_token
        },
        "ref": join_ref.to_string(),
        "join_ref": join_ref.to_string()
    })
}

pub fn heartbeat_frame(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string()
    })
}

pub fn leave_frame(topic: &str, msg_ref: u64) -> Value {
    json!({
        "topic": topic,
        "event": "phx_leave",
        "payload": {},
        "ref": msg_ref.to_string()
    })
}

/// Decode one text frame. Change payloads for tables other than `table`
/// are ignored.
pub fn decode_frame(text: &str, table: &str) -> Result<InboundFrame, SyncError> {
    let frame: Value = serde_json::from_str(text)?;
    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default();
    let payload = frame.get("payload").cloned().unwrap_or(Value::Null);

    match event {
        "postgres_changes" => {
            let data = payload
                .get("data")
                .ok_or_else(|| SyncError::ValidationError("postgres_changes frame without data".to_string()))?;
            if data.get("table").and_then(Value::as_str) != Some(table) {
                return Ok(InboundFrame::Ignored);
            }
            let kind = data
                .get("type")
                .and_then(Value::as_str)
                .and_then(ChangeKind::from_wire)
                .ok_or_else(|| SyncError::ValidationError(format!("unknown change type in {}", data)))?;

            Ok(InboundFrame::Change(RowChange {
                table: table.to_string(),
                kind,
                record: non_empty(data.get("record")),
                old_record: non_empty(data.get("old_record")),
            }))
        }
        "phx_reply" => Ok(InboundFrame::Reply {
            msg_ref: frame.get("ref").and_then(Value::as_str).and_then(|r| r.parse().ok()),
            ok: payload.get("status").and_then(Value::as_str) == Some("ok"),
            detail: payload.get("response").map(|r| r.to_string()).unwrap_or_default(),
        }),
        "system" => Ok(InboundFrame::System {
            ok: payload.get("status").and_then(Value::as_str) != Some("error"),
            detail: payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => Ok(InboundFrame::Ignored),
    }
}

fn non_empty(value: Option<&Value>) -> Option<Value> {
    match value {
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::Null) | None => None,
        Some(v) => Some(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_insert() {
        let text = r#"{
            "event": "postgres_changes",
            "topic": "realtime:public:appointments",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "appointments",
                    "commit_timestamp": "2024-01-15T10:00:00Z",
                    "type": "INSERT",
                    "record": {"id": 5, "created_at": "2024-01-15T10:00:00Z", "name": "John Smith"},
                    "old_record": {},
                    "errors": null
                }
            }
        }"#;

        match decode_frame(text, "appointments").unwrap() {
            InboundFrame::Change(change) => {
                assert_eq!(change.kind, ChangeKind::Insert);
                assert_eq!(change.record.unwrap()["id"], 5);
                assert!(change.old_record.is_none());
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_decode_delete_carries_old_key() {
        let text = r#"{"event":"postgres_changes","payload":{"data":{"table":"notifications","type":"DELETE","old_record":{"id":"n1"}}}}"#;

        match decode_frame(text, "notifications").unwrap() {
            InboundFrame::Change(change) => {
                assert_eq!(change.kind, ChangeKind::Delete);
                assert!(change.record.is_none());
                assert_eq!(change.old_record.unwrap()["id"], "n1");
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_other_table_and_events_ignored() {
        let other_table = r#"{"event":"postgres_changes","payload":{"data":{"table":"patients","type":"UPDATE","record":{"id":1}}}}"#;
        assert_eq!(decode_frame(other_table, "appointments").unwrap(), InboundFrame::Ignored);

        let presence = r#"{"event":"presence_state","payload":{}}"#;
        assert_eq!(decode_frame(presence, "appointments").unwrap(), InboundFrame::Ignored);
    }

    #[test]
    fn test_decode_join_reply() {
        let text = r#"{"event":"phx_reply","payload":{"status":"error","response":{"reason":"unauthorized"}},"ref":"1"}"#;
        assert!(matches!(
            decode_frame(text, "appointments").unwrap(),
            InboundFrame::Reply { msg_ref: Some(1), ok: false, .. }
        ));
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        assert!(decode_frame("not json", "appointments").is_err());
    }

    #[test]
    fn test_join_frame_shape() {
        let frame = join_frame("realtime:public:appointments", "public", "appointments", "token", 1);
        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["payload"]["config"]["postgres_changes"][0]["table"], "appointments");
        assert_eq!(frame["ref"], "1");
    }
}

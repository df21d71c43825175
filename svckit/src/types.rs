use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::SyncError;

pub const APPOINTMENTS_TABLE: &str = "appointments";
pub const NOTIFICATIONS_TABLE: &str = "notifications";
pub const CREATED_AT_COLUMN: &str = "created_at";

/// An appointment as mirrored from the `appointments` table.
///
/// The table has carried two generations of column names for the patient
/// (`name`/`phone` and `patient_name`/`patient_phone`); both collapse into
/// the `patient_*` fields here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub patient_name: Option<String>,
    pub patient_phone: Option<String>,
    pub service: Option<String>,
    pub appointment_type: Option<String>,
    pub reason: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl AppointmentRecord {
    /// Normalize a raw backend row. This is the only place column aliases
    /// and empty-string fallbacks are resolved.
    pub fn from_row(row: &Value) -> Result<Self, SyncError> {
        let id = Self::id_of(row)
            .ok_or_else(|| SyncError::ValidationError("appointment row without numeric id".to_string()))?;
        let created_at = text(row, "created_at")
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| SyncError::ValidationError(format!("appointment {} has no valid created_at", id)))?;

        Ok(Self {
            id,
            created_at,
            appointment_date: text(row, "appointment_date")
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            appointment_time: text(row, "appointment_time").as_deref().and_then(parse_time),
            patient_name: text(row, "patient_name").or_else(|| text(row, "name")),
            patient_phone: text(row, "patient_phone").or_else(|| text(row, "phone")),
            service: text(row, "service"),
            appointment_type: text(row, "appointment_type"),
            reason: text(row, "reason"),
            status: text(row, "status"),
            priority: text(row, "priority"),
            location: text(row, "location"),
            notes: text(row, "notes"),
        })
    }

    /// Extract the key from a raw row, also used for delete payloads that
    /// only carry the primary key.
    pub fn id_of(row: &Value) -> Option<i64> {
        match row.get("id")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.patient_name.as_deref().unwrap_or("Unknown")
    }

    pub fn is_urgent(&self) -> bool {
        self.priority
            .as_deref()
            .map(|p| p.eq_ignore_ascii_case("urgent") || p.eq_ignore_ascii_case("high"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Appointment,
    Emergency,
    Lab,
    Message,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Appointment => write!(f, "appointment"),
            NotificationKind::Emergency => write!(f, "emergency"),
            NotificationKind::Lab => write!(f, "lab"),
            NotificationKind::Message => write!(f, "message"),
        }
    }
}

/// Declaration order is significant: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
}

impl fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationPriority::Low => write!(f, "low"),
            NotificationPriority::Medium => write!(f, "medium"),
            NotificationPriority::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub read: bool,
    pub appointment_id: Option<i64>,
    pub doctor_id: Option<String>,
}

#[derive(Deserialize)]
struct RawNotification {
    #[serde(rename = "type")]
    kind: NotificationKind,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    message: Option<String>,
    priority: NotificationPriority,
    #[serde(default)]
    read: Option<bool>,
    #[serde(default)]
    appointment_id: Option<i64>,
    #[serde(default)]
    doctor_id: Option<String>,
}

impl NotificationRecord {
    pub fn from_row(row: &Value) -> Result<Self, SyncError> {
        let id = Self::id_of(row)
            .ok_or_else(|| SyncError::ValidationError("notification row without id".to_string()))?;
        let created_at = text(row, "created_at")
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| SyncError::ValidationError(format!("notification {} has no valid created_at", id)))?;
        let raw: RawNotification = serde_json::from_value(row.clone())
            .map_err(|e| SyncError::ValidationError(format!("notification {}: {}", id, e)))?;

        Ok(Self {
            id,
            created_at,
            kind: raw.kind,
            title: raw.title.unwrap_or_default(),
            message: raw.message.unwrap_or_default(),
            priority: raw.priority,
            read: raw.read.unwrap_or(false),
            appointment_id: raw.appointment_id,
            doctor_id: raw.doctor_id.filter(|d| !d.is_empty()),
        })
    }

    pub fn id_of(row: &Value) -> Option<String> {
        match row.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Parse the `type` field of a change payload (`INSERT`, `UPDATE`, `DELETE`).
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// One change pushed by the backend for a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    pub kind: ChangeKind,
    /// New row image; absent for deletes.
    pub record: Option<Value>,
    /// Old row image; for deletes this may only hold the primary key.
    pub old_record: Option<Value>,
}

impl RowChange {
    pub fn insert(table: &str, record: Value) -> Self {
        Self { table: table.to_string(), kind: ChangeKind::Insert, record: Some(record), old_record: None }
    }

    pub fn update(table: &str, record: Value, old_record: Option<Value>) -> Self {
        Self { table: table.to_string(), kind: ChangeKind::Update, record: Some(record), old_record }
    }

    pub fn delete(table: &str, old_record: Value) -> Self {
        Self { table: table.to_string(), kind: ChangeKind::Delete, record: None, old_record: Some(old_record) }
    }
}

fn text(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339, the Postgres `timestamptz` text form (`+00` offsets)
/// and naive timestamps, which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

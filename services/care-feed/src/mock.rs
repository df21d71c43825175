// services/care-feed/src/mock.rs
//
// Mock data generator for demo mode
//

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use svckit::backend::MemoryBackend;
use svckit::types::{APPOINTMENTS_TABLE, NOTIFICATIONS_TABLE};

/// Chance per tick that a new notification arrives.
const NOTIFICATION_PROBABILITY: f64 = 0.3;

pub struct MockDataGenerator {
    backend: Arc<MemoryBackend>,
    tick_count: u64,
}

impl MockDataGenerator {
    pub fn new(backend: Arc<MemoryBackend>) -> Self {
        Self {
            backend,
            tick_count: 0,
        }
    }

    /// Load the starting appointments and notifications.
    pub fn seed(&self) {
        let now = Utc::now();
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        let ago = |minutes: i64| (now - ChronoDuration::minutes(minutes)).to_rfc3339();

        self.backend.seed(
            APPOINTMENTS_TABLE,
            vec![
                json!({
                    "id": 1,
                    "created_at": ago(30),
                    "name": "John Smith",
                    "phone": "+1234567890",
                    "appointment_date": today,
                    "appointment_time": "14:30",
                    "appointment_type": "ER",
                    "reason": "Chest pain",
                    "status": "scheduled",
                    "priority": "urgent",
                    "location": "Emergency Room",
                }),
                json!({
                    "id": 2,
                    "created_at": ago(45),
                    "name": "Maria Garcia",
                    "phone": "+1234567891",
                    "appointment_date": today,
                    "appointment_time": "15:00",
                    "appointment_type": "General",
                    "reason": "Follow-up visit",
                    "status": "scheduled",
                    "priority": "normal",
                    "location": "Room 101",
                }),
                json!({
                    "id": 3,
                    "created_at": ago(60),
                    "name": "Robert Johnson",
                    "phone": "+1234567892",
                    "appointment_date": today,
                    "appointment_time": "15:30",
                    "appointment_type": "Teleconsultation",
                    "reason": "Medication review",
                    "status": "scheduled",
                    "priority": "routine",
                    "location": "Virtual",
                }),
            ],
        );

        self.backend.seed(
            NOTIFICATIONS_TABLE,
            vec![
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "created_at": ago(2),
                    "type": "emergency",
                    "title": "Emergency Assignment",
                    "message": "Car accident at Main St & 5th Ave - ETA 8 minutes",
                    "priority": "high",
                    "read": false,
                }),
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "created_at": ago(5),
                    "type": "appointment",
                    "title": "New Appointment",
                    "message": "John Smith scheduled for 2:30 PM - Chest pain",
                    "priority": "medium",
                    "read": false,
                    "appointment_id": 1,
                }),
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "created_at": ago(10),
                    "type": "lab",
                    "title": "Lab Results Ready",
                    "message": "Blood work completed for Maria Garcia",
                    "priority": "medium",
                    "read": true,
                }),
            ],
        );
    }

    /// One simulation step. Returns the inserted notification row, if any.
    pub fn tick(&mut self) -> Option<Value> {
        let mut rng = rand::thread_rng();
        self.tick_with(&mut rng)
    }

    pub fn tick_with<R: Rng>(&mut self, rng: &mut R) -> Option<Value> {
        self.tick_count += 1;
        if !rng.gen_bool(NOTIFICATION_PROBABILITY) {
            return None;
        }

        let emergency = rng.gen_bool(0.5);
        let row = json!({
            "id": Uuid::new_v4().to_string(),
            "created_at": Utc::now().to_rfc3339(),
            "type": if emergency { "emergency" } else { "appointment" },
            "title": if emergency { "Emergency Alert" } else { "New Appointment" },
            "message": "New update available",
            "priority": if rng.gen_bool(0.4) { "high" } else { "medium" },
            "read": false,
        });

        debug!("Mock tick {} inserts notification {}", self.tick_count, row["id"]);
        self.backend.insert(NOTIFICATIONS_TABLE, row.clone());
        Some(row)
    }

    /// Drive [`MockDataGenerator::tick`] every `period` until the task is aborted.
    pub fn spawn(mut self, period: Duration) -> JoinHandle<()> {
        info!("Mock data generator running every {:?}", period);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.tick();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use svckit::types::{AppointmentRecord, NotificationRecord};

    #[test]
    fn test_seed_rows_normalize() {
        let backend = Arc::new(MemoryBackend::new());
        MockDataGenerator::new(backend.clone()).seed();

        let appointments = backend.rows(APPOINTMENTS_TABLE);
        let notifications = backend.rows(NOTIFICATIONS_TABLE);
        assert_eq!(appointments.len(), 3);
        assert_eq!(notifications.len(), 3);

        for row in &appointments {
            AppointmentRecord::from_row(row).unwrap();
        }
        for row in &notifications {
            NotificationRecord::from_row(row).unwrap();
        }
    }

    #[test]
    fn test_ticks_insert_valid_notifications() {
        let backend = Arc::new(MemoryBackend::new());
        let mut generator = MockDataGenerator::new(backend.clone());
        let mut rng = StdRng::seed_from_u64(7);

        let inserted: Vec<Value> = (0..200).filter_map(|_| generator.tick_with(&mut rng)).collect();

        // Roughly 30% of 200 ticks
        assert!(inserted.len() > 30 && inserted.len() < 90);
        assert_eq!(backend.rows(NOTIFICATIONS_TABLE).len(), inserted.len());
        for row in &inserted {
            let record = NotificationRecord::from_row(row).unwrap();
            assert!(!record.read);
        }
    }
}

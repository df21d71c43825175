// services/care-feed/src/patient.rs
//
// Patient detail view projected from a mirrored appointment.
//

use chrono::{NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use svckit::types::AppointmentRecord;

use crate::appointments::AppointmentFeed;

/// Placeholder vitals. No vitals source exists yet, so values are derived
/// from the appointment id and stay stable across refreshes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vitals {
    pub heart_rate_bpm: u32,
    pub blood_pressure: String,
    pub temperature_c: f64,
    pub weight_kg: u32,
    pub height_cm: u32,
}

impl Vitals {
    pub fn placeholder(appointment_id: i64) -> Self {
        let mut rng = StdRng::seed_from_u64(appointment_id as u64);
        let systolic = rng.gen_range(105..=145);
        let diastolic = rng.gen_range(65..=95);

        Self {
            heart_rate_bpm: rng.gen_range(60..=100),
            blood_pressure: format!("{}/{}", systolic, diastolic),
            temperature_c: f64::from(rng.gen_range(362u32..=374)) / 10.0,
            weight_kg: rng.gen_range(50..=100),
            height_cm: rng.gen_range(155..=195),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDetails {
    pub appointment_id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub service: Option<String>,
    pub reason: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub vitals: Vitals,
}

impl PatientDetails {
    pub fn from_appointment(record: &AppointmentRecord) -> Self {
        Self {
            appointment_id: record.id,
            name: record.display_name().to_string(),
            phone: record.patient_phone.clone(),
            appointment_date: record.appointment_date,
            appointment_time: record.appointment_time,
            service: record.service.clone().or_else(|| record.appointment_type.clone()),
            reason: record.reason.clone(),
            status: record.status.clone(),
            priority: record.priority.clone(),
            location: record.location.clone(),
            notes: record.notes.clone(),
            vitals: Vitals::placeholder(record.id),
        }
    }

    /// Look up the appointment in the live feed. `None` if it is not mirrored.
    pub fn lookup(feed: &AppointmentFeed, appointment_id: i64) -> Option<Self> {
        feed.get(appointment_id).map(|record| Self::from_appointment(&record))
    }
}

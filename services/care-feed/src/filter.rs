// services/care-feed/src/filter.rs
//
// Record filters - Strategy Pattern for scoping what a feed mirrors
// Keeps notifications owned by other doctors, or below the configured
// priority, out of the local list.
//

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use svckit::types::{NotificationPriority, NotificationRecord};

/// Filter decision
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DenyReason {
    OtherDoctor(String),
    BelowPriority(NotificationPriority),
}

/// Filter strategy trait. Evaluated synchronously at ingestion, while the
/// feed state is locked, so implementations must not block.
pub trait RecordFilter<R>: Send + Sync {
    fn evaluate(&self, record: &R) -> FilterDecision;
    fn name(&self) -> &str;
}

/// Doctor filter - keeps unowned notifications and those owned by `doctor_id`
pub struct DoctorFilter {
    doctor_id: RwLock<Option<String>>,
}

impl DoctorFilter {
    pub fn new(doctor_id: Option<String>) -> Self {
        Self {
            doctor_id: RwLock::new(doctor_id),
        }
    }

    /// Returns `true` when the scope changed.
    pub fn reload(&self, doctor_id: Option<String>) -> bool {
        let mut scope = self.doctor_id.write();
        if *scope == doctor_id {
            return false;
        }
        info!("Doctor filter reloaded: {:?}", doctor_id);
        *scope = doctor_id;
        true
    }
}

impl RecordFilter<NotificationRecord> for DoctorFilter {
    fn evaluate(&self, record: &NotificationRecord) -> FilterDecision {
        let scope = self.doctor_id.read();
        match (scope.as_deref(), record.doctor_id.as_deref()) {
            (Some(me), Some(owner)) if me != owner => {
                debug!("Notification {} belongs to doctor {}", record.id, owner);
                FilterDecision::Deny(DenyReason::OtherDoctor(owner.to_string()))
            }
            _ => FilterDecision::Allow,
        }
    }

    fn name(&self) -> &str {
        "DoctorFilter"
    }
}

/// Priority filter - drops notifications below a minimum priority
pub struct PriorityFilter {
    minimum: RwLock<NotificationPriority>,
}

impl PriorityFilter {
    pub fn new(minimum: NotificationPriority) -> Self {
        Self {
            minimum: RwLock::new(minimum),
        }
    }

    pub fn reload(&self, minimum: NotificationPriority) -> bool {
        let mut current = self.minimum.write();
        if *current == minimum {
            return false;
        }
        info!("Priority filter reloaded: minimum {}", minimum);
        *current = minimum;
        true
    }
}

impl RecordFilter<NotificationRecord> for PriorityFilter {
    fn evaluate(&self, record: &NotificationRecord) -> FilterDecision {
        if record.priority < *self.minimum.read() {
            FilterDecision::Deny(DenyReason::BelowPriority(record.priority))
        } else {
            FilterDecision::Allow
        }
    }

    fn name(&self) -> &str {
        "PriorityFilter"
    }
}

/// Composite filter - chains multiple filters (AND logic)
pub struct CompositeFilter<R> {
    filters: Vec<Arc<dyn RecordFilter<R>>>,
}

impl<R> CompositeFilter<R> {
    pub fn new(filters: Vec<Arc<dyn RecordFilter<R>>>) -> Self {
        Self { filters }
    }
}

impl<R> RecordFilter<R> for CompositeFilter<R> {
    fn evaluate(&self, record: &R) -> FilterDecision {
        for filter in &self.filters {
            if let FilterDecision::Deny(reason) = filter.evaluate(record) {
                return FilterDecision::Deny(reason);
            }
        }
        FilterDecision::Allow
    }

    fn name(&self) -> &str {
        "CompositeFilter"
    }
}

/// FilterGovernor - the notification filter handed to the feed.
/// Reloads go to the same filter instances the composite evaluates.
pub struct FilterGovernor {
    strategy: CompositeFilter<NotificationRecord>,
    doctor_filter: Arc<DoctorFilter>,
    priority_filter: Arc<PriorityFilter>,
}

impl FilterGovernor {
    pub fn new(config: &FilterConfig, doctor_id: Option<String>) -> Self {
        let doctor_filter = Arc::new(DoctorFilter::new(config.scoped_doctor(doctor_id)));
        let priority_filter = Arc::new(PriorityFilter::new(config.min_priority));

        let strategy = CompositeFilter::new(vec![
            doctor_filter.clone() as Arc<dyn RecordFilter<NotificationRecord>>,
            priority_filter.clone() as Arc<dyn RecordFilter<NotificationRecord>>,
        ]);

        info!(
            "FilterGovernor initialized: scope_to_doctor={}, min_priority={}",
            config.scope_to_doctor, config.min_priority
        );

        Self {
            strategy,
            doctor_filter,
            priority_filter,
        }
    }

    /// Reload filter configuration (hot-reload). Returns `true` when either
    /// filter changed; the feed then has to be resynced so records already
    /// mirrored, or previously kept out, follow the new rules.
    pub fn reload_config(&self, config: &FilterConfig, doctor_id: Option<String>) -> bool {
        let doctor_changed = self.doctor_filter.reload(config.scoped_doctor(doctor_id));
        let priority_changed = self.priority_filter.reload(config.min_priority);
        let changed = doctor_changed || priority_changed;
        if changed {
            info!("FilterGovernor configuration reloaded");
        }
        changed
    }
}

impl RecordFilter<NotificationRecord> for FilterGovernor {
    fn evaluate(&self, record: &NotificationRecord) -> FilterDecision {
        self.strategy.evaluate(record)
    }

    fn name(&self) -> &str {
        "FilterGovernor"
    }
}

/// Filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Only mirror notifications that are unowned or owned by the signed-in doctor.
    #[serde(default)]
    pub scope_to_doctor: bool,

    #[serde(default = "default_min_priority")]
    pub min_priority: NotificationPriority,

    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

impl FilterConfig {
    fn scoped_doctor(&self, doctor_id: Option<String>) -> Option<String> {
        if self.scope_to_doctor { doctor_id } else { None }
    }
}

fn default_min_priority() -> NotificationPriority {
    NotificationPriority::Low
}

fn default_reload_interval() -> u64 {
    60
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            scope_to_doctor: false,
            min_priority: NotificationPriority::Low,
            reload_interval_secs: 60,
        }
    }
}

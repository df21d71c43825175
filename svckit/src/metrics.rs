use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec,
    HistogramVec, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    pub static ref BACKEND_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "backend_operation_duration_seconds",
        "Backend operation duration in seconds",
        &["operation", "backend", "status"]
    ).unwrap();

    pub static ref FEED_EVENTS: IntCounterVec = register_int_counter_vec!(
        "feed_events_total",
        "Change events applied to local feeds",
        &["feed", "kind"]
    ).unwrap();

    pub static ref ACTIVE_SUBSCRIPTIONS: IntGaugeVec = register_int_gauge_vec!(
        "active_subscriptions",
        "Number of open live subscriptions",
        &["table"]
    ).unwrap();
}

pub fn record_operation(operation: &str, backend: &str, success: bool, duration: f64) {
    let status = if success { "success" } else { "failure" };
    BACKEND_OPERATION_DURATION
        .with_label_values(&[operation, backend, status])
        .observe(duration);
}

pub fn record_event(feed: &str, kind: &str) {
    FEED_EVENTS.with_label_values(&[feed, kind]).inc();
}

pub fn subscription_opened(table: &str) {
    ACTIVE_SUBSCRIPTIONS.with_label_values(&[table]).inc();
}

pub fn subscription_closed(table: &str) {
    ACTIVE_SUBSCRIPTIONS.with_label_values(&[table]).dec();
}

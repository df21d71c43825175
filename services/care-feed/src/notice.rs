// services/care-feed/src/notice.rs
//
// User-visible notice channel. Fire-and-forget: feeds never wait on it.
//

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    /// Blocking/alert style, e.g. high priority notifications and load failures.
    Alert,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn alert(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Alert,
        }
    }
}

pub trait NoticeSink: Send + Sync {
    fn show(&self, notice: Notice);
}

/// Writes notices to the log. Default sink for the headless service.
pub struct TracingNoticeSink;

impl NoticeSink for TracingNoticeSink {
    fn show(&self, notice: Notice) {
        match notice.severity {
            Severity::Info => info!(title = %notice.title, "{}", notice.description),
            Severity::Alert => warn!(title = %notice.title, "{}", notice.description),
        }
    }
}

/// Forwards notices to a UI loop.
pub struct ChannelNoticeSink {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNoticeSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NoticeSink for ChannelNoticeSink {
    fn show(&self, notice: Notice) {
        // The UI may already be gone during shutdown.
        let _ = self.tx.send(notice);
    }
}

/// Keeps every notice in memory.
#[derive(Default)]
pub struct RecordingNoticeSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.notices.lock().iter().filter(|n| n.title == title).count()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn show(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelNoticeSink::new();
        sink.show(Notice::alert("Error", "Failed to load appointments"));

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.severity, Severity::Alert);
        assert_eq!(notice.title, "Error");
    }

    #[test]
    fn test_channel_sink_tolerates_closed_receiver() {
        let (sink, rx) = ChannelNoticeSink::new();
        drop(rx);
        sink.show(Notice::info("New Appointment", "ignored"));
    }

    #[test]
    fn test_recording_sink_counts() {
        let sink = RecordingNoticeSink::new();
        sink.show(Notice::info("Notification", "Marked as read"));
        sink.show(Notice::info("New Appointment", "x"));
        assert_eq!(sink.count_titled("Notification"), 1);
        assert_eq!(sink.notices().len(), 2);
    }
}

// services/tui-dash/src/state.rs
//
// Dashboard UI state: focus, selections and the activity log.
// Feed contents live in the feeds themselves and are read each frame.

use chrono::{DateTime, Local};

use care_feed::{Notice, Severity};

const MAX_LOG_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Appointments,
    Notifications,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: String, // INFO, ALERT, WARN
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub focus: Focus,
    pub selected_appointment: usize,
    pub selected_notification: usize,
    pub show_detail: bool,
    pub activity_log: Vec<LogEntry>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            focus: Focus::Appointments,
            selected_appointment: 0,
            selected_notification: 0,
            show_detail: false,
            activity_log: Vec::new(),
        }
    }

    pub fn switch_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Appointments => Focus::Notifications,
            Focus::Notifications => Focus::Appointments,
        };
    }

    pub fn select_prev(&mut self) {
        let selected = self.selected_mut();
        *selected = selected.saturating_sub(1);
    }

    /// Move down within a list of `len` entries.
    pub fn select_next(&mut self, len: usize) {
        let selected = self.selected_mut();
        if *selected + 1 < len {
            *selected += 1;
        }
    }

    fn selected_mut(&mut self) -> &mut usize {
        match self.focus {
            Focus::Appointments => &mut self.selected_appointment,
            Focus::Notifications => &mut self.selected_notification,
        }
    }

    /// Keep selections inside the lists after the feeds shrink.
    pub fn clamp(&mut self, appointments: usize, notifications: usize) {
        self.selected_appointment = self.selected_appointment.min(appointments.saturating_sub(1));
        self.selected_notification = self.selected_notification.min(notifications.saturating_sub(1));
        if appointments == 0 {
            self.show_detail = false;
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn add_notice(&mut self, notice: &Notice) {
        let level = match notice.severity {
            Severity::Info => "INFO",
            Severity::Alert => "ALERT",
        };
        self.add_log(level, &format!("{}: {}", notice.title, notice.description));
    }

    pub fn add_log(&mut self, level: &str, message: &str) {
        self.activity_log.push(LogEntry {
            timestamp: Local::now(),
            level: level.to_string(),
            message: message.to_string(),
        });

        if self.activity_log.len() > MAX_LOG_ENTRIES {
            self.activity_log.remove(0);
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_stays_in_bounds() {
        let mut state = DashboardState::new();
        state.select_prev();
        assert_eq!(state.selected_appointment, 0);

        state.select_next(2);
        state.select_next(2);
        assert_eq!(state.selected_appointment, 1);

        state.switch_focus();
        state.select_next(3);
        assert_eq!(state.selected_notification, 1);
        assert_eq!(state.selected_appointment, 1);
    }

    #[test]
    fn test_clamp_after_removal() {
        let mut state = DashboardState::new();
        state.selected_appointment = 4;
        state.show_detail = true;

        state.clamp(2, 0);
        assert_eq!(state.selected_appointment, 1);
        assert_eq!(state.selected_notification, 0);
        assert!(state.show_detail);

        state.clamp(0, 0);
        assert!(!state.show_detail);
    }

    #[test]
    fn test_log_is_bounded() {
        let mut state = DashboardState::new();
        for i in 0..150 {
            state.add_notice(&Notice::info("New Appointment", format!("#{}", i)));
        }
        assert_eq!(state.activity_log.len(), MAX_LOG_ENTRIES);
        assert_eq!(state.activity_log[0].message, "New Appointment: #50");
        assert_eq!(state.activity_log[0].level, "INFO");
    }
}

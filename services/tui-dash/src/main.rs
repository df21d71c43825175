// services/tui-dash/src/main.rs
//
// Terminal dashboard for the care feeds: today's appointments, incoming
// notifications and the patient detail view.
//
// Run with: cargo run --bin tui-dash -- --demo

use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{prelude::*, widgets::*};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

use care_feed::config::{self, ClinicianProfile};
use care_feed::notice::ChannelNoticeSink;
use care_feed::patient::PatientDetails;
use care_feed::{CareFeeds, FeedStats, FeedView, Notice};
use svckit::types::{AppointmentRecord, NotificationKind, NotificationPriority, NotificationRecord};

mod state;

use state::{DashboardState, Focus};

#[derive(Parser, Debug)]
#[command(name = "tui-dash")]
#[command(about = "Terminal dashboard for live appointments and notifications")]
#[command(version = "0.1.0")]
struct Args {
    /// Run in demo mode with simulated data (no backend required)
    #[arg(long, short)]
    demo: bool,

    #[arg(short, long, default_value = "config/care-feed.yaml")]
    config: String,

    /// Refresh interval in milliseconds
    #[arg(long, default_value = "100")]
    refresh_ms: u64,
}

// Color palette: Teal, White, Silver, Coral
mod colors {
    use ratatui::style::Color;

    pub const TEAL: Color = Color::Rgb(42, 161, 152);
    pub const DARK_TEAL: Color = Color::Rgb(0, 95, 95);
    pub const WHITE: Color = Color::Rgb(253, 246, 227);
    pub const SILVER: Color = Color::Rgb(147, 161, 161);
    pub const GOLD: Color = Color::Rgb(255, 193, 37);
    pub const BG_DARK: Color = Color::Rgb(0, 20, 30);
    pub const BG_PANEL: Color = Color::Rgb(7, 30, 41);
    pub const SUCCESS: Color = Color::Rgb(133, 153, 0);
    pub const ALERT: Color = Color::Rgb(220, 50, 47);
}

/// Everything a frame needs, read from the feeds once per draw.
struct Snapshot {
    appointments: FeedView<AppointmentRecord>,
    notifications: FeedView<NotificationRecord>,
    stats: FeedStats,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(&args.config)?;

    // The feeds run on their own runtime; the UI loop stays synchronous.
    let rt = Runtime::new()?;
    let (sink, notices) = ChannelNoticeSink::new();
    let feeds = Arc::new(rt.block_on(CareFeeds::start(&config, args.demo, Arc::new(sink)))?);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Run app
    let result = run_app(&mut terminal, &rt, &feeds, notices, &config.clinician, &args);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    rt.block_on(feeds.shutdown());
    result
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    rt: &Runtime,
    feeds: &Arc<CareFeeds>,
    mut notices: UnboundedReceiver<Notice>,
    clinician: &ClinicianProfile,
    args: &Args,
) -> Result<()> {
    let mut state = DashboardState::new();
    let tick_rate = Duration::from_millis(args.refresh_ms);

    if feeds.is_demo() {
        state.add_log("INFO", "Dashboard started in DEMO mode");
    } else {
        state.add_log(
            "INFO",
            &format!("Dashboard started - {} backend", feeds.service().driver_name()),
        );
    }

    loop {
        while let Ok(notice) = notices.try_recv() {
            state.add_notice(&notice);
        }

        let snapshot = Snapshot {
            appointments: feeds.appointments.view(),
            notifications: feeds.notifications.view(),
            stats: feeds.stats(),
        };
        state.clamp(snapshot.appointments.records.len(), snapshot.notifications.records.len());

        // Draw UI
        terminal.draw(|frame| draw_ui(frame, &state, &snapshot, clinician, feeds.is_demo()))?;

        // Handle input
        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Tab => state.switch_focus(),
                        KeyCode::Up => state.select_prev(),
                        KeyCode::Down => {
                            let len = match state.focus {
                                Focus::Appointments => snapshot.appointments.records.len(),
                                Focus::Notifications => snapshot.notifications.records.len(),
                            };
                            state.select_next(len);
                        }
                        KeyCode::Enter if state.focus == Focus::Appointments => state.toggle_detail(),
                        KeyCode::Char('m') if state.focus == Focus::Notifications => {
                            if let Some(notification) =
                                snapshot.notifications.records.get(state.selected_notification)
                            {
                                let feeds = feeds.clone();
                                let id = notification.id.clone();
                                // Failures are logged by the feed and leave the list unchanged
                                rt.spawn(async move {
                                    let _ = feeds.notifications.mark_read(&id).await;
                                });
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

fn draw_ui(
    frame: &mut Frame,
    state: &DashboardState,
    snapshot: &Snapshot,
    clinician: &ClinicianProfile,
    demo_mode: bool,
) {
    let area = frame.area();

    // Background
    frame.render_widget(
        Block::default().style(Style::default().bg(colors::BG_DARK)),
        area,
    );

    // Main layout
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(5), // Stats panel
            Constraint::Min(10),   // Feeds + Activity
            Constraint::Length(3), // Footer
        ])
        .split(area);

    draw_header(frame, chunks[0], snapshot, clinician, demo_mode);
    draw_stats_panel(frame, chunks[1], &snapshot.stats);
    draw_main_content(frame, chunks[2], state, snapshot);
    draw_footer(frame, chunks[3]);
}

fn draw_header(
    frame: &mut Frame,
    area: Rect,
    snapshot: &Snapshot,
    clinician: &ClinicianProfile,
    demo_mode: bool,
) {
    let (mode_text, mode_color) = if demo_mode {
        ("DEMO", colors::GOLD)
    } else {
        ("LIVE", colors::SUCCESS)
    };

    let unread = snapshot.stats.unread;
    let badge_color = if unread > 0 { colors::ALERT } else { colors::SILVER };

    let title = Line::from(vec![
        Span::styled(
            " CARE FEED ",
            Style::default().fg(colors::WHITE).bg(colors::DARK_TEAL).bold(),
        ),
        Span::raw("  "),
        Span::styled(
            clinician.name.as_str(),
            Style::default().fg(colors::WHITE).bold(),
        ),
        Span::styled(
            format!(" ({})", clinician.role),
            Style::default().fg(colors::SILVER),
        ),
        Span::raw("  "),
        Span::styled(
            format!("[{}]", mode_text),
            Style::default().fg(mode_color).bold(),
        ),
        Span::raw("  "),
        Span::styled(
            format!("[{} unread]", unread),
            Style::default().fg(badge_color).bold(),
        ),
    ]);

    let header = Paragraph::new(title)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(colors::DARK_TEAL))
                .style(Style::default().bg(colors::BG_DARK)),
        );

    frame.render_widget(header, area);
}

fn draw_stats_panel(frame: &mut Frame, area: Rect, stats: &FeedStats) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
            Constraint::Percentage(25),
        ])
        .split(area);

    draw_stat_box(frame, chunks[0], "APPOINTMENTS", stats.appointments, colors::WHITE);
    draw_stat_box(
        frame,
        chunks[1],
        "URGENT",
        stats.urgent,
        if stats.urgent > 0 { colors::ALERT } else { colors::SILVER },
    );
    draw_stat_box(frame, chunks[2], "UNREAD", stats.unread, colors::GOLD);
    draw_stat_box(
        frame,
        chunks[3],
        "EMERGENCIES",
        stats.emergencies,
        if stats.emergencies > 0 { colors::ALERT } else { colors::SILVER },
    );
}

fn draw_stat_box(frame: &mut Frame, area: Rect, label: &str, value: usize, value_color: Color) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors::SILVER))
        .border_type(BorderType::Rounded)
        .style(Style::default().bg(colors::BG_PANEL));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let text = vec![
        Line::from(Span::styled(
            label,
            Style::default().fg(colors::SILVER).add_modifier(Modifier::DIM),
        )),
        Line::from(Span::styled(
            value.to_string(),
            Style::default().fg(value_color).bold(),
        )),
    ];

    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center), inner);
}

fn draw_main_content(frame: &mut Frame, area: Rect, state: &DashboardState, snapshot: &Snapshot) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let selected = snapshot.appointments.records.get(state.selected_appointment);
    match selected.filter(|_| state.show_detail) {
        Some(appointment) => {
            let left = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(columns[0]);
            draw_appointments_panel(frame, left[0], state, &snapshot.appointments);
            draw_patient_panel(frame, left[1], &PatientDetails::from_appointment(appointment));
        }
        None => draw_appointments_panel(frame, columns[0], state, &snapshot.appointments),
    }

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(columns[1]);
    draw_notifications_panel(frame, right[0], state, &snapshot.notifications);
    draw_activity_panel(frame, right[1], state);
}

fn panel(title: &str, focused: bool) -> Block<'_> {
    let border = if focused { colors::TEAL } else { colors::SILVER };
    Block::default()
        .title(Span::styled(
            format!(" {} ", title),
            Style::default().fg(colors::WHITE).bold(),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .border_type(BorderType::Rounded)
        .style(Style::default().bg(colors::BG_PANEL))
}

fn loading_title(base: &str, loading: bool) -> String {
    if loading {
        format!("{} (loading...)", base)
    } else {
        base.to_string()
    }
}

fn draw_appointments_panel(
    frame: &mut Frame,
    area: Rect,
    state: &DashboardState,
    view: &FeedView<AppointmentRecord>,
) {
    let title = loading_title("APPOINTMENTS", view.loading);
    let block = panel(&title, state.focus == Focus::Appointments);

    let rows: Vec<Row> = view
        .records
        .iter()
        .map(|a| {
            let priority_style = if a.is_urgent() {
                Style::default().fg(colors::ALERT).bold()
            } else {
                Style::default().fg(colors::SILVER)
            };
            let time = a
                .appointment_time
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string());

            Row::new(vec![
                Cell::from(Span::styled(time, Style::default().fg(colors::GOLD))),
                Cell::from(Span::styled(a.display_name().to_string(), Style::default().fg(colors::WHITE))),
                Cell::from(Span::styled(
                    a.reason.clone().unwrap_or_default(),
                    Style::default().fg(colors::SILVER),
                )),
                Cell::from(Span::styled(a.status.clone().unwrap_or_default(), Style::default().fg(colors::TEAL))),
                Cell::from(Span::styled(a.priority.clone().unwrap_or_default(), priority_style)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Min(16),
            Constraint::Min(16),
            Constraint::Length(12),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(vec![
            Cell::from(Span::styled("TIME", Style::default().fg(colors::GOLD).bold())),
            Cell::from(Span::styled("PATIENT", Style::default().fg(colors::GOLD).bold())),
            Cell::from(Span::styled("REASON", Style::default().fg(colors::GOLD).bold())),
            Cell::from(Span::styled("STATUS", Style::default().fg(colors::GOLD).bold())),
            Cell::from(Span::styled("PRIORITY", Style::default().fg(colors::GOLD).bold())),
        ])
        .bottom_margin(1),
    )
    .block(block)
    .row_highlight_style(Style::default().bg(colors::DARK_TEAL));

    let mut table_state = TableState::default().with_selected(
        (!view.records.is_empty()).then_some(state.selected_appointment),
    );
    frame.render_stateful_widget(table, area, &mut table_state);
}

fn draw_patient_panel(frame: &mut Frame, area: Rect, details: &PatientDetails) {
    let block = panel("PATIENT DETAILS", false);

    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<10}", label), Style::default().fg(colors::SILVER)),
            Span::styled(value, Style::default().fg(colors::WHITE)),
        ])
    };
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let vitals = &details.vitals;

    let when = match (details.appointment_date, details.appointment_time) {
        (Some(date), Some(time)) => format!("{} {}", date, time.format("%H:%M")),
        (Some(date), None) => date.to_string(),
        (None, Some(time)) => time.format("%H:%M").to_string(),
        (None, None) => "-".to_string(),
    };

    let lines = vec![
        field("Name", details.name.clone()),
        field("Phone", or_dash(&details.phone)),
        field("When", when),
        field("Service", or_dash(&details.service)),
        field("Reason", or_dash(&details.reason)),
        field("Status", or_dash(&details.status)),
        field("Location", or_dash(&details.location)),
        Line::from(""),
        Line::from(vec![
            Span::styled("HR ", Style::default().fg(colors::SILVER)),
            Span::styled(format!("{} bpm  ", vitals.heart_rate_bpm), Style::default().fg(colors::ALERT)),
            Span::styled("BP ", Style::default().fg(colors::SILVER)),
            Span::styled(format!("{}  ", vitals.blood_pressure), Style::default().fg(colors::TEAL)),
            Span::styled("Temp ", Style::default().fg(colors::SILVER)),
            Span::styled(format!("{:.1}°C", vitals.temperature_c), Style::default().fg(colors::GOLD)),
        ]),
        Line::from(vec![
            Span::styled("Weight ", Style::default().fg(colors::SILVER)),
            Span::styled(format!("{} kg  ", vitals.weight_kg), Style::default().fg(colors::SUCCESS)),
            Span::styled("Height ", Style::default().fg(colors::SILVER)),
            Span::styled(format!("{} cm", vitals.height_cm), Style::default().fg(colors::WHITE)),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
}

fn draw_notifications_panel(
    frame: &mut Frame,
    area: Rect,
    state: &DashboardState,
    view: &FeedView<NotificationRecord>,
) {
    let title = loading_title("NOTIFICATIONS", view.loading);
    let block = panel(&title, state.focus == Focus::Notifications);

    let items: Vec<ListItem> = view
        .records
        .iter()
        .map(|n| {
            let (tag, tag_color) = match n.kind {
                NotificationKind::Emergency => ("[EMR]", colors::ALERT),
                NotificationKind::Appointment => ("[APT]", colors::TEAL),
                NotificationKind::Lab => ("[LAB]", colors::GOLD),
                NotificationKind::Message => ("[MSG]", colors::SILVER),
            };
            let title_style = match (n.read, n.priority) {
                (true, _) => Style::default().fg(colors::SILVER).add_modifier(Modifier::DIM),
                (false, NotificationPriority::High) => Style::default().fg(colors::WHITE).bold(),
                (false, _) => Style::default().fg(colors::WHITE),
            };

            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(if n.read { "  " } else { "* " }, Style::default().fg(colors::GOLD)),
                    Span::styled(format!("{} ", tag), Style::default().fg(tag_color)),
                    Span::styled(n.title.clone(), title_style),
                    Span::styled(
                        format!("  {}", n.created_at.with_timezone(&chrono::Local).format("%H:%M")),
                        Style::default().fg(colors::SILVER).add_modifier(Modifier::DIM),
                    ),
                ]),
                Line::from(Span::styled(
                    format!("      {}", n.message),
                    Style::default().fg(colors::SILVER),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(colors::DARK_TEAL));

    let mut list_state = ListState::default().with_selected(
        (!view.records.is_empty()).then_some(state.selected_notification),
    );
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_activity_panel(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let block = panel("ACTIVITY LOG", false);

    let logs: Vec<Line> = state
        .activity_log
        .iter()
        .rev()
        .take(20)
        .map(|entry| {
            let (prefix, color) = match entry.level.as_str() {
                "ALERT" => ("[ALR]", colors::ALERT),
                "WARN" => ("[WRN]", colors::GOLD),
                "INFO" => ("[INF]", colors::SUCCESS),
                _ => ("[---]", colors::SILVER),
            };

            Line::from(vec![
                Span::styled(
                    format!("{} ", entry.timestamp.format("%H:%M:%S")),
                    Style::default().fg(colors::SILVER).add_modifier(Modifier::DIM),
                ),
                Span::styled(format!("{} ", prefix), Style::default().fg(color)),
                Span::styled(entry.message.as_str(), Style::default().fg(colors::WHITE)),
            ])
        })
        .collect();

    let paragraph = Paragraph::new(logs)
        .block(block)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, area);
}

fn draw_footer(frame: &mut Frame, area: Rect) {
    let help = Line::from(vec![
        Span::styled(" [Q] ", Style::default().fg(colors::BG_DARK).bg(colors::ALERT)),
        Span::styled(" Quit ", Style::default().fg(colors::SILVER)),
        Span::raw("  "),
        Span::styled(" [TAB] ", Style::default().fg(colors::BG_DARK).bg(colors::TEAL)),
        Span::styled(" Switch panel ", Style::default().fg(colors::SILVER)),
        Span::raw("  "),
        Span::styled(" [UP/DOWN] ", Style::default().fg(colors::BG_DARK).bg(colors::SILVER)),
        Span::styled(" Select ", Style::default().fg(colors::SILVER)),
        Span::raw("  "),
        Span::styled(" [ENTER] ", Style::default().fg(colors::BG_DARK).bg(colors::WHITE)),
        Span::styled(" Patient details ", Style::default().fg(colors::SILVER)),
        Span::raw("  "),
        Span::styled(" [M] ", Style::default().fg(colors::BG_DARK).bg(colors::GOLD)),
        Span::styled(" Mark read ", Style::default().fg(colors::SILVER)),
    ]);

    let footer = Paragraph::new(help)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(colors::DARK_TEAL))
                .style(Style::default().bg(colors::BG_DARK)),
        );

    frame.render_widget(footer, area);
}

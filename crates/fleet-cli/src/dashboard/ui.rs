// Dashboard rendering.

use super::app::{App, AppMode, SystemStats};
use fleet_common::ServiceState;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};
use ratatui::Frame;

const BAR_WIDTH: usize = 20;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn state_color(state: ServiceState) -> Color {
    match state {
        ServiceState::Active => Color::Green,
        ServiceState::Activating | ServiceState::Deactivating => Color::Cyan,
        ServiceState::Inactive => Color::Yellow,
        ServiceState::Failed => Color::Red,
        ServiceState::NotFound => Color::DarkGray,
    }
}

fn heading(text: &str) -> Line<'_> {
    Line::from(Span::styled(
        text,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(10),   // runners, logs or help
            Constraint::Length(3), // host stats
            Constraint::Length(1), // status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    match app.mode {
        AppMode::Help => draw_help(frame, chunks[1]),
        AppMode::Logs => draw_logs(frame, app, chunks[1]),
        AppMode::Normal => draw_runners(frame, app, chunks[1]),
    }
    draw_system_stats(frame, &app.system_stats, chunks[2]);
    draw_status_bar(frame, app, chunks[3]);
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let (active, failed, total) = app.counts();
    let failed_color = if failed > 0 { Color::Red } else { Color::DarkGray };
    let title = Line::from(vec![
        Span::styled(
            " Runner Fleet ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(format!("● {active} active"), Style::default().fg(Color::Green)),
        Span::raw(" | "),
        Span::styled(format!("✗ {failed} failed"), Style::default().fg(failed_color)),
        Span::raw(" | "),
        Span::raw(format!("{total} total")),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(Paragraph::new(title).block(block), area);
}

fn draw_runners(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let items: Vec<ListItem> = app
        .runners
        .iter()
        .enumerate()
        .map(|(i, status)| {
            let line_style = if i == app.selected {
                Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let content = Line::from(vec![
                Span::styled(
                    format!(" {} ", status.state.symbol()),
                    Style::default().fg(state_color(status.state)),
                ),
                Span::styled(format!("{}/{}", status.runner.repo, status.name), line_style),
            ]);
            ListItem::new(content).style(line_style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Runners ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    frame.render_widget(list, chunks[0]);
    draw_details(frame, app, chunks[1]);
}

fn draw_details(frame: &mut Frame, app: &App, area: Rect) {
    let field = |label: &'static str, value: Span<'static>| {
        Line::from(vec![Span::styled(label, Style::default().fg(Color::Cyan)), value])
    };

    let details = match app.selected_runner() {
        Some(status) => vec![
            field("Name: ", Span::raw(status.name.clone())),
            field("Repository: ", Span::raw(status.runner.repo.clone())),
            field(
                "Status: ",
                Span::styled(
                    format!("{} {}", status.state.symbol(), status.state),
                    Style::default().fg(state_color(status.state)),
                ),
            ),
            field(
                "Service: ",
                Span::raw(status.service.clone().unwrap_or_else(|| "-".to_string())),
            ),
            field("Path: ", Span::raw(status.path.display().to_string())),
            Line::from(""),
            Line::from(Span::styled("Actions: ", Style::default().fg(Color::Yellow))),
            Line::from("  [s] Start  [x] Stop  [r] Restart  [l] Logs"),
        ],
        None => vec![
            Line::from("No runners found."),
            Line::from("Create some with: runner-fleet setup <owner>/<repo> [count]"),
        ],
    };

    let block = Block::default()
        .title(" Details ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));
    frame.render_widget(Paragraph::new(details).block(block), area);
}

fn draw_logs(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.selected_runner() {
        Some(status) => format!(" Logs: {} ", status.name),
        None => " Logs ".to_string(),
    };

    let lines: Vec<Line> = app
        .logs
        .iter()
        .skip(app.log_scroll)
        .map(|line| {
            let lower = line.to_lowercase();
            let style = if lower.contains("error") {
                Style::default().fg(Color::Red)
            } else if lower.contains("warn") {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            Line::styled(line.as_str(), style)
        })
        .collect();

    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta));
    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let help = vec![
        heading("Navigation"),
        Line::from("  ↑/k      Move up"),
        Line::from("  ↓/j      Move down"),
        Line::from(""),
        heading("Actions"),
        Line::from("  s        Start selected runner"),
        Line::from("  x        Stop selected runner"),
        Line::from("  r        Restart selected runner"),
        Line::from("  l        Toggle logs view"),
        Line::from(""),
        heading("General"),
        Line::from("  ?/h      Toggle this help"),
        Line::from("  q        Quit"),
        Line::from(""),
        heading("In Logs View"),
        Line::from("  ↑/k      Scroll up"),
        Line::from("  ↓/j      Scroll down"),
        Line::from("  l/Esc    Exit logs view"),
    ];
    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));
    frame.render_widget(Paragraph::new(help).block(block), area);
}

fn draw_system_stats(frame: &mut Frame, stats: &SystemStats, area: Rect) {
    let cpu = f64::from(stats.cpu_usage);
    let mem = memory_percent(stats);
    let content = Line::from(vec![
        Span::styled(" CPU: ", Style::default().fg(Color::Cyan)),
        Span::styled(create_bar(cpu, BAR_WIDTH), Style::default().fg(usage_color(cpu, 50.0, 80.0))),
        Span::raw(format!(" {cpu:5.1}%")),
        Span::raw("  |  "),
        Span::styled("MEM: ", Style::default().fg(Color::Cyan)),
        Span::styled(create_bar(mem, BAR_WIDTH), Style::default().fg(usage_color(mem, 70.0, 90.0))),
        Span::raw(format!(
            " {:.1}/{:.1} GB",
            stats.memory_used as f64 / GIB,
            stats.memory_total as f64 / GIB
        )),
        Span::raw("  |  "),
        Span::styled("Load: ", Style::default().fg(Color::Cyan)),
        Span::raw(format!(
            "{:.2} {:.2} {:.2}",
            stats.load_avg[0], stats.load_avg[1], stats.load_avg[2]
        )),
    ]);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(Paragraph::new(content).block(block), area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode = match app.mode {
        AppMode::Normal => "NORMAL",
        AppMode::Logs => "LOGS",
        AppMode::Help => "HELP",
    };
    let message = app.status_message.as_deref().unwrap_or("");
    let message_style = if message.starts_with("ERROR") || message.starts_with("Error") {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let content = Line::from(vec![
        Span::styled(format!(" {mode} "), Style::default().bg(Color::Blue).fg(Color::White)),
        Span::raw(" "),
        Span::styled(message, message_style),
        Span::raw("  "),
        Span::styled(" ?:help q:quit ", Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(content), area);
}

fn memory_percent(stats: &SystemStats) -> f64 {
    if stats.memory_total == 0 {
        return 0.0;
    }
    stats.memory_used as f64 / stats.memory_total as f64 * 100.0
}

/// `[████░░░░]` for a 0-100 percentage.
pub fn create_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

fn usage_color(percent: f64, medium: f64, high: f64) -> Color {
    if percent > high {
        Color::Red
    } else if percent > medium {
        Color::Yellow
    } else {
        Color::Green
    }
}

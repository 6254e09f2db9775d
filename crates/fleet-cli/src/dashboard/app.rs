// Dashboard state and key handling. All service work goes through the worker.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fleet_common::{RunnerDir, RunnerRef, RunnerStatus, ServiceAction, ServiceState};
use sysinfo::System;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Normal,
    Logs,
    Help,
}

/// Requests from the UI thread to the worker task.
#[derive(Debug)]
pub enum WorkerCommand {
    Refresh,
    Control {
        dir: RunnerDir,
        unit: String,
        action: ServiceAction,
    },
    FetchLogs {
        dir: RunnerDir,
        unit: Option<String>,
    },
    Shutdown,
}

/// Results from the worker task.
#[derive(Debug)]
pub enum WorkerResponse {
    RunnersUpdated(Vec<RunnerStatus>),
    ActionComplete { message: String },
    Logs { runner: RunnerRef, lines: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_used: u64,
    pub memory_total: u64,
    pub load_avg: [f64; 3],
}

impl Default for SystemStats {
    fn default() -> Self {
        Self {
            cpu_usage: 0.0,
            memory_used: 0,
            memory_total: 1,
            load_avg: [0.0; 3],
        }
    }
}

pub const WORKER_CRASHED: &str = "ERROR: Background worker crashed. Data may be stale.";

pub struct App {
    pub runners: Vec<RunnerStatus>,
    pub selected: usize,
    pub system_stats: SystemStats,
    pub should_quit: bool,
    pub mode: AppMode,
    pub status_message: Option<String>,
    pub logs: Vec<String>,
    pub log_scroll: usize,
    scroll_to_end: bool,
    worker_alive: bool,
    system: System,
    command_tx: UnboundedSender<WorkerCommand>,
    response_rx: UnboundedReceiver<WorkerResponse>,
}

impl App {
    pub fn new(
        runners: Vec<RunnerStatus>,
        command_tx: UnboundedSender<WorkerCommand>,
        response_rx: UnboundedReceiver<WorkerResponse>,
    ) -> Self {
        Self {
            runners,
            selected: 0,
            system_stats: SystemStats::default(),
            should_quit: false,
            mode: AppMode::Normal,
            status_message: None,
            logs: Vec::new(),
            log_scroll: 0,
            scroll_to_end: false,
            worker_alive: true,
            system: System::new(),
            command_tx,
            response_rx,
        }
    }

    /// Periodic tick: ask the worker for fresh state and sample host stats.
    pub fn refresh(&mut self) {
        self.send(WorkerCommand::Refresh);
        if self.mode == AppMode::Logs {
            self.request_logs();
        }

        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        let load = System::load_average();
        self.system_stats = SystemStats {
            cpu_usage: self.system.global_cpu_usage(),
            memory_used: self.system.used_memory(),
            memory_total: self.system.total_memory(),
            load_avg: [load.one, load.five, load.fifteen],
        };
    }

    /// Drain worker responses without blocking.
    pub fn poll_worker_updates(&mut self) {
        loop {
            match self.response_rx.try_recv() {
                Ok(WorkerResponse::RunnersUpdated(runners)) => {
                    self.runners = runners;
                    if self.selected >= self.runners.len() {
                        self.selected = self.runners.len().saturating_sub(1);
                    }
                }
                Ok(WorkerResponse::ActionComplete { message }) => {
                    self.status_message = Some(message);
                }
                Ok(WorkerResponse::Logs { runner, lines }) => {
                    let current = self.selected_runner().map(|r| &r.runner);
                    if self.mode == AppMode::Logs && current == Some(&runner) {
                        self.logs = lines;
                        if std::mem::take(&mut self.scroll_to_end) {
                            self.log_scroll = self.logs.len().saturating_sub(1);
                        } else {
                            self.log_scroll = self.log_scroll.min(self.logs.len().saturating_sub(1));
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.mark_worker_dead();
                    break;
                }
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.worker_alive {
            self.status_message = None;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match self.mode {
            AppMode::Help => self.mode = AppMode::Normal,
            AppMode::Logs => match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('l') | KeyCode::Esc => self.toggle_logs(),
                KeyCode::Up | KeyCode::Char('k') => self.scroll_logs_up(),
                KeyCode::Down | KeyCode::Char('j') => self.scroll_logs_down(),
                KeyCode::Char('?') | KeyCode::Char('h') => self.toggle_help(),
                _ => {}
            },
            AppMode::Normal => match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
                KeyCode::Down | KeyCode::Char('j') => self.select_next(),
                KeyCode::Char('s') => self.control_selected(ServiceAction::Start),
                KeyCode::Char('x') => self.control_selected(ServiceAction::Stop),
                KeyCode::Char('r') => self.control_selected(ServiceAction::Restart),
                KeyCode::Char('l') => self.toggle_logs(),
                KeyCode::Char('?') | KeyCode::Char('h') => self.toggle_help(),
                _ => {}
            },
        }
    }

    pub fn selected_runner(&self) -> Option<&RunnerStatus> {
        self.runners.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.runners.is_empty() {
            self.selected = (self.selected + 1) % self.runners.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.runners.is_empty() {
            self.selected = self.selected.checked_sub(1).unwrap_or(self.runners.len() - 1);
        }
    }

    pub fn scroll_logs_up(&mut self) {
        self.log_scroll = self.log_scroll.saturating_sub(1);
    }

    pub fn scroll_logs_down(&mut self) {
        if self.log_scroll < self.logs.len().saturating_sub(1) {
            self.log_scroll += 1;
        }
    }

    fn control_selected(&mut self, action: ServiceAction) {
        let Some(status) = self.selected_runner() else {
            return;
        };
        let Some(unit) = status.service.clone() else {
            self.status_message = Some(format!("{}: no service installed", status.name));
            return;
        };
        let message = format!("{} {}...", progressive(action), status.name);
        let command = WorkerCommand::Control {
            dir: status.runner_dir(),
            unit,
            action,
        };
        if self.send(command) {
            self.status_message = Some(message);
        }
    }

    pub fn toggle_logs(&mut self) {
        if self.mode == AppMode::Logs {
            self.mode = AppMode::Normal;
            self.logs.clear();
            self.log_scroll = 0;
        } else {
            self.mode = AppMode::Logs;
            self.scroll_to_end = true;
            self.request_logs();
        }
    }

    pub fn toggle_help(&mut self) {
        self.mode = if self.mode == AppMode::Help {
            AppMode::Normal
        } else {
            AppMode::Help
        };
    }

    /// `(active, failed, total)`
    pub fn counts(&self) -> (usize, usize, usize) {
        let count = |state: ServiceState| self.runners.iter().filter(|r| r.state == state).count();
        (
            count(ServiceState::Active),
            count(ServiceState::Failed),
            self.runners.len(),
        )
    }

    fn request_logs(&mut self) {
        if let Some(status) = self.selected_runner() {
            let command = WorkerCommand::FetchLogs {
                dir: status.runner_dir(),
                unit: status.service.clone(),
            };
            self.send(command);
        }
    }

    fn send(&mut self, command: WorkerCommand) -> bool {
        if self.command_tx.send(command).is_err() {
            self.mark_worker_dead();
            return false;
        }
        true
    }

    fn mark_worker_dead(&mut self) {
        self.worker_alive = false;
        self.status_message = Some(WORKER_CRASHED.to_string());
    }
}

impl Drop for App {
    fn drop(&mut self) {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);
    }
}

fn progressive(action: ServiceAction) -> &'static str {
    match action {
        ServiceAction::Start => "Starting",
        ServiceAction::Stop => "Stopping",
        ServiceAction::Restart => "Restarting",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    fn status(repo: &str, index: u32, service: Option<&str>, state: ServiceState) -> RunnerStatus {
        let runner = RunnerRef::new(repo, index).unwrap();
        RunnerStatus {
            name: runner.runner_name(),
            path: format!("/srv/action-runners/{repo}/{index}").into(),
            service: service.map(str::to_string),
            state,
            runner,
        }
    }

    fn app() -> (App, UnboundedReceiver<WorkerCommand>, UnboundedSender<WorkerResponse>) {
        let (command_tx, command_rx) = unbounded_channel();
        let (response_tx, response_rx) = unbounded_channel();
        let runners = vec![
            status("gadgets", 1, Some("actions.runner.o-gadgets.gadgets-runner-1.service"), ServiceState::Active),
            status("widgets", 1, None, ServiceState::NotFound),
            status("widgets", 2, Some("actions.runner.o-widgets.widgets-runner-2.service"), ServiceState::Failed),
        ];
        (App::new(runners, command_tx, response_rx), command_rx, response_tx)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn selection_wraps_both_ways() {
        let (mut app, _rx, _tx) = app();
        press(&mut app, KeyCode::Up);
        assert_eq!(app.selected, 2);
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.selected, 0);
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn counts_active_failed_total() {
        let (app, _rx, _tx) = app();
        assert_eq!(app.counts(), (1, 1, 3));
    }

    #[test]
    fn control_key_sends_the_selected_unit() {
        let (mut app, mut rx, _tx) = app();
        press(&mut app, KeyCode::Char('r'));
        match rx.try_recv().unwrap() {
            WorkerCommand::Control { dir, unit, action } => {
                assert_eq!(dir.runner, RunnerRef::new("gadgets", 1).unwrap());
                assert_eq!(unit, "actions.runner.o-gadgets.gadgets-runner-1.service");
                assert_eq!(action, ServiceAction::Restart);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(app.status_message.as_deref(), Some("Restarting gadgets-runner-1..."));
    }

    #[test]
    fn control_without_service_stays_local() {
        let (mut app, mut rx, _tx) = app();
        app.selected = 1;
        press(&mut app, KeyCode::Char('s'));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            app.status_message.as_deref(),
            Some("widgets-runner-1: no service installed")
        );
    }

    #[test]
    fn logs_view_scrolls_to_end_then_clamps() {
        let (mut app, mut rx, tx) = app();
        press(&mut app, KeyCode::Char('l'));
        assert_eq!(app.mode, AppMode::Logs);
        assert!(matches!(rx.try_recv().unwrap(), WorkerCommand::FetchLogs { .. }));

        let lines: Vec<String> = (1..=5).map(|i| format!("line {i}")).collect();
        tx.send(WorkerResponse::Logs {
            runner: RunnerRef::new("gadgets", 1).unwrap(),
            lines,
        })
        .unwrap();
        app.poll_worker_updates();
        assert_eq!(app.log_scroll, 4);

        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.log_scroll, 4);
        press(&mut app, KeyCode::Char('k'));
        assert_eq!(app.log_scroll, 3);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, AppMode::Normal);
        assert!(app.logs.is_empty());
    }

    #[test]
    fn logs_for_another_runner_are_ignored() {
        let (mut app, _rx, tx) = app();
        press(&mut app, KeyCode::Char('l'));
        tx.send(WorkerResponse::Logs {
            runner: RunnerRef::new("widgets", 2).unwrap(),
            lines: vec!["stale".into()],
        })
        .unwrap();
        app.poll_worker_updates();
        assert!(app.logs.is_empty());
    }

    #[test]
    fn help_closes_on_any_key() {
        let (mut app, _rx, _tx) = app();
        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.mode, AppMode::Help);
        press(&mut app, KeyCode::Char('z'));
        assert_eq!(app.mode, AppMode::Normal);
        assert!(!app.should_quit);
    }

    #[test]
    fn quit_keys() {
        let (mut app, _rx, _tx) = app();
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);

        let (mut app, _rx, _tx) = self::app();
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn shrinking_list_keeps_selection_valid() {
        let (mut app, _rx, tx) = app();
        app.selected = 2;
        tx.send(WorkerResponse::RunnersUpdated(vec![status(
            "gadgets",
            1,
            None,
            ServiceState::Inactive,
        )]))
        .unwrap();
        app.poll_worker_updates();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn dead_worker_is_reported_and_sticks() {
        let (mut app, rx, tx) = app();
        drop(rx);
        drop(tx);
        app.poll_worker_updates();
        assert_eq!(app.status_message.as_deref(), Some(WORKER_CRASHED));
        press(&mut app, KeyCode::Down);
        assert_eq!(app.status_message.as_deref(), Some(WORKER_CRASHED));
    }

    #[test]
    fn drop_asks_worker_to_shut_down() {
        let (app, mut rx, _tx) = app();
        drop(app);
        assert!(matches!(rx.try_recv().unwrap(), WorkerCommand::Shutdown));
    }
}

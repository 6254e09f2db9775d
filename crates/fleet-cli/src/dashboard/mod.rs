// `dashboard`: full-screen runner view.
//
// The crossterm event loop runs on a blocking thread; a tokio task owns every
// service call and talks to it over unbounded mpsc channels.

pub mod app;
pub mod ui;
pub mod worker;

use anyhow::{Context, Result};
use app::App;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use fleet_common::constants::return_code;
use fleet_common::service::collect_status;
use fleet_common::{FleetError, HostContext};
use fleet_sdk::TraceWriter;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use worker::Worker;

const REFRESH_INTERVAL: Duration = Duration::from_millis(1000);
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run(context: Arc<HostContext>) -> Result<i32> {
    if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
        return Err(FleetError::usage("The dashboard needs an interactive terminal").into());
    }

    let trace = context.get_trace("Dashboard");
    let manager = context.service_manager()?;
    let dirs = context.layout().discover()?;
    let runners = collect_status(manager.as_ref(), &dirs, &trace).await;

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(Worker::new(context.clone(), manager).run(command_rx, response_tx));

    let app = App::new(runners, command_tx, response_rx);
    let result = tokio::task::spawn_blocking(move || run_ui(app))
        .await
        .context("Dashboard UI thread failed")?;

    if let Err(e) = worker.await {
        trace.warning(&format!("Dashboard worker ended abnormally: {e}"));
    }
    result?;
    Ok(return_code::SUCCESS)
}

/// Leaves the alternate screen and raw mode when dropped.
struct TerminalCleanup {
    enabled: bool,
}

impl TerminalCleanup {
    fn disable(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        restore_terminal();
    }
}

impl Drop for TerminalCleanup {
    fn drop(&mut self) {
        self.disable();
    }
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

fn run_ui(mut app: App) -> Result<()> {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        restore_terminal();
        original_hook(panic);
    }));

    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut cleanup = TerminalCleanup { enabled: true };
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&mut terminal, &mut app);

    cleanup.disable();
    terminal.show_cursor()?;
    result
}

fn event_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_refresh = Instant::now();
    app.refresh();

    while !app.should_quit {
        app.poll_worker_updates();
        terminal.draw(|frame| ui::draw(frame, app))?;

        let until_refresh = REFRESH_INTERVAL.saturating_sub(last_refresh.elapsed());
        if event::poll(until_refresh.min(INPUT_POLL_INTERVAL))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if last_refresh.elapsed() >= REFRESH_INTERVAL {
            app.refresh();
            last_refresh = Instant::now();
        }
    }
    Ok(())
}

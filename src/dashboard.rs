//! The interactive terminal loop.
//!
//! Runs on the calling thread. Each tick takes the newest snapshot, draws,
//! and handles at most one input event. Server actions block the loop on the
//! runtime while a "working" overlay is shown.

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::Event,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use tokio::runtime::Handle;

use crate::app::{App, Overlay};
use crate::dispatcher::ActionDispatcher;
use crate::events::{self, Action};
use crate::ui;

/// How long to wait for input before redrawing.
const TICK: Duration = Duration::from_millis(100);

/// Apply an action to the dashboard, calling the server where needed.
pub async fn perform(app: &mut App, dispatcher: &ActionDispatcher, action: Action) {
    match action {
        Action::Navigate(movement) => app.navigate(movement),
        Action::Quit => app.quit(),
        Action::Explain(target) => {
            let result = dispatcher.explain(&target).await;
            app.close_overlay();
            match result {
                Ok(plan) => app.show_explain(
                    format!("Explain {} on {} ({})", target.op_id, target.server_label, target.namespace),
                    plan,
                ),
                Err(e) => app.set_status_message(e.to_string()),
            }
        }
        Action::Kill(target) => {
            let result = dispatcher.kill(&target).await;
            app.close_overlay();
            match result {
                Ok(()) => app.set_status_message(format!(
                    "Kill sent for {} on {}",
                    target.op_id, target.server_label
                )),
                Err(e) => app.set_status_message(e.to_string()),
            }
        }
        Action::KillBatch { targets, .. } => {
            let report = dispatcher.kill_many(targets).await;
            app.close_overlay();
            match report.failed.first() {
                Some(first) => app.set_status_message(format!("{} ({})", report.summary(), first)),
                None => app.set_status_message(report.summary()),
            }
        }
    }
}

fn working_label(action: &Action) -> Option<String> {
    match action {
        Action::Explain(t) => Some(format!("Explaining {} on {}", t.op_id, t.server_label)),
        Action::Kill(t) => Some(format!("Killing {} on {}", t.op_id, t.server_label)),
        Action::KillBatch { targets, .. } => Some(format!("Killing {} operations", targets.len())),
        Action::Navigate(_) | Action::Quit => None,
    }
}

/// Take over the terminal and run until the operator quits.
pub fn run_tui(mut app: App, dispatcher: ActionDispatcher, runtime: Handle) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    app.reload_data();
    let result = run_app(&mut terminal, &mut app, &dispatcher, &runtime);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    dispatcher: &ActionDispatcher,
    runtime: &Handle,
) -> Result<()> {
    while app.running {
        app.reload_data();
        terminal.draw(|frame| ui::render(frame, app))?;

        let Some(Event::Key(key)) = events::poll_event(TICK)? else {
            continue;
        };
        let Some(action) = events::handle_key_event(app, key) else {
            continue;
        };

        if let Some(label) = working_label(&action) {
            tracing::debug!(action = ?action, "dispatching");
            app.overlay = Some(Overlay::Working(label));
            terminal.draw(|frame| ui::render(frame, app))?;
        }
        runtime.block_on(perform(app, dispatcher, action));
    }

    Ok(())
}

//! Terminal rendering.
//!
//! ```text
//! ┌ header ─────────────────────────────────────┐
//! │ ranked operations table                     │
//! │                                             │
//! ├ server status panel ────────────────────────┤
//! ├ replica set members (if any) ───────────────┤
//! ├ replication sources (if any) ───────────────┤
//! └ status bar ─────────────────────────────────┘
//! ```
//!
//! Overlays (help, explain output, kill prompts) are drawn on top.

pub mod common;
pub mod operations;
pub mod overlay;
pub mod replication;
pub mod servers;
mod theme;

pub use theme::Theme;

use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};

use crate::app::{App, Overlay};

/// Minimum terminal size for a usable display.
pub const MIN_WIDTH: u16 = 60;
pub const MIN_HEIGHT: u16 = 12;

/// Draw one full frame.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = format!(
            "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
            area.width, area.height, MIN_WIDTH, MIN_HEIGHT
        );
        let paragraph = Paragraph::new(msg)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Yellow));
        let top = (area.height / 2).saturating_sub(2);
        let centered = Rect::new(0, top, area.width, 5.min(area.height - top));
        frame.render_widget(paragraph, centered);
        return;
    }

    let members = app.snapshot.replica_members.len();
    let sources = replication::sources(app).len();

    let mut constraints = vec![
        Constraint::Length(1),
        Constraint::Min(6),
        Constraint::Length(panel_height(app.snapshot.servers.len(), area.height / 3)),
    ];
    if members > 0 {
        constraints.push(Constraint::Length(panel_height(members, area.height / 4)));
    }
    if sources > 0 {
        constraints.push(Constraint::Length(panel_height(sources, area.height / 5)));
    }
    constraints.push(Constraint::Length(1));
    let chunks = Layout::vertical(constraints).split(area);

    common::render_header(frame, app, chunks[0]);
    operations::render(frame, app, chunks[1]);
    servers::render(frame, app, chunks[2]);
    let mut next = 3;
    if members > 0 {
        replication::render_members(frame, app, chunks[next]);
        next += 1;
    }
    if sources > 0 {
        replication::render_sources(frame, app, chunks[next]);
        next += 1;
    }
    common::render_status_bar(frame, app, chunks[next]);

    match app.overlay {
        Some(Overlay::Help) => common::render_help(frame, app, area),
        Some(_) => overlay::render(frame, app, area),
        None => {}
    }
}

/// Borders and column header on top of one line per row, capped at `limit`.
fn panel_height(rows: usize, limit: u16) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX).saturating_add(3).min(limit)
}

/// A `width` x `height` rectangle centred in `area`, shrunk to fit.
pub(crate) fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::app_with;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn draw(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_renders_ranked_rows_and_server_panel() {
        let (app, _aggregator) = app_with(2);
        let screen = draw(&app, 120, 30);

        assert!(screen.contains("OPWATCH"));
        assert!(screen.contains("Operations (2) [1/2]"));
        assert!(screen.contains("▶ "));
        assert!(screen.contains("app.orders"));
        assert!(screen.contains("Servers"));
        assert!(screen.contains("UP"));
    }

    #[test]
    fn test_replication_panels_drawn_when_reported() {
        use crate::data::{
            Batch, RawStatus, ReplicaMember, ReplicaSetStatus, ReplicationSource, ServerDetails,
        };
        use std::time::{Duration, SystemTime};

        let (mut app, aggregator) = app_with(1);
        let screen = draw(&app, 120, 40);
        assert!(!screen.contains("Replica set"));
        assert!(!screen.contains("Replication sources"));

        let status = RawStatus {
            replica_set: Some(ReplicaSetStatus {
                name: "rs0".into(),
                reporter_is_primary: true,
                members: vec![ReplicaMember {
                    name: "db1:27017".into(),
                    state: "PRIMARY".into(),
                    uptime: Some(Duration::from_secs(7_500)),
                    lag: Some(Duration::ZERO),
                    ping: None,
                    is_self: true,
                }],
            }),
            replication_source: Some(ReplicationSource {
                host: "legacy-master:27017".into(),
                synced_to: Some(SystemTime::now()),
            }),
            ..RawStatus::default()
        };
        aggregator.publish(
            Batch::success("db1", 2, vec![]).with_details(Some(ServerDetails { status, rates: None })),
        );
        app.reload_data();

        let screen = draw(&app, 120, 40);
        assert!(screen.contains("Replica set"));
        assert!(screen.contains("db1 (db1:27017)"));
        assert!(screen.contains("PRIMARY"));
        assert!(screen.contains("2h05m"));
        assert!(screen.contains("Replication sources"));
        assert!(screen.contains("legacy-master:27017"));
    }

    #[test]
    fn test_too_small_terminal_shows_notice() {
        let (app, _aggregator) = app_with(2);
        let screen = draw(&app, 40, 8);
        assert!(screen.contains("Terminal too small"));
    }

    #[test]
    fn test_kill_prompt_is_drawn() {
        let (mut app, _aggregator) = app_with(1);
        app.overlay = app.selected_target().map(Overlay::ConfirmKill);
        let screen = draw(&app, 100, 24);
        assert!(screen.contains("Kill operation 1 on db1?"));
    }

    #[test]
    fn test_explain_overlay_is_drawn() {
        let (mut app, _aggregator) = app_with(1);
        app.show_explain("Explain 1 on db1".into(), "{\n  \"stage\": \"COLLSCAN\"\n}".into());
        let screen = draw(&app, 100, 24);
        assert!(screen.contains("Explain 1 on db1"));
        assert!(screen.contains("COLLSCAN"));
    }
}

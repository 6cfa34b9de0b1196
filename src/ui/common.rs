//! Common UI components: header bar, status bar, and help overlay.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::{App, Overlay};
use crate::data::Reachability;

use super::centered;

/// Render the header bar.
///
/// Displays: overall state, servers up/down, total operations.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let servers = &app.snapshot.servers;
    let up = servers.iter().filter(|s| s.reachability == Reachability::Connected).count();
    let down = servers.iter().filter(|s| s.reachability == Reachability::Unreachable).count();

    let status_style = if down > 0 {
        app.theme.reachability_style(Reachability::Unreachable)
    } else if up > 0 {
        app.theme.reachability_style(Reachability::Connected)
    } else {
        app.theme.reachability_style(Reachability::Pending)
    };

    let line = Line::from(vec![
        Span::styled(" ● ", status_style),
        Span::styled("OPWATCH ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("{} │ ", app.source_description())),
        Span::styled(format!("{}", up), Style::default().fg(app.theme.healthy)),
        Span::raw(" up "),
        if down > 0 {
            Span::styled(
                format!("{}", down),
                Style::default().fg(app.theme.critical).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled("0", Style::default().add_modifier(Modifier::DIM))
        },
        Span::raw(" down │ "),
        Span::styled(
            format!("{}", app.snapshot.len()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" operations"),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Render the status bar at the bottom.
///
/// Temporary messages take precedence over the key hints.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let controls = match app.overlay {
        Some(Overlay::Explain { .. }) => "↑↓:scroll any key:close",
        Some(Overlay::ThresholdInput(_)) => "Type seconds | Enter:confirm Esc:cancel",
        Some(Overlay::ConfirmKill(_)) | Some(Overlay::ConfirmBatchKill { .. }) => "y:confirm any key:cancel",
        Some(Overlay::Working(_)) => "Waiting for server...",
        _ => "↑↓:select e:explain k:kill K:kill slow ?:help q:quit",
    };

    let status = format!(
        " Updated {:.1}s ago | {}",
        app.snapshot.built_at.elapsed().as_secs_f64(),
        controls
    );

    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let section = |title: &'static str| {
        Line::from(vec![Span::styled(title, Style::default().add_modifier(Modifier::BOLD))])
    };

    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        section(" Navigation"),
        Line::from("  ↑/↓         Move selection"),
        Line::from("  PgUp/PgDn   Jump 10 rows"),
        Line::from("  Home/End    Jump to first/last"),
        Line::from(""),
        section(" Operations"),
        Line::from("  e         Explain selected query"),
        Line::from("  k         Kill selected operation"),
        Line::from("  K         Kill all slower than N seconds"),
        Line::from(""),
        section(" General"),
        Line::from("  ?         Toggle help"),
        Line::from("  q         Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let help_area = centered(area, 44, 19);
    frame.render_widget(Clear, help_area);
    frame.render_widget(Paragraph::new(help_text).block(block), help_area);
}

//! Ranked operations table.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::app::App;
use crate::data::duration::format_running;

/// Render every operation of the current snapshot, longest running first.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let snapshot = &app.snapshot;

    let block = Block::default()
        .title(title(app))
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border));

    if snapshot.is_empty() {
        let text = if snapshot.generation == 0 {
            "Waiting for first sample..."
        } else {
            "No operations in progress"
        };
        let paragraph = Paragraph::new(text)
            .style(Style::default().add_modifier(Modifier::DIM))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let header = Row::new(vec!["Server", "Opid", "Op", "Running", "Namespace", "Client", "Query"])
        .height(1)
        .style(app.theme.header);

    let rows: Vec<Row> = snapshot
        .entries
        .iter()
        .map(|entry| {
            let op = &entry.operation;
            let running = op.running.map(format_running).unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(entry.server_label.clone()),
                Cell::from(op.op_id.to_string()),
                Cell::from(op.kind.clone()),
                Cell::from(running).style(app.theme.running_style(op.running)),
                Cell::from(op.namespace.clone()),
                Cell::from(op.client.clone()),
                Cell::from(op.description.clone()),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(22),
        Constraint::Length(21),
        Constraint::Fill(1),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    state.select(app.selected);

    frame.render_stateful_widget(table, area, &mut state);
}

fn title(app: &App) -> String {
    let count = app.snapshot.len();
    match app.selected {
        Some(i) => format!(" Operations ({}) [{}/{}] ", count, i + 1, count),
        None => format!(" Operations ({}) ", count),
    }
}

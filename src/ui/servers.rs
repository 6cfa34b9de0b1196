//! Server status panel: one row per configured server, in configured order.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table},
    Frame,
};

use crate::app::App;
use crate::data::duration::format_duration;
use crate::data::{Rates, ServerStatus};

const COLUMNS: [&str; 11] = [
    "Server", "State", "Ops", "QPS", "Clients", "Queue", "Flush/s", "Conn", "Memory", "Net in/out", "Sampled",
];

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(COLUMNS.iter().copied().chain(["Last error"]))
        .height(1)
        .style(app.theme.header);

    let rows: Vec<Row> = app
        .snapshot
        .servers
        .iter()
        .map(|status| {
            let mut cells = vec![
                Cell::from(status.info.label.clone()),
                Cell::from(status.reachability.symbol())
                    .style(app.theme.reachability_style(status.reachability)),
                Cell::from(status.operation_count.to_string()),
            ];
            cells.extend(figures(status).into_iter().map(Cell::from));
            cells.push(Cell::from(sampled(status)));
            cells.push(
                Cell::from(status.last_error.clone().unwrap_or_default())
                    .style(Style::default().fg(app.theme.critical)),
            );
            Row::new(cells)
        })
        .collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Length(5),
        Constraint::Length(4),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Length(5),
        Constraint::Length(7),
        Constraint::Length(10),
        Constraint::Length(11),
        Constraint::Length(13),
        Constraint::Length(9),
        Constraint::Fill(1),
    ];

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(" Servers ")
            .title_style(Style::default().add_modifier(Modifier::BOLD))
            .borders(Borders::ALL)
            .border_type(app.theme.border_type)
            .border_style(Style::default().fg(app.theme.border)),
    );

    frame.render_widget(table, area);
}

fn sampled(status: &ServerStatus) -> String {
    status
        .sampled_at
        .map(|t| format!("{} ago", format_duration(t.elapsed())))
        .unwrap_or_else(|| "-".to_string())
}

/// QPS, clients, queue, flushes, connections, memory and network cells.
///
/// Rates read `-` until two samples exist; everything reads `-` when the
/// server gave no status.
fn figures(status: &ServerStatus) -> [String; 7] {
    let Some(details) = &status.details else {
        return std::array::from_fn(|_| "-".to_string());
    };
    let raw = &details.status;
    let rate = |pick: fn(&Rates) -> f64| {
        details
            .rates
            .as_ref()
            .map(|r| quantity(pick(r)))
            .unwrap_or_else(|| "-".to_string())
    };
    let network = match &details.rates {
        Some(r) => format!("{}/{}", bytes(r.bytes_in), bytes(r.bytes_out)),
        None => "-".to_string(),
    };

    [
        rate(|r| r.operations),
        quantity(raw.active_clients as f64),
        quantity(raw.queued as f64),
        rate(|r| r.flushes),
        format!("{}/{}", quantity(raw.connections as f64), quantity(raw.connections_total() as f64)),
        format!("{}/{}", bytes(raw.resident_bytes as f64), bytes(raw.mapped_bytes as f64)),
        network,
    ]
}

/// Short decimal form: `950`, `12.5K`, `3.2M`, `1.1G`.
pub fn quantity(value: f64) -> String {
    scaled(value, 1_000.0, &["", "K", "M", "G", "T"])
}

/// Short binary form of a byte count: `512B`, `1.5K`, `900M`.
pub fn bytes(value: f64) -> String {
    scaled(value, 1_024.0, &["B", "K", "M", "G", "T"])
}

fn scaled(mut value: f64, step: f64, units: &[&str]) -> String {
    let mut unit = 0;
    while value.abs() >= step && unit + 1 < units.len() {
        value /= step;
        unit += 1;
    }
    if unit == 0 || value >= 100.0 {
        format!("{:.0}{}", value, units[unit])
    } else {
        format!("{:.1}{}", value, units[unit])
    }
}

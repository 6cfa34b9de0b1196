//! Replication panels: replica set members and legacy replication sources.
//!
//! Both are drawn only when some server reports them.

use std::time::{Duration, SystemTime};

use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table},
    Frame,
};

use crate::app::App;
use crate::data::duration::{format_duration, format_running};
use crate::data::ReplicationSource;

/// Servers with a replication source, with their labels.
pub fn sources(app: &App) -> Vec<(&str, &ReplicationSource)> {
    app.snapshot
        .servers
        .iter()
        .filter_map(|status| {
            let source = status.details.as_ref()?.status.replication_source.as_ref()?;
            Some((status.info.label.as_str(), source))
        })
        .collect()
}

fn optional(value: Option<Duration>, format: fn(Duration) -> String) -> String {
    value.map(format).unwrap_or_else(|| "-".to_string())
}

pub fn render_members(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["Member", "Set", "State", "Uptime", "Lag", "Ping"])
        .height(1)
        .style(app.theme.header);

    let rows: Vec<Row> = app
        .snapshot
        .replica_members
        .iter()
        .map(|row| {
            let member = &row.member;
            let name = match &row.server_label {
                Some(label) if *label != member.name => format!("{} ({})", label, member.name),
                _ => member.name.clone(),
            };
            Row::new(vec![
                Cell::from(name),
                Cell::from(row.set.clone()),
                Cell::from(member.state.clone()),
                Cell::from(optional(member.uptime, format_running)),
                Cell::from(optional(member.lag, format_running)).style(app.theme.running_style(member.lag)),
                Cell::from(optional(member.ping, format_duration)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Fill(1),
        Constraint::Length(12),
        Constraint::Length(11),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(8),
    ];

    frame.render_widget(Table::new(rows, widths).header(header).block(panel(app, " Replica set ")), area);
}

pub fn render_sources(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec!["Server", "Source", "Synced"]).height(1).style(app.theme.header);

    let rows: Vec<Row> = sources(app)
        .into_iter()
        .map(|(label, source)| {
            let synced = source
                .synced_to
                .map(|at| match SystemTime::now().duration_since(at) {
                    Ok(behind) => format!("{} ago", format_running(behind)),
                    Err(_) => "now".to_string(),
                })
                .unwrap_or_else(|| "-".to_string());
            Row::new(vec![
                Cell::from(label.to_string()),
                Cell::from(source.host.clone()),
                Cell::from(synced),
            ])
        })
        .collect();

    let widths = [Constraint::Length(16), Constraint::Fill(1), Constraint::Length(14)];

    frame.render_widget(
        Table::new(rows, widths).header(header).block(panel(app, " Replication sources ")),
        area,
    );
}

fn panel<'a>(app: &App, title: &'a str) -> Block<'a> {
    Block::default()
        .title(title)
        .title_style(Style::default().add_modifier(Modifier::BOLD))
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border))
}

//! Modal overlays: explain output, kill prompts, and the working indicator.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, Overlay};

use super::centered;

/// Minimum width required for the explain overlay to render properly.
const MIN_OVERLAY_WIDTH: u16 = 50;
/// Minimum height required for the explain overlay to render properly.
const MIN_OVERLAY_HEIGHT: u16 = 10;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    match &app.overlay {
        None | Some(Overlay::Help) => {}
        Some(Overlay::Explain { title, text, scroll }) => {
            render_explain(frame, app, area, title, text, *scroll)
        }
        Some(Overlay::ConfirmKill(target)) => {
            let lines = vec![
                Line::from(format!("Kill operation {} on {}?", target.op_id, target.server_label)),
                Line::from(Span::styled(
                    target.namespace.clone(),
                    Style::default().add_modifier(Modifier::DIM),
                )),
                Line::from(""),
                confirm_hint(),
            ];
            render_prompt(frame, app, area, " Kill ", lines);
        }
        Some(Overlay::ThresholdInput(input)) => {
            let lines = vec![
                Line::from("Kill every operation running longer than"),
                Line::from(vec![
                    Span::styled(format!("{}_", input), app.theme.header),
                    Span::raw(" seconds"),
                ]),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter:next  Esc:cancel",
                    Style::default().add_modifier(Modifier::DIM),
                )),
            ];
            render_prompt(frame, app, area, " Kill slow operations ", lines);
        }
        Some(Overlay::ConfirmBatchKill { threshold, targets }) => {
            let lines = vec![
                Line::from(format!(
                    "Kill {} operation{} running longer than {}s?",
                    targets.len(),
                    if targets.len() == 1 { "" } else { "s" },
                    threshold.as_secs_f64()
                )),
                Line::from(""),
                confirm_hint(),
            ];
            render_prompt(frame, app, area, " Kill slow operations ", lines);
        }
        Some(Overlay::Working(label)) => {
            render_prompt(frame, app, area, " Working ", vec![Line::from(format!("{}...", label))]);
        }
    }
}

fn confirm_hint() -> Line<'static> {
    Line::from(vec![
        Span::styled("y", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(":confirm  any other key:cancel", Style::default().add_modifier(Modifier::DIM)),
    ])
}

fn render_prompt(frame: &mut Frame, app: &App, area: Rect, title: &str, lines: Vec<Line>) {
    let height = lines.len() as u16 + 2;
    let prompt_area = centered(area, 52, height);

    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.warning));

    frame.render_widget(Clear, prompt_area);
    frame.render_widget(Paragraph::new(lines).block(block), prompt_area);
}

fn render_explain(frame: &mut Frame, app: &App, area: Rect, title: &str, text: &str, scroll: u16) {
    // Skip rendering if terminal is too small for the overlay
    if area.width < MIN_OVERLAY_WIDTH || area.height < MIN_OVERLAY_HEIGHT {
        return;
    }

    // Use most of the screen
    let width = (area.width * 95 / 100).clamp(MIN_OVERLAY_WIDTH, 120);
    let height = (area.height * 90 / 100).clamp(MIN_OVERLAY_HEIGHT, 50);
    let overlay_area = centered(area, width, height);

    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(text.to_string())
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));

    frame.render_widget(Clear, overlay_area);
    frame.render_widget(paragraph, overlay_area);
}

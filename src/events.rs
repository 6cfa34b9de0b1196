use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Movement, Overlay, PAGE};
use crate::dispatcher::OpTarget;

/// What a keypress asks the dashboard to do.
///
/// Targets are captured when the key is pressed, so a snapshot arriving
/// before the action runs cannot redirect it.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate(Movement),
    Explain(OpTarget),
    Kill(OpTarget),
    KillBatch { threshold: Duration, targets: Vec<OpTarget> },
    Quit,
}

/// Poll for events with a timeout
pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

/// Handle a key event.
///
/// Overlay and prompt bookkeeping happens here; anything that changes the
/// selection, quits, or needs a server comes back as an [`Action`].
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match app.overlay.take() {
        None => handle_table_key(app, key),
        Some(overlay) => handle_overlay_key(app, overlay, key),
    }
}

fn handle_table_key(app: &mut App, key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),

        KeyCode::Up => Some(Action::Navigate(Movement::Up(1))),
        KeyCode::Down => Some(Action::Navigate(Movement::Down(1))),
        KeyCode::PageUp => Some(Action::Navigate(Movement::Up(PAGE))),
        KeyCode::PageDown => Some(Action::Navigate(Movement::Down(PAGE))),
        KeyCode::Home => Some(Action::Navigate(Movement::First)),
        KeyCode::End => Some(Action::Navigate(Movement::Last)),

        KeyCode::Char('e') => app.selected_target().map(Action::Explain),

        // Kill needs an explicit `y` on the confirmation prompt
        KeyCode::Char('k') => {
            if let Some(target) = app.selected_target() {
                app.overlay = Some(Overlay::ConfirmKill(target));
            }
            None
        }

        KeyCode::Char('K') => {
            app.overlay = Some(Overlay::ThresholdInput(String::new()));
            None
        }

        KeyCode::Char('?') => {
            app.toggle_help();
            None
        }

        _ => None,
    }
}

fn handle_overlay_key(app: &mut App, overlay: Overlay, key: KeyEvent) -> Option<Action> {
    match overlay {
        // Any key closes help
        Overlay::Help => None,

        Overlay::Explain { title, text, scroll } => {
            app.overlay = Some(Overlay::Explain { title, text, scroll });
            match key.code {
                KeyCode::Up => app.scroll_overlay(true, 1),
                KeyCode::Down => app.scroll_overlay(false, 1),
                KeyCode::PageUp => app.scroll_overlay(true, PAGE as u16),
                KeyCode::PageDown => app.scroll_overlay(false, PAGE as u16),
                _ => app.close_overlay(),
            }
            None
        }

        Overlay::ConfirmKill(target) => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::Kill(target)),
            _ => {
                app.set_status_message("Kill cancelled");
                None
            }
        },

        Overlay::ThresholdInput(mut input) => {
            match key.code {
                KeyCode::Char(c) if c.is_ascii_digit() || (c == '.' && !input.contains('.')) => {
                    input.push(c);
                    app.overlay = Some(Overlay::ThresholdInput(input));
                }
                KeyCode::Backspace => {
                    input.pop();
                    app.overlay = Some(Overlay::ThresholdInput(input));
                }
                KeyCode::Enter => confirm_threshold(app, &input),
                KeyCode::Esc => {}
                _ => app.overlay = Some(Overlay::ThresholdInput(input)),
            }
            None
        }

        Overlay::ConfirmBatchKill { threshold, targets } => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::KillBatch { threshold, targets }),
            _ => {
                app.set_status_message("Kill cancelled");
                None
            }
        },

        // Keys typed while a call is in flight are dropped
        Overlay::Working(label) => {
            app.overlay = Some(Overlay::Working(label));
            None
        }
    }
}

fn confirm_threshold(app: &mut App, input: &str) {
    let threshold = match input.parse::<f64>().map(Duration::try_from_secs_f64) {
        Ok(Ok(threshold)) => threshold,
        _ => {
            app.set_status_message(format!("Not a number of seconds: {:?}", input));
            return;
        }
    };

    let targets = app.targets_longer_than(threshold);
    if targets.is_empty() {
        app.set_status_message(format!("No operations running longer than {}s", input));
    } else {
        app.overlay = Some(Overlay::ConfirmBatchKill { threshold, targets });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::{app_with, publish};
    use crate::data::OpId;

    fn press(app: &mut App, code: KeyCode) -> Option<Action> {
        handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_navigation_keys() {
        let (mut app, _aggregator) = app_with(3);
        assert_eq!(press(&mut app, KeyCode::Down), Some(Action::Navigate(Movement::Down(1))));
        assert_eq!(press(&mut app, KeyCode::PageUp), Some(Action::Navigate(Movement::Up(10))));
        assert_eq!(press(&mut app, KeyCode::End), Some(Action::Navigate(Movement::Last)));
        assert_eq!(press(&mut app, KeyCode::Char('q')), Some(Action::Quit));
    }

    #[test]
    fn test_kill_requires_confirmation() {
        let (mut app, _aggregator) = app_with(2);

        assert_eq!(press(&mut app, KeyCode::Char('k')), None);
        assert!(matches!(app.overlay, Some(Overlay::ConfirmKill(_))));

        let action = press(&mut app, KeyCode::Char('y'));
        match action {
            Some(Action::Kill(target)) => {
                assert_eq!(target.server, "db1");
                assert_eq!(target.op_id, OpId::Num(1));
            }
            other => panic!("expected kill, got {:?}", other),
        }
        assert!(app.overlay.is_none());
    }

    #[test]
    fn test_any_other_key_cancels_kill() {
        let (mut app, _aggregator) = app_with(2);
        press(&mut app, KeyCode::Char('k'));

        assert_eq!(press(&mut app, KeyCode::Char('k')), None);
        assert!(app.overlay.is_none());
        assert_eq!(app.get_status_message(), Some("Kill cancelled"));
    }

    #[test]
    fn test_confirmed_kill_targets_row_selected_at_keypress() {
        let (mut app, aggregator) = app_with(3);
        app.navigate(Movement::Last);
        press(&mut app, KeyCode::Char('k'));

        // A new snapshot reorders the table while the prompt is open
        publish(&aggregator, 2, 1);
        app.reload_data();

        match press(&mut app, KeyCode::Char('y')) {
            Some(Action::Kill(target)) => assert_eq!(target.op_id, OpId::Num(3)),
            other => panic!("expected kill, got {:?}", other),
        }
    }

    #[test]
    fn test_explain_and_kill_are_noops_without_selection() {
        let (mut app, _aggregator) = app_with(0);
        assert_eq!(press(&mut app, KeyCode::Char('e')), None);
        assert_eq!(press(&mut app, KeyCode::Char('k')), None);
        assert!(app.overlay.is_none());
    }

    #[test]
    fn test_explain_targets_selected_row() {
        let (mut app, _aggregator) = app_with(2);
        app.navigate(Movement::Down(1));
        match press(&mut app, KeyCode::Char('e')) {
            Some(Action::Explain(target)) => assert_eq!(target.op_id, OpId::Num(2)),
            other => panic!("expected explain, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_kill_flow() {
        // running times 100s, 99s, 98s, 97s
        let (mut app, _aggregator) = app_with(4);

        press(&mut app, KeyCode::Char('K'));
        for c in "98".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.overlay, Some(Overlay::ThresholdInput("98".into())));

        press(&mut app, KeyCode::Enter);
        let Some(Overlay::ConfirmBatchKill { threshold, targets }) = app.overlay.clone() else {
            panic!("expected batch confirmation, got {:?}", app.overlay);
        };
        assert_eq!(threshold, Duration::from_secs(98));
        let ids: Vec<_> = targets.iter().map(|t| t.op_id.clone()).collect();
        assert_eq!(ids, vec![OpId::Num(1), OpId::Num(2)]);

        match press(&mut app, KeyCode::Char('y')) {
            Some(Action::KillBatch { targets, .. }) => assert_eq!(targets.len(), 2),
            other => panic!("expected batch kill, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_kill_with_nothing_over_threshold() {
        let (mut app, _aggregator) = app_with(2);
        press(&mut app, KeyCode::Char('K'));
        for c in "500".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        assert!(app.overlay.is_none());
        assert_eq!(app.get_status_message(), Some("No operations running longer than 500s"));
    }

    #[test]
    fn test_threshold_too_large_for_a_duration() {
        let (mut app, _aggregator) = app_with(2);
        press(&mut app, KeyCode::Char('K'));
        for c in "100000000000000000000".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(press(&mut app, KeyCode::Enter), None);
        assert!(app.overlay.is_none());
        assert_eq!(
            app.get_status_message(),
            Some("Not a number of seconds: \"100000000000000000000\"")
        );
    }

    #[test]
    fn test_threshold_rejects_lone_dot() {
        let (mut app, _aggregator) = app_with(2);
        press(&mut app, KeyCode::Char('K'));
        press(&mut app, KeyCode::Char('.'));
        press(&mut app, KeyCode::Enter);
        assert!(app.overlay.is_none());
        assert_eq!(app.get_status_message(), Some("Not a number of seconds: \".\""));
    }

    #[test]
    fn test_help_closes_on_any_key() {
        let (mut app, _aggregator) = app_with(1);
        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.overlay, Some(Overlay::Help));
        assert_eq!(press(&mut app, KeyCode::Char('q')), None);
        assert!(app.overlay.is_none());
        assert!(app.running);
    }

    #[test]
    fn test_keys_ignored_while_working() {
        let (mut app, _aggregator) = app_with(1);
        app.overlay = Some(Overlay::Working("Killing".into()));
        assert_eq!(press(&mut app, KeyCode::Char('q')), None);
        assert_eq!(app.overlay, Some(Overlay::Working("Killing".into())));
    }
}

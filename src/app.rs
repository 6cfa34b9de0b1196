//! Dashboard state: the current snapshot, the selected row, and overlays.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::data::{Snapshot, SnapshotEntry};
use crate::dispatcher::OpTarget;
use crate::source::SnapshotSource;
use crate::ui::Theme;

/// How long a status message stays on screen.
const STATUS_TTL: Duration = Duration::from_secs(3);

/// Rows moved by PgUp/PgDn.
pub const PAGE: usize = 10;

/// A change to the selected row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Up(usize),
    Down(usize),
    First,
    Last,
}

/// A modal drawn on top of the table. At most one is open at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    Help,
    /// Result of an explain, scrollable.
    Explain { title: String, text: String, scroll: u16 },
    /// Waiting for `y` before killing one operation.
    ConfirmKill(OpTarget),
    /// Typing the seconds threshold for a batch kill.
    ThresholdInput(String),
    /// Waiting for `y` before killing everything over the threshold.
    ConfirmBatchKill { threshold: Duration, targets: Vec<OpTarget> },
    /// A server call is in flight.
    Working(String),
}

/// Main application state.
pub struct App {
    pub running: bool,
    source: SnapshotSource,
    pub snapshot: Arc<Snapshot>,
    /// Index into `snapshot.entries`; `None` only when the snapshot is empty.
    pub selected: Option<usize>,
    pub overlay: Option<Overlay>,
    pub theme: Theme,
    pub status_message: Option<(String, Instant)>,
}

impl App {
    pub fn new(source: SnapshotSource, theme: Theme) -> Self {
        Self {
            running: true,
            source,
            snapshot: Arc::new(Snapshot::default()),
            selected: None,
            overlay: None,
            theme,
            status_message: None,
        }
    }

    /// Returns a description of what is being monitored.
    pub fn source_description(&self) -> &str {
        self.source.description()
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    /// Get the current status message if it hasn't expired.
    pub fn get_status_message(&self) -> Option<&str> {
        match &self.status_message {
            Some((msg, time)) if time.elapsed() < STATUS_TTL => Some(msg),
            _ => None,
        }
    }

    /// Take the newest snapshot, if any, and re-clamp the selection.
    ///
    /// Returns true if a new snapshot was received.
    pub fn reload_data(&mut self) -> bool {
        match self.source.poll() {
            Some(snapshot) => {
                self.set_snapshot(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn set_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.snapshot = snapshot;
        self.selected = clamp(self.selected, self.snapshot.len());
    }

    pub fn navigate(&mut self, movement: Movement) {
        let len = self.snapshot.len();
        let Some(current) = self.selected else {
            return;
        };
        let last = len.saturating_sub(1);
        self.selected = Some(match movement {
            Movement::Up(n) => current.saturating_sub(n),
            Movement::Down(n) => current.saturating_add(n).min(last),
            Movement::First => 0,
            Movement::Last => last,
        });
    }

    pub fn selected_entry(&self) -> Option<&SnapshotEntry> {
        self.selected.and_then(|i| self.snapshot.get(i))
    }

    /// The selected operation, captured for an action.
    pub fn selected_target(&self) -> Option<OpTarget> {
        self.selected_entry().map(OpTarget::from_entry)
    }

    /// Every displayed operation running longer than `threshold`.
    pub fn targets_longer_than(&self, threshold: Duration) -> Vec<OpTarget> {
        self.snapshot.longer_than(threshold).map(OpTarget::from_entry).collect()
    }

    pub fn show_explain(&mut self, title: String, text: String) {
        self.overlay = Some(Overlay::Explain { title, text, scroll: 0 });
    }

    pub fn scroll_overlay(&mut self, up: bool, lines: u16) {
        if let Some(Overlay::Explain { text, scroll, .. }) = &mut self.overlay {
            let max = u16::try_from(text.lines().count().saturating_sub(1)).unwrap_or(u16::MAX);
            *scroll = if up {
                scroll.saturating_sub(lines)
            } else {
                scroll.saturating_add(lines).min(max)
            };
        }
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn toggle_help(&mut self) {
        self.overlay = match self.overlay {
            Some(Overlay::Help) => None,
            _ => Some(Overlay::Help),
        };
    }

    pub fn quit(&mut self) {
        self.running = false;
    }
}

/// Keep a selection inside `[0, len - 1]`, or `None` for an empty table.
///
/// An empty-to-populated transition selects the first row.
fn clamp(selected: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(selected.unwrap_or(0).min(len - 1))
    }
}

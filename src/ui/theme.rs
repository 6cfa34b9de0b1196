//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use std::time::Duration;

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

use crate::data::Reachability;

/// Running time from which a row is drawn as a warning.
const SLOW: Duration = Duration::from_secs(10);
/// Running time from which a row is drawn as critical.
const VERY_SLOW: Duration = Duration::from_secs(60);

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and active elements.
    pub highlight: Color,
    /// Slow operations.
    pub warning: Color,
    /// Very slow operations and unreachable servers.
    pub critical: Color,
    /// Reachable servers.
    pub healthy: Color,
    /// Color for borders and separators.
    pub border: Color,
    /// Style for header rows in tables.
    pub header: Style,
    /// Style for selected/highlighted rows.
    pub selected: Style,
    /// Border style (rounded, plain, etc.).
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            warning: Color::Yellow,
            critical: Color::Red,
            healthy: Color::Green,
            border: Color::Gray,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            warning: Color::Yellow,
            critical: Color::Red,
            healthy: Color::Green,
            border: Color::DarkGray,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::LightBlue).add_modifier(Modifier::BOLD),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Get style for a server's reachability
    pub fn reachability_style(&self, reachability: Reachability) -> Style {
        match reachability {
            Reachability::Pending => Style::default().add_modifier(Modifier::DIM),
            Reachability::Connected => Style::default().fg(self.healthy),
            Reachability::Unreachable => {
                Style::default().fg(self.critical).add_modifier(Modifier::BOLD)
            }
        }
    }

    /// Get style for an operation's running time
    pub fn running_style(&self, running: Option<Duration>) -> Style {
        match running {
            Some(d) if d >= VERY_SLOW => Style::default().fg(self.critical).add_modifier(Modifier::BOLD),
            Some(d) if d >= SLOW => Style::default().fg(self.warning),
            _ => Style::default(),
        }
    }
}

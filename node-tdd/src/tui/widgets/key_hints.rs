//! One-line key binding hints at the bottom of the dashboard.
//!
//! Hints are dropped from the end until the line fits, so narrow terminals
//! still show the most important bindings.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};

use crate::tui::app::Theme;

/// Height of the hints line in rows.
pub const KEY_HINTS_HEIGHT: u16 = 1;

/// Hints in priority order.
const HINTS: &[(&str, &str)] = &[
    ("q", "quit"),
    ("r", "run"),
    ("s", "stop"),
    ("o", "output"),
    ("a/d", "on/off"),
    ("p", "package.json"),
    ("R", "reload"),
    ("↑↓", "scroll"),
];

const DIALOG_HINTS: &[(&str, &str)] = &[("Enter", "accept"), ("Esc", "dismiss"), ("q", "quit")];

const GAP: &str = "  ";

/// Renders the key hints for the current mode.
#[derive(Debug)]
pub struct KeyHintsWidget<'a> {
    dialog_open: bool,
    theme: &'a Theme,
}

impl<'a> KeyHintsWidget<'a> {
    #[must_use]
    pub fn new(dialog_open: bool, theme: &'a Theme) -> Self {
        Self { dialog_open, theme }
    }

    fn hints_line(&self, width: usize) -> Line<'a> {
        let hints = if self.dialog_open { DIALOG_HINTS } else { HINTS };

        let mut spans = Vec::new();
        let mut used = 0;
        for (key, description) in hints {
            let gap = if spans.is_empty() { "" } else { GAP };
            let hint_width = gap.chars().count() + key.chars().count() + 1 + description.len();
            if used + hint_width > width {
                break;
            }
            used += hint_width;

            spans.push(Span::raw(gap));
            spans.push(Span::styled(*key, self.theme.key));
            spans.push(Span::raw(" "));
            spans.push(Span::styled(*description, self.theme.key_description));
        }
        Line::from(spans)
    }
}

impl Widget for KeyHintsWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let line = self.hints_line(area.width.saturating_sub(1) as usize);
        Paragraph::new(line).render(Rect::new(area.x + 1, area.y, area.width.saturating_sub(1), 1), buf);
    }
}

//! Modal dialog for build notifications and error prompts.
//!
//! ```text
//! ┌ Node TDD ──────────────────────────────────┐
//! │ The build failed                           │
//! │                                            │
//! │ [Enter] Show output   [Esc] Dismiss  (+1)  │
//! └────────────────────────────────────────────┘
//! ```

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap},
};

use crate::presenter::MESSAGE_PREFIX;
use crate::tui::app::{Dialog, Theme};

/// Maximum dialog width in columns.
pub const DIALOG_MAX_WIDTH: u16 = 64;

/// Dialog height: borders, up to three message rows, a blank row and the
/// action row.
pub const DIALOG_HEIGHT: u16 = 7;

/// The area a dialog occupies, centered in `area`.
#[must_use]
pub fn dialog_area(area: Rect) -> Rect {
    let width = area.width.min(DIALOG_MAX_WIDTH);
    let height = area.height.min(DIALOG_HEIGHT);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// Renders the front dialog of the queue.
#[derive(Debug)]
pub struct DialogWidget<'a> {
    dialog: &'a Dialog,
    /// Dialogs waiting behind this one.
    pending: usize,
    theme: &'a Theme,
}

impl<'a> DialogWidget<'a> {
    #[must_use]
    pub fn new(dialog: &'a Dialog, pending: usize, theme: &'a Theme) -> Self {
        Self {
            dialog,
            pending,
            theme,
        }
    }

    /// The message without the prefix; the prefix is the dialog title.
    fn message(&self) -> &'a str {
        self.dialog
            .message
            .strip_prefix(MESSAGE_PREFIX)
            .map_or(self.dialog.message.as_str(), str::trim_start)
    }

    fn actions_line(&self) -> Line<'a> {
        let mut spans = Vec::new();
        if let Some(action) = self.dialog.action {
            spans.push(Span::styled("[Enter]", self.theme.key));
            spans.push(Span::raw(" "));
            spans.push(Span::styled(action.label(), self.theme.dialog_action));
            spans.push(Span::raw("   "));
        }
        spans.push(Span::styled("[Esc]", self.theme.key));
        spans.push(Span::styled(" Dismiss", self.theme.key_description));
        if self.pending > 0 {
            spans.push(Span::styled(
                format!("  (+{})", self.pending),
                self.theme.text_muted,
            ));
        }
        Line::from(spans)
    }
}

impl Widget for DialogWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let area = dialog_area(area);
        Clear.render(area, buf);

        let level_style = self.theme.dialog(self.dialog.level);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(level_style)
            .title(format!(" {} ", MESSAGE_PREFIX.trim_end_matches(':')))
            .title_style(level_style);

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        // The action row is pinned to the bottom; the message wraps above it
        let message_height = inner.height.saturating_sub(2).max(1);
        let message_area = Rect::new(inner.x, inner.y, inner.width, message_height);
        Paragraph::new(self.message())
            .style(self.theme.text_primary)
            .wrap(Wrap { trim: true })
            .render(message_area, buf);

        if inner.height > message_height {
            let actions_area = Rect::new(inner.x, inner.y + inner.height - 1, inner.width, 1);
            Paragraph::new(self.actions_line()).render(actions_area, buf);
        }
    }
}

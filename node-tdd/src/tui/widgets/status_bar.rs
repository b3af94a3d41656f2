//! Status bar widget: the extension item, the build item and coverage.
//!
//! ```text
//! ┌ Node TDD ─────────────────────────────── /work/app ┐
//! │ ● TDD │ ✗ Failing 3/4 │ ◔ 84%                      │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! In minimal mode the build item has no text, so only its icon is drawn.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};

use crate::presenter::{CoverageDisplay, StatusIcon, StatusItem};
use crate::tui::app::{DashboardState, Symbols, Theme};

/// Height of the status bar in rows: borders plus one content line.
pub const STATUS_BAR_HEIGHT: u16 = 3;

const TITLE: &str = " Node TDD ";

/// Renders the status items of a [`DashboardState`].
#[derive(Debug)]
pub struct StatusBarWidget<'a> {
    state: &'a DashboardState,
    theme: &'a Theme,
    symbols: &'a Symbols,
}

impl<'a> StatusBarWidget<'a> {
    #[must_use]
    pub fn new(state: &'a DashboardState, theme: &'a Theme, symbols: &'a Symbols) -> Self {
        Self {
            state,
            theme,
            symbols,
        }
    }

    fn item_spans(&self, item: &StatusItem) -> Vec<Span<'a>> {
        let style = self.theme.status(item.color);
        let mut spans = vec![Span::styled(self.symbols.icon(item.icon), style)];
        if !item.text.is_empty() {
            spans.push(Span::raw(" "));
            spans.push(Span::styled(item.text.clone(), style));
        }
        spans
    }

    fn coverage_spans(&self, coverage: &CoverageDisplay) -> Vec<Span<'a>> {
        let style = self.theme.status(coverage.color);
        vec![
            Span::styled(self.symbols.icon(StatusIcon::Coverage), style),
            Span::raw(" "),
            Span::styled(coverage.text(), style),
        ]
    }

    /// The content line, items joined by the separator symbol.
    fn status_line(&self) -> Line<'a> {
        let mut groups = vec![self.item_spans(&self.state.extension)];
        if let Some(status) = &self.state.status {
            groups.push(self.item_spans(status));
        }
        if let Some(coverage) = &self.state.coverage {
            groups.push(self.coverage_spans(coverage));
        }

        let separator = format!(" {} ", self.symbols.separator);
        let mut spans = Vec::new();
        for (i, group) in groups.into_iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(separator.clone(), self.theme.border));
            }
            spans.extend(group);
        }
        Line::from(spans)
    }
}

impl Widget for StatusBarWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let mut block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.border)
            .title(TITLE)
            .title_style(self.theme.title);

        // Only show the root when it fits next to the title
        let root = format!(" {} ", self.state.root_label);
        if (root.chars().count() + TITLE.len() + 4) <= area.width as usize {
            block = block.title(
                Line::styled(root, self.theme.text_secondary).right_aligned(),
            );
        }

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        Paragraph::new(self.status_line()).render(inner, buf);
    }
}

//! Scrollable panel with the output of the last run.
//!
//! The panel follows new output while the scroll offset is 0; scrolling up
//! freezes the view and marks the title with the scrolled symbol.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::Line,
    widgets::{Block, Borders, Widget},
};

use crate::tui::app::{OutputBuffer, Symbols, Theme};

/// Renders an [`OutputBuffer`] bottom-up with a scroll offset.
#[derive(Debug)]
pub struct OutputPanelWidget<'a> {
    buffer: &'a OutputBuffer,
    scroll_offset: usize,
    /// Formatted start time of the run, shown in the title.
    started: Option<String>,
    theme: &'a Theme,
    symbols: &'a Symbols,
}

impl<'a> OutputPanelWidget<'a> {
    #[must_use]
    pub fn new(
        buffer: &'a OutputBuffer,
        scroll_offset: usize,
        theme: &'a Theme,
        symbols: &'a Symbols,
    ) -> Self {
        Self {
            buffer,
            scroll_offset,
            started: None,
            theme,
            symbols,
        }
    }

    /// Adds the run start time to the title.
    #[must_use]
    pub fn started(mut self, started: impl Into<String>) -> Self {
        self.started = Some(started.into());
        self
    }

    fn title(&self) -> String {
        let mut title = String::from(" Output ");
        if let Some(started) = &self.started {
            title.push_str(&format!("· {started} "));
        }
        if self.scroll_offset > 0 {
            title.push_str(&format!("{} {} ", self.symbols.scrolled, self.scroll_offset));
        }
        title
    }

    /// Indices of the lines that fit into `height` rows.
    fn visible_range(&self, height: usize) -> std::ops::Range<usize> {
        let total = self.buffer.len();
        let end = total.saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        start..end
    }
}

impl Widget for OutputPanelWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width == 0 || area.height == 0 {
            return;
        }

        let border_style = if self.scroll_offset > 0 {
            self.theme.border_focused
        } else {
            self.theme.border
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(self.title())
            .title_style(self.theme.title);

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        if self.buffer.is_empty() {
            let message = "No output yet";
            let x = inner.x + inner.width.saturating_sub(message.len() as u16) / 2;
            let y = inner.y + inner.height / 2;
            buf.set_stringn(x, y, message, inner.width as usize, self.theme.text_muted);
            return;
        }

        let range = self.visible_range(inner.height as usize);
        for (row, line) in self.buffer.iter().skip(range.start).take(range.len()).enumerate() {
            let y = inner.y + row as u16;
            buf.set_line(
                inner.x,
                y,
                &Line::styled(line, self.theme.text_primary),
                inner.width,
            );
        }
    }
}

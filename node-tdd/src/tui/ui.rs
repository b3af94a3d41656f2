//! Frame layout for the dashboard.
//!
//! ```text
//! +--------------------------------+
//! | status bar                     |
//! +--------------------------------+
//! | output panel (or placeholder)  |
//! |          [ dialog ]            |
//! +--------------------------------+
//! | key hints                      |
//! +--------------------------------+
//! ```

use ratatui::{
    layout::{Alignment, Constraint, Layout},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::tui::app::{DashboardState, Symbols, Theme};
use crate::tui::widgets::{
    DialogWidget, KeyHintsWidget, OutputPanelWidget, StatusBarWidget, KEY_HINTS_HEIGHT,
    STATUS_BAR_HEIGHT,
};

const OUTPUT_HIDDEN_MESSAGE: &str = "Output hidden. Press o to show it.";

/// Renders the whole dashboard.
pub fn render(frame: &mut Frame, state: &DashboardState, theme: &Theme, symbols: &Symbols) {
    let [status_area, body_area, hints_area] = Layout::vertical([
        Constraint::Length(STATUS_BAR_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(KEY_HINTS_HEIGHT),
    ])
    .areas(frame.area());

    frame.render_widget(StatusBarWidget::new(state, theme, symbols), status_area);

    if state.output_visible {
        let mut panel = OutputPanelWidget::new(&state.output, state.scroll_offset, theme, symbols);
        if let Some(started) = state.output_started {
            panel = panel.started(started.format("%H:%M:%S").to_string());
        }
        frame.render_widget(panel, body_area);
    } else {
        let placeholder = Paragraph::new(OUTPUT_HIDDEN_MESSAGE)
            .alignment(Alignment::Center)
            .style(theme.text_muted)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.border),
            );
        frame.render_widget(placeholder, body_area);
    }

    let dialog = state.current_dialog();
    frame.render_widget(KeyHintsWidget::new(dialog.is_some(), theme), hints_area);

    if let Some(dialog) = dialog {
        let pending = state.dialogs.len().saturating_sub(1);
        frame.render_widget(DialogWidget::new(dialog, pending, theme), body_area);
    }
}

//! Widgets that make up the dashboard.
//!
//! - [`status_bar`]: extension, build and coverage items
//! - [`output_panel`]: scrollable output of the last run
//! - [`dialog`]: modal notifications and error prompts
//! - [`key_hints`]: key binding hints
//!
//! Widgets are stateless; they borrow from [`crate::tui::app::DashboardState`]
//! and the theme for one frame.

pub mod dialog;
pub mod key_hints;
pub mod output_panel;
pub mod status_bar;

pub use dialog::{dialog_area, DialogWidget, DIALOG_HEIGHT, DIALOG_MAX_WIDTH};
pub use key_hints::{KeyHintsWidget, KEY_HINTS_HEIGHT};
pub use output_panel::OutputPanelWidget;
pub use status_bar::{StatusBarWidget, STATUS_BAR_HEIGHT};

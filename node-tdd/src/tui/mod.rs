//! Terminal dashboard for Node TDD.
//!
//! - [`app`]: dashboard state (the TUI's [`crate::presenter::StatusPresenter`]),
//!   theme, symbols, key bindings and the terminal event loop
//! - [`ui`]: frame layout
//! - [`terminal`]: raw mode and alternate screen handling with panic restore
//! - [`widgets`]: the individual dashboard components

pub mod app;
pub mod terminal;
pub mod ui;
pub mod widgets;

pub use app::{
    apply_key_action, map_key, DashboardState, EventHandler, KeyAction, Symbols, Theme, TuiEvent,
};
pub use terminal::{install_panic_hook, Tui};

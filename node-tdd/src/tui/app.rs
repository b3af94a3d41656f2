//! Dashboard state, styling and terminal event handling for the Node TDD TUI.
//!
//! The main types are:
//!
//! - [`DashboardState`]: everything the dashboard shows. It implements
//!   [`StatusPresenter`], so the build trigger writes into it directly.
//! - [`Theme`] and [`Symbols`]: styles and icons, with `NO_COLOR` and ASCII
//!   fallbacks.
//! - [`TuiEvent`] and [`EventHandler`]: an async loop forwarding key presses,
//!   resizes and ticks over an MPSC channel.
//! - [`KeyAction`] and [`map_key`]: the key bindings.
//!
//! # Example
//!
//! ```ignore
//! use tokio::sync::{mpsc, oneshot};
//! use node_tdd::tui::app::EventHandler;
//!
//! let (event_tx, mut event_rx) = mpsc::channel(100);
//! let (shutdown_tx, shutdown_rx) = oneshot::channel();
//!
//! tokio::spawn(EventHandler::new(event_tx, shutdown_rx).run());
//!
//! while let Some(event) = event_rx.recv().await {
//!     // Handle the event...
//! }
//! ```

use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Local};
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::style::{Color, Modifier, Style};
use regex::Regex;
use tokio::sync::{mpsc, oneshot};

use crate::controller::Command;
use crate::presenter::{
    CoverageDisplay, ErrorPrompt, Notification, NotificationLevel, PromptAction, StatusColor,
    StatusIcon, StatusItem, StatusPresenter,
};

/// Maximum number of output lines kept for the output panel.
pub const MAX_OUTPUT_LINES: usize = 10_000;

/// Lines moved by one PgUp/PgDn press.
pub const PAGE_SCROLL_LINES: usize = 10;

// =============================================================================
// Output buffer
// =============================================================================

fn ansi_escape_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ANSI escape pattern is valid")
    })
}

/// Bounded line buffer behind the output panel.
///
/// Process output arrives in chunks that may or may not end on a line
/// boundary; an unterminated last line is extended by the next chunk. ANSI
/// escape sequences are stripped since the panel applies its own styles.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    /// Whether the last line is still waiting for its newline.
    open_line: bool,
    capacity: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(MAX_OUTPUT_LINES)
    }
}

impl OutputBuffer {
    /// Creates an empty buffer keeping at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            open_line: false,
            capacity: capacity.max(1),
        }
    }

    /// Appends a chunk of output.
    pub fn push(&mut self, text: &str) {
        let text = ansi_escape_pattern().replace_all(text, "");

        for piece in text.split_inclusive('\n') {
            let terminated = piece.ends_with('\n');
            let content = piece.trim_end_matches(['\n', '\r']);

            match self.lines.back_mut() {
                Some(last) if self.open_line => last.push_str(content),
                _ => self.lines.push_back(content.to_string()),
            }
            self.open_line = !terminated;
        }

        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.open_line = false;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Iterates lines oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

// =============================================================================
// Dialogs
// =============================================================================

/// A queued dialog: either an outcome notification or an error prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<PromptAction>,
}

impl From<Notification> for Dialog {
    fn from(notification: Notification) -> Self {
        Self {
            level: notification.level,
            message: notification.message,
            action: notification.action,
        }
    }
}

impl From<ErrorPrompt> for Dialog {
    fn from(prompt: ErrorPrompt) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: prompt.message,
            action: prompt.action,
        }
    }
}

// =============================================================================
// Dashboard state
// =============================================================================

/// Everything the dashboard renders.
///
/// The controller owns this value as its presenter; the render loop borrows
/// it through [`crate::controller::Controller::presenter`].
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// Workspace root shown in the status bar title.
    pub root_label: String,

    /// The extension on/off item.
    pub extension: StatusItem,

    /// The build status item; `None` while hidden.
    pub status: Option<StatusItem>,

    pub coverage: Option<CoverageDisplay>,

    pub output: OutputBuffer,

    pub output_visible: bool,

    /// Lines scrolled up from the bottom of the output. 0 follows new output.
    pub scroll_offset: usize,

    /// When the current output started, i.e. the last run's start time.
    pub output_started: Option<DateTime<Local>>,

    /// Pending dialogs; the front one is displayed.
    pub dialogs: VecDeque<Dialog>,
}

impl DashboardState {
    #[must_use]
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            root_label: root_label.into(),
            extension: StatusItem::extension(false),
            status: None,
            coverage: None,
            output: OutputBuffer::default(),
            output_visible: false,
            scroll_offset: 0,
            output_started: None,
            dialogs: VecDeque::new(),
        }
    }

    /// The dialog currently displayed.
    #[must_use]
    pub fn current_dialog(&self) -> Option<&Dialog> {
        self.dialogs.front()
    }

    /// Closes the current dialog without acting on it.
    pub fn dismiss_dialog(&mut self) -> Option<Dialog> {
        self.dialogs.pop_front()
    }

    /// Closes the current dialog and returns its action, if it had one.
    pub fn accept_dialog(&mut self) -> Option<PromptAction> {
        self.dialogs.pop_front().and_then(|dialog| dialog.action)
    }

    pub fn scroll_up(&mut self, lines: usize) {
        let max = self.output.len().saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + lines).min(max);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = self.output.len().saturating_sub(1);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    fn push_dialog(&mut self, dialog: Dialog) {
        // The same message twice in a row adds nothing
        if self.dialogs.back() != Some(&dialog) {
            self.dialogs.push_back(dialog);
        }
    }
}

impl StatusPresenter for DashboardState {
    fn set_status(&mut self, item: StatusItem) {
        self.status = Some(item);
    }

    fn hide_status(&mut self) {
        self.status = None;
    }

    fn set_extension_status(&mut self, enabled: bool) {
        self.extension = StatusItem::extension(enabled);
    }

    fn append_output(&mut self, text: &str) {
        let before = self.output.len();
        self.output.push(text);

        // Keep a scrolled-up view anchored on the same lines
        if self.scroll_offset > 0 {
            let added = self.output.len().saturating_sub(before);
            self.scroll_up(added);
        }
    }

    fn clear_output(&mut self) {
        self.output.clear();
        self.scroll_offset = 0;
        self.output_started = Some(Local::now());
    }

    fn set_output_visible(&mut self, visible: bool) {
        self.output_visible = visible;
    }

    fn set_coverage(&mut self, coverage: CoverageDisplay) {
        self.coverage = Some(coverage);
    }

    fn clear_coverage(&mut self) {
        self.coverage = None;
    }

    fn notify(&mut self, notification: Notification) {
        self.push_dialog(notification.into());
    }

    fn prompt(&mut self, prompt: ErrorPrompt) {
        self.push_dialog(prompt.into());
    }
}

// =============================================================================
// Theme and symbols
// =============================================================================

/// Parses a `#rrggbb` color.
fn hex_color(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(digits.get(range)?, 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Theme configuration for the TUI.
///
/// Status colors come from [`StatusColor`]; passing and failing use the fixed
/// hex values of the status items, everything else is a terminal color so the
/// dashboard follows the user's palette.
///
/// For environments where colors should be disabled (per the `NO_COLOR`
/// standard), use [`Theme::monochrome()`] or [`Theme::from_env()`].
#[derive(Debug, Clone)]
pub struct Theme {
    // Status items
    /// Style for passing builds and coverage at or above the threshold.
    pub status_passing: Style,
    /// Style for failing builds and coverage below the threshold.
    pub status_failing: Style,
    /// Style for dimmed items (inactive extension, minimal-mode blink).
    pub status_muted: Style,

    // Dialogs
    pub dialog_info: Style,
    pub dialog_warning: Style,
    pub dialog_error: Style,
    /// Style for the dialog action button.
    pub dialog_action: Style,

    // Key hints
    pub key: Style,
    pub key_description: Style,

    // Layout
    pub border: Style,
    pub border_focused: Style,
    pub title: Style,
    pub text_primary: Style,
    pub text_secondary: Style,
    pub text_muted: Style,
}

impl Default for Theme {
    fn default() -> Self {
        let passing = hex_color(crate::presenter::PASSING_COLOUR).unwrap_or(Color::Green);
        let failing = hex_color(crate::presenter::FAILING_COLOUR).unwrap_or(Color::Red);

        Self {
            status_passing: Style::default().fg(passing),
            status_failing: Style::default().fg(failing),
            status_muted: Style::default().fg(Color::DarkGray),

            dialog_info: Style::default().fg(Color::Cyan),
            dialog_warning: Style::default().fg(Color::Yellow),
            dialog_error: Style::default().fg(failing).add_modifier(Modifier::BOLD),
            dialog_action: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),

            key: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            key_description: Style::default().fg(Color::Gray),

            border: Style::default().fg(Color::DarkGray),
            border_focused: Style::default().fg(Color::Cyan),
            title: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
            text_primary: Style::default(),
            text_secondary: Style::default().fg(Color::Gray),
            text_muted: Style::default().fg(Color::DarkGray),
        }
    }
}

impl Theme {
    /// Creates a monochrome theme for `NO_COLOR` support.
    ///
    /// Uses only modifiers (bold, dim, underlined) without any color codes.
    #[must_use]
    pub fn monochrome() -> Self {
        Self {
            status_passing: Style::default().add_modifier(Modifier::BOLD),
            status_failing: Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            status_muted: Style::default().add_modifier(Modifier::DIM),

            dialog_info: Style::default(),
            dialog_warning: Style::default().add_modifier(Modifier::BOLD),
            dialog_error: Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            dialog_action: Style::default().add_modifier(Modifier::REVERSED),

            key: Style::default().add_modifier(Modifier::BOLD),
            key_description: Style::default().add_modifier(Modifier::DIM),

            border: Style::default(),
            border_focused: Style::default().add_modifier(Modifier::BOLD),
            title: Style::default().add_modifier(Modifier::BOLD),
            text_primary: Style::default(),
            text_secondary: Style::default().add_modifier(Modifier::DIM),
            text_muted: Style::default().add_modifier(Modifier::DIM),
        }
    }

    /// Returns [`Theme::monochrome()`] if `NO_COLOR` is set (to any value),
    /// [`Theme::default()`] otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        if std::env::var("NO_COLOR").is_ok() {
            Self::monochrome()
        } else {
            Self::default()
        }
    }

    /// Maps a semantic status color onto this theme.
    #[must_use]
    pub fn status(&self, color: StatusColor) -> Style {
        match color {
            StatusColor::Default => self.text_primary,
            StatusColor::Passing => self.status_passing,
            StatusColor::Failing => self.status_failing,
            StatusColor::Muted => self.status_muted,
        }
    }

    #[must_use]
    pub fn dialog(&self, level: NotificationLevel) -> Style {
        match level {
            NotificationLevel::Info => self.dialog_info,
            NotificationLevel::Warning => self.dialog_warning,
            NotificationLevel::Error => self.dialog_error,
        }
    }
}

/// Symbol set for the TUI (unicode or ASCII).
///
/// Use [`Symbols::detect()`] to select the set from the terminal
/// environment.
#[derive(Debug, Clone, Copy)]
pub struct Symbols {
    /// TDD mode active.
    pub active: &'static str,
    /// TDD mode inactive.
    pub inactive: &'static str,
    pub building: &'static str,
    pub passing: &'static str,
    pub failing: &'static str,
    pub stopped: &'static str,
    pub coverage: &'static str,
    /// Shown in the output title while scrolled up.
    pub scrolled: &'static str,
    /// Separator between status bar items.
    pub separator: &'static str,
}

/// Unicode symbol set for modern terminals.
pub const UNICODE_SYMBOLS: Symbols = Symbols {
    active: "●",
    inactive: "○",
    building: "◐",
    passing: "✓",
    failing: "✗",
    stopped: "■",
    coverage: "◔",
    scrolled: "↑",
    separator: "│",
};

/// ASCII symbol set for maximum compatibility.
pub const ASCII_SYMBOLS: Symbols = Symbols {
    active: "[*]",
    inactive: "[ ]",
    building: "[~]",
    passing: "[+]",
    failing: "[x]",
    stopped: "[-]",
    coverage: "[%]",
    scrolled: "^",
    separator: "|",
};

impl Symbols {
    /// Returns [`ASCII_SYMBOLS`] when `TERM` names a limited terminal (`linux`
    /// console, `vt100`), [`UNICODE_SYMBOLS`] otherwise.
    #[must_use]
    pub fn detect() -> Self {
        if std::env::var("TERM")
            .map(|t| t.contains("linux") || t.contains("vt100"))
            .unwrap_or(false)
        {
            ASCII_SYMBOLS
        } else {
            UNICODE_SYMBOLS
        }
    }

    /// The symbol for a status icon.
    #[must_use]
    pub fn icon(&self, icon: StatusIcon) -> &'static str {
        match icon {
            StatusIcon::Active => self.active,
            StatusIcon::Inactive => self.inactive,
            StatusIcon::Building => self.building,
            StatusIcon::Passing => self.passing,
            StatusIcon::Failing => self.failing,
            StatusIcon::Stopped => self.stopped,
            StatusIcon::Coverage => self.coverage,
        }
    }
}

impl Default for Symbols {
    fn default() -> Self {
        Self::detect()
    }
}

// =============================================================================
// Key bindings
// =============================================================================

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Forwarded to the controller.
    Command(Command),
    AcceptDialog,
    DismissDialog,
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollTop,
    ScrollBottom,
}

/// Maps a key press to an action.
///
/// `Enter` and `Esc` only mean something while a dialog is open. Releases
/// and repeats reported by some terminals are ignored.
#[must_use]
pub fn map_key(key: KeyEvent, dialog_open: bool) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(KeyAction::Command(Command::Quit)),
            _ => None,
        };
    }

    let action = match key.code {
        KeyCode::Enter if dialog_open => KeyAction::AcceptDialog,
        KeyCode::Esc if dialog_open => KeyAction::DismissDialog,
        KeyCode::Char('q') => KeyAction::Command(Command::Quit),
        KeyCode::Char('r') => KeyAction::Command(Command::RunNow),
        KeyCode::Char('s') => KeyAction::Command(Command::StopBuild),
        KeyCode::Char('o') => KeyAction::Command(Command::ToggleOutput),
        KeyCode::Char('a') => KeyAction::Command(Command::Activate),
        KeyCode::Char('d') => KeyAction::Command(Command::Deactivate),
        KeyCode::Char('p') => KeyAction::Command(Command::OpenManifest),
        KeyCode::Char('R') => KeyAction::Command(Command::ReloadConfig),
        KeyCode::Up | KeyCode::Char('k') => KeyAction::ScrollUp(1),
        KeyCode::Down | KeyCode::Char('j') => KeyAction::ScrollDown(1),
        KeyCode::PageUp => KeyAction::ScrollUp(PAGE_SCROLL_LINES),
        KeyCode::PageDown => KeyAction::ScrollDown(PAGE_SCROLL_LINES),
        KeyCode::Home => KeyAction::ScrollTop,
        KeyCode::End => KeyAction::ScrollBottom,
        _ => return None,
    };
    Some(action)
}

/// Applies a scroll or dialog action to the dashboard.
///
/// Returns the dialog action to run when a dialog was accepted. Commands are
/// not handled here; they go to the controller.
pub fn apply_key_action(state: &mut DashboardState, action: KeyAction) -> Option<PromptAction> {
    match action {
        KeyAction::AcceptDialog => return state.accept_dialog(),
        KeyAction::DismissDialog => {
            state.dismiss_dialog();
        }
        KeyAction::ScrollUp(lines) => state.scroll_up(lines),
        KeyAction::ScrollDown(lines) => state.scroll_down(lines),
        KeyAction::ScrollTop => state.scroll_to_top(),
        KeyAction::ScrollBottom => state.scroll_to_bottom(),
        KeyAction::Command(_) => {}
    }
    None
}

// =============================================================================
// Terminal events
// =============================================================================

/// Events produced by the [`EventHandler`].
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Periodic tick; the main loop redraws on it.
    Tick,

    /// A key press from the terminal.
    Key(KeyEvent),

    /// The terminal was resized to (columns, rows).
    Resize(u16, u16),
}

/// Default tick rate for the event handler (60ms = ~16 FPS).
pub const DEFAULT_TICK_RATE_MS: u64 = 60;

/// Poll timeout for checking terminal input.
const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;

/// Polls terminal input and generates periodic ticks.
///
/// The handler uses `tokio::select!` over a tick interval, a blocking
/// crossterm poll moved onto `spawn_blocking`, and a oneshot shutdown
/// signal that is always checked first. Events go to the main loop over an
/// MPSC channel; the loop ends when the receiver is dropped.
#[derive(Debug)]
pub struct EventHandler {
    event_tx: mpsc::Sender<TuiEvent>,
    shutdown_rx: oneshot::Receiver<()>,
    tick_rate: Duration,
}

impl EventHandler {
    /// Creates a handler with the default tick rate.
    pub fn new(event_tx: mpsc::Sender<TuiEvent>, shutdown_rx: oneshot::Receiver<()>) -> Self {
        Self::with_tick_rate(
            event_tx,
            shutdown_rx,
            Duration::from_millis(DEFAULT_TICK_RATE_MS),
        )
    }

    /// Creates a handler with a custom tick rate.
    pub fn with_tick_rate(
        event_tx: mpsc::Sender<TuiEvent>,
        shutdown_rx: oneshot::Receiver<()>,
        tick_rate: Duration,
    ) -> Self {
        Self {
            event_tx,
            shutdown_rx,
            tick_rate,
        }
    }

    pub fn tick_rate(&self) -> Duration {
        self.tick_rate
    }

    /// Runs until a shutdown signal arrives or the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the blocking poll task panicked.
    pub async fn run(mut self) -> std::io::Result<()> {
        let mut tick_interval = tokio::time::interval(self.tick_rate);
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // interval ticks immediately on creation
        tick_interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    tracing::debug!("EventHandler received shutdown signal");
                    break;
                }

                _ = tick_interval.tick() => {
                    if self.event_tx.send(TuiEvent::Tick).await.is_err() {
                        tracing::debug!("Event receiver dropped, exiting event loop");
                        break;
                    }
                }

                result = async {
                    tokio::time::sleep(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS)).await;
                    tokio::task::spawn_blocking(|| {
                        Self::poll_terminal_event(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
                    }).await
                } => {
                    match result {
                        Ok(Some(event)) => {
                            if self.event_tx.send(event).await.is_err() {
                                tracing::debug!("Event receiver dropped, exiting event loop");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(join_error) => {
                            tracing::error!("spawn_blocking task panicked: {}", join_error);
                            return Err(std::io::Error::other("Terminal polling task panicked"));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Polls for one terminal event. Runs on a blocking thread.
    ///
    /// Poll errors (no terminal, e.g. in CI) count as "no event".
    fn poll_terminal_event(timeout: Duration) -> Option<TuiEvent> {
        match event::poll(timeout) {
            Ok(true) => match event::read() {
                Ok(crossterm_event) => Self::convert_crossterm_event(crossterm_event),
                Err(e) => {
                    tracing::trace!("Failed to read terminal event: {}", e);
                    None
                }
            },
            Ok(false) => None,
            Err(e) => {
                tracing::trace!("Failed to poll terminal: {}", e);
                None
            }
        }
    }

    fn convert_crossterm_event(event: CrosstermEvent) -> Option<TuiEvent> {
        match event {
            CrosstermEvent::Key(key_event) => Some(TuiEvent::Key(key_event)),
            CrosstermEvent::Resize(cols, rows) => Some(TuiEvent::Resize(cols, rows)),
            CrosstermEvent::Mouse(_) => None,
            CrosstermEvent::FocusGained | CrosstermEvent::FocusLost => None,
            CrosstermEvent::Paste(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageValue;
    use crate::report::ReportStats;
    use serial_test::serial;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    // =========================================================================
    // OutputBuffer
    // =========================================================================

    #[test]
    fn output_buffer_joins_partial_lines() {
        let mut buffer = OutputBuffer::default();
        buffer.push("ok 1 - ");
        buffer.push("adds\nok 2");
        buffer.push(" - subtracts\r\n");
        buffer.push("done\n");

        let lines: Vec<_> = buffer.iter().collect();
        assert_eq!(lines, ["ok 1 - adds", "ok 2 - subtracts", "done"]);
    }

    #[test]
    fn output_buffer_strips_ansi_colors() {
        let mut buffer = OutputBuffer::default();
        buffer.push("\x1b[32m✓ passes\x1b[0m\n");
        assert_eq!(buffer.iter().next(), Some("✓ passes"));
    }

    #[test]
    fn output_buffer_drops_oldest_lines_over_capacity() {
        let mut buffer = OutputBuffer::new(2);
        buffer.push("a\nb\nc\n");
        let lines: Vec<_> = buffer.iter().collect();
        assert_eq!(lines, ["b", "c"]);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    // =========================================================================
    // DashboardState
    // =========================================================================

    #[test]
    fn dashboard_tracks_presenter_calls() {
        let mut state = DashboardState::new("/work/app");
        assert_eq!(state.extension.icon, StatusIcon::Inactive);

        state.set_extension_status(true);
        state.clear_output();
        state.set_status(StatusItem::building(1, false, false));
        state.append_output("1..1\nok 1\n");
        state.set_status(StatusItem::passing(Some(ReportStats { pass: 1, count: 1 }), false));
        state.set_coverage(CoverageDisplay::new(CoverageValue::new(91.0), Some(80.0)));

        assert_eq!(state.extension.icon, StatusIcon::Active);
        assert_eq!(state.status.as_ref().map(|s| s.text.as_str()), Some("Passing 1/1"));
        assert_eq!(state.output.len(), 2);
        assert!(state.output_started.is_some());
        assert_eq!(state.coverage.map(|c| c.color), Some(StatusColor::Passing));

        state.hide_status();
        state.clear_coverage();
        assert!(state.status.is_none());
        assert!(state.coverage.is_none());
    }

    #[test]
    fn dialogs_queue_in_order_and_skip_repeats() {
        let mut state = DashboardState::new(".");
        state.notify(Notification::failed());
        state.notify(Notification::failed());
        state.prompt(ErrorPrompt::new(&"package.json not found", Some(PromptAction::Deactivate)));

        assert_eq!(state.dialogs.len(), 2);
        assert_eq!(
            state.current_dialog().map(|d| d.message.as_str()),
            Some("Node TDD: The build failed")
        );

        assert_eq!(state.accept_dialog(), Some(PromptAction::ShowOutput));
        let prompt = state.dismiss_dialog().unwrap();
        assert_eq!(prompt.level, NotificationLevel::Error);
        assert_eq!(prompt.action, Some(PromptAction::Deactivate));
        assert!(state.current_dialog().is_none());
    }

    #[test]
    fn scrolling_is_clamped_and_anchored() {
        let mut state = DashboardState::new(".");
        state.append_output("1\n2\n3\n4\n");

        state.scroll_up(100);
        assert_eq!(state.scroll_offset, 3);
        state.scroll_down(1);
        assert_eq!(state.scroll_offset, 2);

        // New lines keep the scrolled view on the same content
        state.append_output("5\n");
        assert_eq!(state.scroll_offset, 3);

        state.scroll_to_bottom();
        state.append_output("6\n");
        assert_eq!(state.scroll_offset, 0);

        state.clear_output();
        state.scroll_to_top();
        assert_eq!(state.scroll_offset, 0);
    }

    // =========================================================================
    // Theme and symbols
    // =========================================================================

    #[test]
    fn theme_uses_status_hex_colors() {
        let theme = Theme::default();
        assert_eq!(theme.status(StatusColor::Passing).fg, Some(Color::Rgb(0x55, 0xe2, 0x69)));
        assert_eq!(theme.status(StatusColor::Failing).fg, Some(Color::Rgb(0xff, 0x9b, 0x9b)));
        assert_eq!(theme.status(StatusColor::Default), Style::default());
    }

    #[test]
    fn hex_color_rejects_malformed_values() {
        assert_eq!(hex_color("#000000"), Some(Color::Rgb(0, 0, 0)));
        assert_eq!(hex_color("55e269"), None);
        assert_eq!(hex_color("#55e2"), None);
        assert_eq!(hex_color("#zzzzzz"), None);
    }

    #[test]
    fn monochrome_theme_has_no_colors() {
        let theme = Theme::monochrome();
        for style in [
            theme.status_passing,
            theme.status_failing,
            theme.dialog_error,
            theme.border,
            theme.key,
        ] {
            assert_eq!(style.fg, None);
            assert_eq!(style.bg, None);
        }
    }

    #[test]
    #[serial]
    fn theme_from_env_respects_no_color() {
        let original = std::env::var("NO_COLOR").ok();

        std::env::set_var("NO_COLOR", "1");
        assert_eq!(Theme::from_env().status_passing.fg, None);

        std::env::remove_var("NO_COLOR");
        assert!(Theme::from_env().status_passing.fg.is_some());

        if let Some(value) = original {
            std::env::set_var("NO_COLOR", value);
        }
    }

    #[test]
    #[serial]
    fn symbols_detect_falls_back_to_ascii() {
        let original = std::env::var("TERM").ok();

        std::env::set_var("TERM", "linux");
        assert_eq!(Symbols::detect().passing, "[+]");

        std::env::set_var("TERM", "xterm-256color");
        assert_eq!(Symbols::detect().passing, "✓");

        match original {
            Some(value) => std::env::set_var("TERM", value),
            None => std::env::remove_var("TERM"),
        }
    }

    #[test]
    fn every_icon_has_a_symbol() {
        for symbols in [UNICODE_SYMBOLS, ASCII_SYMBOLS] {
            for icon in [
                StatusIcon::Active,
                StatusIcon::Inactive,
                StatusIcon::Building,
                StatusIcon::Passing,
                StatusIcon::Failing,
                StatusIcon::Stopped,
                StatusIcon::Coverage,
            ] {
                assert!(!symbols.icon(icon).is_empty());
            }
        }
    }

    // =========================================================================
    // Key bindings
    // =========================================================================

    #[test]
    fn command_keys() {
        let cases = [
            ('r', Command::RunNow),
            ('s', Command::StopBuild),
            ('o', Command::ToggleOutput),
            ('a', Command::Activate),
            ('d', Command::Deactivate),
            ('p', Command::OpenManifest),
            ('R', Command::ReloadConfig),
            ('q', Command::Quit),
        ];
        for (c, command) in cases {
            assert_eq!(
                map_key(press(KeyCode::Char(c)), false),
                Some(KeyAction::Command(command)),
                "key {c}"
            );
        }

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(ctrl_c, true), Some(KeyAction::Command(Command::Quit)));
    }

    #[test]
    fn dialog_keys_only_apply_with_a_dialog() {
        assert_eq!(map_key(press(KeyCode::Enter), false), None);
        assert_eq!(map_key(press(KeyCode::Esc), false), None);
        assert_eq!(map_key(press(KeyCode::Enter), true), Some(KeyAction::AcceptDialog));
        assert_eq!(map_key(press(KeyCode::Esc), true), Some(KeyAction::DismissDialog));
    }

    #[test]
    fn key_releases_are_ignored() {
        let mut release = press(KeyCode::Char('q'));
        release.kind = KeyEventKind::Release;
        assert_eq!(map_key(release, false), None);
    }

    #[test]
    fn apply_key_action_scrolls_and_accepts() {
        let mut state = DashboardState::new(".");
        state.append_output("a\nb\nc\n");
        state.notify(Notification::passed());

        assert_eq!(apply_key_action(&mut state, KeyAction::ScrollUp(PAGE_SCROLL_LINES)), None);
        assert_eq!(state.scroll_offset, 2);
        apply_key_action(&mut state, KeyAction::ScrollBottom);
        assert_eq!(state.scroll_offset, 0);

        assert_eq!(
            apply_key_action(&mut state, KeyAction::AcceptDialog),
            Some(PromptAction::ShowOutput)
        );
        assert_eq!(
            apply_key_action(&mut state, KeyAction::Command(Command::Quit)),
            None
        );
    }

    // =========================================================================
    // EventHandler
    // =========================================================================

    #[test]
    fn crossterm_events_are_filtered() {
        let key = press(KeyCode::Char('r'));
        assert!(matches!(
            EventHandler::convert_crossterm_event(CrosstermEvent::Key(key)),
            Some(TuiEvent::Key(_))
        ));
        assert!(matches!(
            EventHandler::convert_crossterm_event(CrosstermEvent::Resize(80, 24)),
            Some(TuiEvent::Resize(80, 24))
        ));
        assert!(EventHandler::convert_crossterm_event(CrosstermEvent::FocusLost).is_none());
    }

    #[tokio::test]
    async fn event_handler_ticks_until_shutdown() {
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handler = EventHandler::with_tick_rate(event_tx, shutdown_rx, Duration::from_millis(5));
        assert_eq!(handler.tick_rate(), Duration::from_millis(5));
        let task = tokio::spawn(handler.run());

        let first = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
            .await
            .expect("tick within timeout");
        assert!(matches!(first, Some(TuiEvent::Tick)));

        shutdown_tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("handler stops")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn event_handler_stops_when_receiver_dropped() {
        let (event_tx, event_rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        drop(event_rx);

        let handler = EventHandler::with_tick_rate(event_tx, shutdown_rx, Duration::from_millis(5));
        let result = tokio::time::timeout(Duration::from_secs(2), handler.run())
            .await
            .expect("handler stops");
        assert!(result.is_ok());
    }
}

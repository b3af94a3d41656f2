//! The status display boundary.
//!
//! The build trigger never draws anything itself. It describes what should be
//! shown through the [`StatusPresenter`] trait, which is implemented by:
//!
//! - the TUI dashboard state ([`crate::tui::app::DashboardState`])
//! - [`HeadlessPresenter`], which prints one line per status change
//! - [`RecordingPresenter`], which records every call for tests
//!
//! Texts, colors and tooltips mirror the status items of the editor extension
//! this tool is modelled on.

use std::io::Write;

use crate::coverage::CoverageValue;
use crate::report::ReportStats;

/// Color used for a passing build and for coverage at or above the threshold.
pub const PASSING_COLOUR: &str = "#55e269";

/// Color used for a failing build and for coverage below the threshold.
pub const FAILING_COLOUR: &str = "#ff9b9b";

pub const PASSING_DIALOG_MESSAGE: &str = "Node TDD: The build passed";
pub const FAILING_DIALOG_MESSAGE: &str = "Node TDD: The build failed";
pub const STOPPED_DIALOG_MESSAGE: &str = "Node TDD: The build was stopped";

const BUILDING_TEXT: &str = "Building";
const PASSING_TEXT: &str = "Passing";
const FAILING_TEXT: &str = "Failing";
const STOPPED_TEXT: &str = "Build stopped";

const BUILDING_TOOLTIP: &str = "Click to stop current build";
const RESULT_TOOLTIP: &str = "Toggle output";
const COVERAGE_TOOLTIP: &str = "Test coverage";

/// Prefix for every prompt and notification.
pub const MESSAGE_PREFIX: &str = "Node TDD:";

/// Semantic status colors; the TUI maps them onto its theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusColor {
    /// Inherit the surrounding text color.
    #[default]
    Default,
    Passing,
    Failing,
    /// Dimmed; used for the minimal-mode building blink.
    Muted,
}

impl StatusColor {
    /// Hex color for colors that have a fixed value.
    #[must_use]
    pub fn hex(self) -> Option<&'static str> {
        match self {
            Self::Passing => Some(PASSING_COLOUR),
            Self::Failing => Some(FAILING_COLOUR),
            Self::Default | Self::Muted => None,
        }
    }
}

/// Icons shown next to status texts (and alone in minimal mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Active,
    Inactive,
    Building,
    Passing,
    Failing,
    Stopped,
    Coverage,
}

/// Commands a status item is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCommand {
    Activate,
    Deactivate,
    ToggleOutput,
    StopBuild,
}

/// One status bar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusItem {
    pub icon: StatusIcon,
    /// Label text; empty in minimal mode unless report stats are present.
    pub text: String,
    pub color: StatusColor,
    pub tooltip: String,
    pub command: Option<StatusCommand>,
}

impl StatusItem {
    /// The animated building item.
    ///
    /// `frame` selects the dot suffix (`""`, `"."`, `".."`, `"..."`). In minimal
    /// mode there is no text and `dimmed` alternates the color instead.
    #[must_use]
    pub fn building(frame: usize, minimal: bool, dimmed: bool) -> Self {
        let (text, color) = if minimal {
            let color = if dimmed {
                StatusColor::Muted
            } else {
                StatusColor::Default
            };
            (String::new(), color)
        } else {
            let dots = ".".repeat(frame % 4);
            (format!("{BUILDING_TEXT}{dots}"), StatusColor::Default)
        };

        Self {
            icon: StatusIcon::Building,
            text,
            color,
            tooltip: BUILDING_TOOLTIP.to_string(),
            command: Some(StatusCommand::StopBuild),
        }
    }

    /// Final item for a passing build.
    #[must_use]
    pub fn passing(stats: Option<ReportStats>, minimal: bool) -> Self {
        Self::result(StatusIcon::Passing, PASSING_TEXT, StatusColor::Passing, stats, minimal)
    }

    /// Final item for a failing build.
    #[must_use]
    pub fn failing(stats: Option<ReportStats>, minimal: bool) -> Self {
        Self::result(StatusIcon::Failing, FAILING_TEXT, StatusColor::Failing, stats, minimal)
    }

    /// Final item for a stopped build.
    #[must_use]
    pub fn stopped(minimal: bool) -> Self {
        Self {
            icon: StatusIcon::Stopped,
            text: if minimal {
                String::new()
            } else {
                STOPPED_TEXT.to_string()
            },
            color: StatusColor::Default,
            tooltip: String::new(),
            command: None,
        }
    }

    /// The extension item: on/off indicator bound to the opposite command.
    #[must_use]
    pub fn extension(enabled: bool) -> Self {
        if enabled {
            Self {
                icon: StatusIcon::Active,
                text: "TDD".to_string(),
                color: StatusColor::Default,
                tooltip: "Click to deactivate TDD mode".to_string(),
                command: Some(StatusCommand::Deactivate),
            }
        } else {
            Self {
                icon: StatusIcon::Inactive,
                text: "TDD".to_string(),
                color: StatusColor::Muted,
                tooltip: "Click to activate TDD mode".to_string(),
                command: Some(StatusCommand::Activate),
            }
        }
    }

    fn result(
        icon: StatusIcon,
        label: &str,
        color: StatusColor,
        stats: Option<ReportStats>,
        minimal: bool,
    ) -> Self {
        let text = match (stats, minimal) {
            (Some(stats), true) => format!("{}/{}", stats.pass, stats.count),
            (Some(stats), false) => format!("{label} {}/{}", stats.pass, stats.count),
            (None, true) => String::new(),
            (None, false) => label.to_string(),
        };

        Self {
            icon,
            text,
            color,
            tooltip: RESULT_TOOLTIP.to_string(),
            command: Some(StatusCommand::ToggleOutput),
        }
    }
}

/// The coverage status entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageDisplay {
    pub value: CoverageValue,
    pub color: StatusColor,
}

impl CoverageDisplay {
    /// Colors the value against an optional threshold; without a threshold the
    /// default color is used.
    #[must_use]
    pub fn new(value: CoverageValue, threshold: Option<f64>) -> Self {
        let color = match threshold {
            Some(threshold) if value.meets(threshold) => StatusColor::Passing,
            Some(_) => StatusColor::Failing,
            None => StatusColor::Default,
        };
        Self { value, color }
    }

    /// Text shown in the status bar, e.g. `93.5%`.
    #[must_use]
    pub fn text(&self) -> String {
        self.value.to_string()
    }

    #[must_use]
    pub fn tooltip(&self) -> &'static str {
        COVERAGE_TOOLTIP
    }
}

/// Action offered by a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    ShowOutput,
    OpenManifest,
    Deactivate,
}

impl PromptAction {
    /// Button label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ShowOutput => "Show output",
            Self::OpenManifest => "Open package.json",
            Self::Deactivate => "Deactivate",
        }
    }
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A build outcome dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<PromptAction>,
}

impl Notification {
    #[must_use]
    pub fn passed() -> Self {
        Self {
            level: NotificationLevel::Info,
            message: PASSING_DIALOG_MESSAGE.to_string(),
            action: Some(PromptAction::ShowOutput),
        }
    }

    #[must_use]
    pub fn failed() -> Self {
        Self {
            level: NotificationLevel::Error,
            message: FAILING_DIALOG_MESSAGE.to_string(),
            action: Some(PromptAction::ShowOutput),
        }
    }

    #[must_use]
    pub fn stopped() -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: STOPPED_DIALOG_MESSAGE.to_string(),
            action: None,
        }
    }
}

/// An environment problem that kept a run from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPrompt {
    pub message: String,
    pub action: Option<PromptAction>,
}

impl ErrorPrompt {
    /// Builds a prompt from an error, prefixing the message.
    #[must_use]
    pub fn new(error: &impl std::fmt::Display, action: Option<PromptAction>) -> Self {
        Self {
            message: format!("{MESSAGE_PREFIX} {error}"),
            action,
        }
    }
}

/// Receives everything the build trigger and controller want to show.
pub trait StatusPresenter {
    /// Replaces the build status item and makes it visible.
    fn set_status(&mut self, item: StatusItem);

    /// Hides the build status item.
    fn hide_status(&mut self);

    /// Updates the extension on/off item.
    fn set_extension_status(&mut self, enabled: bool);

    /// Appends raw process output.
    fn append_output(&mut self, text: &str);

    /// Clears the output buffer.
    fn clear_output(&mut self);

    /// Shows or hides the output panel.
    fn set_output_visible(&mut self, visible: bool);

    fn set_coverage(&mut self, coverage: CoverageDisplay);

    fn clear_coverage(&mut self);

    /// Shows an outcome dialog. Already gated by the dialog policy.
    fn notify(&mut self, notification: Notification);

    /// Shows an environment error with an optional action.
    fn prompt(&mut self, prompt: ErrorPrompt);
}

/// Line-oriented presenter for `--headless` and one-shot runs.
///
/// Animation frames are not printed; a status line is written only when the
/// icon changes. Output is passed through as it arrives.
#[derive(Debug)]
pub struct HeadlessPresenter<W: Write> {
    out: W,
    last_icon: Option<StatusIcon>,
    echo_output: bool,
}

impl<W: Write> HeadlessPresenter<W> {
    /// Creates a presenter writing to `out`. With `echo_output` off, process
    /// output is swallowed and only status lines are printed.
    pub fn new(out: W, echo_output: bool) -> Self {
        Self {
            out,
            last_icon: None,
            echo_output,
        }
    }

    /// Consumes the presenter, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // A closed stdout is not worth failing a run over
        let _ = writeln!(self.out, "[node-tdd] {text}");
        let _ = self.out.flush();
    }
}

impl<W: Write> StatusPresenter for HeadlessPresenter<W> {
    fn set_status(&mut self, item: StatusItem) {
        if self.last_icon == Some(item.icon) {
            return;
        }
        self.last_icon = Some(item.icon);

        let text = match item.icon {
            StatusIcon::Building => BUILDING_TEXT.to_string(),
            _ if item.text.is_empty() => format!("{:?}", item.icon),
            _ => item.text,
        };
        self.line(&text);
    }

    fn hide_status(&mut self) {
        self.last_icon = None;
    }

    fn set_extension_status(&mut self, enabled: bool) {
        self.line(if enabled {
            "TDD mode active"
        } else {
            "TDD mode inactive"
        });
    }

    fn append_output(&mut self, text: &str) {
        if self.echo_output {
            let _ = self.out.write_all(text.as_bytes());
        }
    }

    fn clear_output(&mut self) {}

    fn set_output_visible(&mut self, visible: bool) {
        self.echo_output = visible;
    }

    fn set_coverage(&mut self, coverage: CoverageDisplay) {
        self.line(&format!("Coverage {}", coverage.text()));
    }

    fn clear_coverage(&mut self) {}

    fn notify(&mut self, notification: Notification) {
        self.line(&notification.message);
    }

    fn prompt(&mut self, prompt: ErrorPrompt) {
        match prompt.action {
            Some(action) => self.line(&format!("{} ({})", prompt.message, action.label())),
            None => self.line(&prompt.message),
        }
    }
}

/// One recorded presenter call.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterCall {
    Status(StatusItem),
    HideStatus,
    ExtensionStatus(bool),
    Output(String),
    ClearOutput,
    OutputVisible(bool),
    Coverage(CoverageDisplay),
    ClearCoverage,
    Notify(Notification),
    Prompt(ErrorPrompt),
}

/// Presenter that records every call, for tests.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub calls: Vec<PresenterCall>,
}

impl RecordingPresenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent status item, if any.
    #[must_use]
    pub fn last_status(&self) -> Option<&StatusItem> {
        self.calls.iter().rev().find_map(|call| match call {
            PresenterCall::Status(item) => Some(item),
            _ => None,
        })
    }

    /// All output appended since the last clear.
    #[must_use]
    pub fn output(&self) -> String {
        let start = self
            .calls
            .iter()
            .rposition(|call| matches!(call, PresenterCall::ClearOutput))
            .map_or(0, |i| i + 1);

        self.calls[start..]
            .iter()
            .filter_map(|call| match call {
                PresenterCall::Output(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Current coverage display, taking clears into account.
    #[must_use]
    pub fn coverage(&self) -> Option<CoverageDisplay> {
        self.calls.iter().rev().find_map(|call| match call {
            PresenterCall::Coverage(display) => Some(Some(*display)),
            PresenterCall::ClearCoverage => Some(None),
            _ => None,
        })?
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<&Notification> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                PresenterCall::Notify(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<&ErrorPrompt> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                PresenterCall::Prompt(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

impl StatusPresenter for RecordingPresenter {
    fn set_status(&mut self, item: StatusItem) {
        self.calls.push(PresenterCall::Status(item));
    }

    fn hide_status(&mut self) {
        self.calls.push(PresenterCall::HideStatus);
    }

    fn set_extension_status(&mut self, enabled: bool) {
        self.calls.push(PresenterCall::ExtensionStatus(enabled));
    }

    fn append_output(&mut self, text: &str) {
        self.calls.push(PresenterCall::Output(text.to_string()));
    }

    fn clear_output(&mut self) {
        self.calls.push(PresenterCall::ClearOutput);
    }

    fn set_output_visible(&mut self, visible: bool) {
        self.calls.push(PresenterCall::OutputVisible(visible));
    }

    fn set_coverage(&mut self, coverage: CoverageDisplay) {
        self.calls.push(PresenterCall::Coverage(coverage));
    }

    fn clear_coverage(&mut self) {
        self.calls.push(PresenterCall::ClearCoverage);
    }

    fn notify(&mut self, notification: Notification) {
        self.calls.push(PresenterCall::Notify(notification));
    }

    fn prompt(&mut self, prompt: ErrorPrompt) {
        self.calls.push(PresenterCall::Prompt(prompt));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_frames_cycle_dots() {
        let texts: Vec<String> = (0..6)
            .map(|frame| StatusItem::building(frame, false, false).text)
            .collect();
        assert_eq!(
            texts,
            ["Building", "Building.", "Building..", "Building...", "Building", "Building."]
        );

        let item = StatusItem::building(0, false, false);
        assert_eq!(item.tooltip, "Click to stop current build");
        assert_eq!(item.command, Some(StatusCommand::StopBuild));
    }

    #[test]
    fn minimal_building_blinks_instead_of_dots() {
        let normal = StatusItem::building(2, true, false);
        let dimmed = StatusItem::building(2, true, true);
        assert!(normal.text.is_empty());
        assert_eq!(normal.color, StatusColor::Default);
        assert_eq!(dimmed.color, StatusColor::Muted);
    }

    #[test]
    fn result_items_match_extension_texts() {
        let passing = StatusItem::passing(None, false);
        assert_eq!(passing.text, "Passing");
        assert_eq!(passing.color.hex(), Some("#55e269"));
        assert_eq!(passing.tooltip, "Toggle output");
        assert_eq!(passing.command, Some(StatusCommand::ToggleOutput));

        let failing = StatusItem::failing(None, false);
        assert_eq!(failing.text, "Failing");
        assert_eq!(failing.color.hex(), Some("#ff9b9b"));

        let stopped = StatusItem::stopped(false);
        assert_eq!(stopped.text, "Build stopped");
        assert_eq!(stopped.command, None);
    }

    #[test]
    fn report_stats_are_appended() {
        let stats = Some(ReportStats { pass: 3, count: 4 });
        assert_eq!(StatusItem::failing(stats, false).text, "Failing 3/4");
        assert_eq!(StatusItem::failing(stats, true).text, "3/4");
        assert_eq!(StatusItem::passing(None, true).text, "");
    }

    #[test]
    fn coverage_color_against_threshold() {
        let value = CoverageValue::new(84.0);
        assert_eq!(CoverageDisplay::new(value, None).color, StatusColor::Default);
        assert_eq!(
            CoverageDisplay::new(value, Some(80.0)).color,
            StatusColor::Passing
        );
        assert_eq!(
            CoverageDisplay::new(value, Some(90.0)).color,
            StatusColor::Failing
        );

        let display = CoverageDisplay::new(value, None);
        assert_eq!(display.text(), "84%");
        assert_eq!(display.tooltip(), "Test coverage");
    }

    #[test]
    fn prompts_are_prefixed() {
        let prompt = ErrorPrompt::new(&"npm script `x` was not found", Some(PromptAction::OpenManifest));
        assert_eq!(prompt.message, "Node TDD: npm script `x` was not found");
        assert_eq!(PromptAction::OpenManifest.label(), "Open package.json");
    }

    #[test]
    fn headless_prints_status_changes_once() {
        let mut presenter = HeadlessPresenter::new(Vec::new(), true);
        for frame in 0..4 {
            presenter.set_status(StatusItem::building(frame, false, false));
        }
        presenter.append_output("ok 1\n");
        presenter.set_status(StatusItem::passing(Some(ReportStats { pass: 1, count: 1 }), false));
        presenter.notify(Notification::passed());

        let printed = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(
            printed,
            "[node-tdd] Building\nok 1\n[node-tdd] Passing 1/1\n[node-tdd] Node TDD: The build passed\n"
        );
    }

    #[test]
    fn headless_can_swallow_output() {
        let mut presenter = HeadlessPresenter::new(Vec::new(), false);
        presenter.append_output("noise\n");
        assert!(presenter.into_inner().is_empty());
    }

    #[test]
    fn recording_presenter_tracks_state() {
        let mut presenter = RecordingPresenter::new();
        presenter.append_output("old");
        presenter.clear_output();
        presenter.append_output("a");
        presenter.append_output("b");
        presenter.set_coverage(CoverageDisplay::new(CoverageValue::new(50.0), None));

        assert_eq!(presenter.output(), "ab");
        assert!(presenter.coverage().is_some());

        presenter.clear_coverage();
        assert!(presenter.coverage().is_none());
    }
}

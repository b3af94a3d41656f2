//! The build trigger: watch subscription, single-flight runs and outcomes.
//!
//! [`BuildTrigger`] owns everything with a lifetime tied to runs and watches:
//! the [`FileWatcher`] (and through it the debouncer), the active
//! [`TestProcess`] and the animation timer. It drives a [`StatusPresenter`]
//! and is itself driven by one control loop:
//!
//! ```no_run
//! # use node_tdd::trigger::BuildTrigger;
//! # use node_tdd::presenter::RecordingPresenter;
//! # async fn demo(trigger: &mut BuildTrigger<RecordingPresenter>) {
//! loop {
//!     let event = trigger.next_event().await;
//!     if let Some(outcome) = trigger.handle(event).await {
//!         println!("{outcome:?}");
//!     }
//! }
//! # }
//! ```
//!
//! # States
//!
//! | State | Leaves on | To |
//! |-------|-----------|----|
//! | `Idle` | debounced file event, [`BuildTrigger::run`] | `Running` (if the manifest checks pass) |
//! | `Running` | process exit | `Idle` with a [`BuildOutcome`] |
//!
//! A run request while `Running` is ignored, not queued.
//!
//! # Outcomes
//!
//! - exit after [`BuildTrigger::stop`]: `Stopped`, output is not parsed
//! - exit code 0: `Passed`
//! - any other exit code, or a signal nobody asked for: `Failed`

use std::mem;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{DialogPolicy, Settings, WatchConfiguration};
use crate::coverage::{CoverageParser, CoverageValue, PercentAverage};
use crate::manifest::{ManifestError, PackageManifest, TestInvocation};
use crate::presenter::{
    CoverageDisplay, ErrorPrompt, Notification, PromptAction, StatusItem, StatusPresenter,
};
use crate::process::{OutputStream, ProcessEvent, ProcessExit, TestProcess};
use crate::report::{parse_report, ReportStats};
use crate::watcher::{FileEvent, FileWatcher, WatcherError};

/// Capacity of the per-run process event channel.
const PROCESS_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the debounced trigger channel.
const TRIGGER_CHANNEL_CAPACITY: usize = 8;

/// In minimal mode the building indicator toggles every this many frames.
const BLINK_FRAMES: usize = 3;

/// What a finished, non-stopped run produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub coverage: Option<CoverageValue>,
    pub stats: Option<ReportStats>,
    pub exit_code: Option<i32>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BuildOutcome {
    Passed(RunSummary),
    Failed(RunSummary),
    Stopped,
}

impl BuildOutcome {
    #[must_use]
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Passed(summary) | Self::Failed(summary) => Some(summary),
            Self::Stopped => None,
        }
    }
}

/// Result of a run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    /// A process was spawned.
    Started,
    /// A run is already in flight; nothing happened.
    AlreadyRunning,
    /// A precondition failed; a prompt was shown and the trigger stayed idle.
    Aborted,
}

/// Something the control loop has to react to.
#[derive(Debug)]
pub enum TriggerEvent {
    /// The debouncer fired. `None` means the watch channel closed.
    FileChanged(Option<FileEvent>),
    /// The active process produced an event. `None` means its channel closed.
    Process(Option<ProcessEvent>),
    /// Time for the next building animation frame.
    AnimationTick,
}

/// State of the single in-flight run.
struct ActiveRun {
    process: TestProcess,
    events: mpsc::Receiver<ProcessEvent>,
    animation: Interval,
    frame: usize,
    coverage_scratch: String,
    report_buffer: String,
    invocation: TestInvocation,
    started: Instant,
}

enum RunState {
    Idle,
    Running(Box<ActiveRun>),
}

/// An active watch and the receiving end of its debouncer.
struct Watch {
    _watcher: FileWatcher,
    triggers: mpsc::Receiver<FileEvent>,
}

/// Owns the watch, the run lifecycle and the presenter.
pub struct BuildTrigger<P: StatusPresenter> {
    root: PathBuf,
    settings: Settings,
    presenter: P,
    coverage_parser: Box<dyn CoverageParser>,
    state: RunState,
    watch: Option<Watch>,
    last_outcome: Option<BuildOutcome>,
}

impl<P: StatusPresenter> BuildTrigger<P> {
    /// Creates an idle trigger that is not watching anything yet.
    pub fn new(root: impl Into<PathBuf>, settings: Settings, presenter: P) -> Self {
        Self {
            root: root.into(),
            settings,
            presenter,
            coverage_parser: Box::new(PercentAverage),
            state: RunState::Idle,
            watch: None,
            last_outcome: None,
        }
    }

    /// Replaces the coverage heuristic.
    #[must_use]
    pub fn with_coverage_parser(mut self, parser: Box<dyn CoverageParser>) -> Self {
        self.coverage_parser = parser;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running(_))
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Outcome of the most recent completed run.
    #[must_use]
    pub fn last_outcome(&self) -> Option<BuildOutcome> {
        self.last_outcome
    }

    /// Establishes the watch from the current settings, replacing any
    /// existing one, and runs once if `buildOnActivation` is set.
    ///
    /// # Errors
    ///
    /// Returns a [`WatcherError`] if the watch cannot be set up; the trigger is
    /// then left without a watch.
    pub async fn watch(&mut self) -> Result<(), WatcherError> {
        let config = self.establish_watch()?;

        if config.run_on_activation {
            self.run().await;
        }
        Ok(())
    }

    /// Releases the watch subscription; pending debounced events are dropped.
    pub fn unwatch(&mut self) {
        if self.watch.take().is_some() {
            debug!("Released watch subscription");
        }
    }

    /// Applies new settings, re-establishing the watch if one was active.
    ///
    /// A run in flight is not interrupted; the rest of its output is handled
    /// with the new settings.
    ///
    /// # Errors
    ///
    /// Returns a [`WatcherError`] if the watch cannot be re-established.
    pub fn reconfigure(&mut self, settings: Settings) -> Result<(), WatcherError> {
        let was_watching = self.is_watching();
        self.settings = settings;

        if was_watching {
            self.establish_watch()?;
        }
        Ok(())
    }

    /// Replaces the watch and returns the configuration it was built from.
    fn establish_watch(&mut self) -> Result<WatchConfiguration, WatcherError> {
        self.unwatch();

        let config = self.settings.watch_configuration();
        let (tx, rx) = mpsc::channel(TRIGGER_CHANNEL_CAPACITY);
        let watcher = FileWatcher::new(&self.root, &config, tx)?;
        self.watch = Some(Watch {
            _watcher: watcher,
            triggers: rx,
        });
        Ok(config)
    }

    /// Starts a run unless one is already in flight.
    pub async fn run(&mut self) -> RunStart {
        if self.is_running() {
            debug!("Run requested while running, ignoring");
            return RunStart::AlreadyRunning;
        }

        let invocation = match self.resolve_invocation().await {
            Ok(invocation) => invocation,
            Err(error) => {
                warn!(error = %error, "Not starting test run");
                let action = if error.is_missing() {
                    PromptAction::Deactivate
                } else {
                    PromptAction::OpenManifest
                };
                self.presenter.prompt(ErrorPrompt::new(&error, Some(action)));
                return RunStart::Aborted;
            }
        };

        let (tx, rx) = mpsc::channel(PROCESS_CHANNEL_CAPACITY);
        let process = match TestProcess::spawn(&invocation, &self.root, tx) {
            Ok(process) => process,
            Err(error) => {
                warn!(error = %error, "Failed to start test run");
                self.presenter.prompt(ErrorPrompt::new(&error, None));
                return RunStart::Aborted;
            }
        };

        self.presenter.clear_output();
        self.presenter.clear_coverage();
        self.presenter
            .set_status(StatusItem::building(0, self.settings.minimal, false));

        let period = self.settings.animation_interval();
        let mut animation = interval_at(tokio::time::Instant::now() + period, period);
        animation.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(command = %invocation.display(), "Test run started");

        self.state = RunState::Running(Box::new(ActiveRun {
            process,
            events: rx,
            animation,
            frame: 0,
            coverage_scratch: String::new(),
            report_buffer: String::new(),
            invocation,
            started: Instant::now(),
        }));

        RunStart::Started
    }

    /// Requests termination of the active run. Returns `false` when idle.
    pub fn stop(&mut self) -> bool {
        match &mut self.state {
            RunState::Running(run) => {
                info!(command = %run.invocation.display(), "Stopping test run");
                run.process.stop();
                true
            }
            RunState::Idle => false,
        }
    }

    /// Stops any run and releases the watch. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.stop();
        self.unwatch();
    }

    /// Waits for the next thing the trigger has to react to.
    ///
    /// Pends forever when idle and not watching. Cancel safe.
    pub async fn next_event(&mut self) -> TriggerEvent {
        let Self { state, watch, .. } = self;

        let file = async move {
            match watch {
                Some(watch) => watch.triggers.recv().await,
                None => std::future::pending().await,
            }
        };

        match state {
            RunState::Running(run) => {
                let ActiveRun {
                    events, animation, ..
                } = run.as_mut();
                tokio::select! {
                    // Drain process events before anything else so the exit is
                    // handled promptly and chunks are never starved by ticks.
                    biased;
                    event = events.recv() => TriggerEvent::Process(event),
                    event = file => TriggerEvent::FileChanged(event),
                    _ = animation.tick() => TriggerEvent::AnimationTick,
                }
            }
            RunState::Idle => TriggerEvent::FileChanged(file.await),
        }
    }

    /// Applies one event. Returns the outcome when a run just finished.
    pub async fn handle(&mut self, event: TriggerEvent) -> Option<BuildOutcome> {
        match event {
            TriggerEvent::FileChanged(Some(file_event)) => {
                info!(kind = ?file_event.kind, path = %file_event.path.display(), "File change triggered run");
                self.run().await;
                None
            }
            TriggerEvent::FileChanged(None) => {
                warn!("Watch channel closed, releasing watch");
                self.unwatch();
                None
            }
            TriggerEvent::Process(Some(ProcessEvent::Output(chunk))) => {
                self.on_output(chunk.stream, &chunk.text);
                None
            }
            TriggerEvent::Process(Some(ProcessEvent::Exited(exit))) => Some(self.finish(exit)),
            TriggerEvent::Process(None) => {
                warn!("Process channel closed without an exit event");
                Some(self.finish(ProcessExit::default()))
            }
            TriggerEvent::AnimationTick => {
                self.on_tick();
                None
            }
        }
    }

    /// Drives events until the current run finishes.
    ///
    /// Returns `None` immediately when idle.
    pub async fn run_to_completion(&mut self) -> Option<BuildOutcome> {
        while self.is_running() {
            let event = self.next_event().await;
            if let Some(outcome) = self.handle(event).await {
                return Some(outcome);
            }
        }
        None
    }

    async fn resolve_invocation(&self) -> Result<TestInvocation, ManifestError> {
        let manifest = PackageManifest::load(&self.root).await?;
        TestInvocation::resolve(
            &manifest,
            &self.settings.package_manager,
            &self.settings.test_script,
        )
    }

    fn on_output(&mut self, stream: OutputStream, text: &str) {
        let RunState::Running(run) = &mut self.state else {
            return;
        };

        self.presenter.append_output(text);

        if stream == OutputStream::Stdout {
            if self.settings.show_coverage && text.contains('%') {
                run.coverage_scratch.push_str(text);
            }
            if self.settings.reporter.is_some() {
                run.report_buffer.push_str(text);
            }
        }
    }

    fn on_tick(&mut self) {
        let RunState::Running(run) = &mut self.state else {
            return;
        };

        run.frame += 1;
        if self.settings.minimal {
            if run.frame % BLINK_FRAMES == 0 {
                let dimmed = (run.frame / BLINK_FRAMES) % 2 == 1;
                self.presenter
                    .set_status(StatusItem::building(run.frame, true, dimmed));
            }
        } else {
            self.presenter
                .set_status(StatusItem::building(run.frame, false, false));
        }
    }

    fn finish(&mut self, exit: ProcessExit) -> BuildOutcome {
        let RunState::Running(run) = mem::replace(&mut self.state, RunState::Idle) else {
            return BuildOutcome::Stopped;
        };
        let elapsed_ms = run.started.elapsed().as_millis();
        let minimal = self.settings.minimal;

        let outcome = if exit.ended_by_stop() {
            self.presenter.set_status(StatusItem::stopped(minimal));
            BuildOutcome::Stopped
        } else {
            let coverage = if self.settings.show_coverage && !run.coverage_scratch.is_empty() {
                self.coverage_parser.parse(&run.coverage_scratch)
            } else {
                None
            };
            if let Some(value) = coverage {
                self.presenter
                    .set_coverage(CoverageDisplay::new(value, self.settings.coverage_threshold));
            }

            let stats = self
                .settings
                .reporter
                .as_deref()
                .and_then(|reporter| parse_report(reporter, &run.report_buffer));

            let summary = RunSummary {
                coverage,
                stats,
                exit_code: exit.code,
            };

            if exit.success() {
                self.presenter.set_status(StatusItem::passing(stats, minimal));
                BuildOutcome::Passed(summary)
            } else {
                self.presenter.set_status(StatusItem::failing(stats, minimal));
                BuildOutcome::Failed(summary)
            }
        };

        info!(
            command = %run.invocation.display(),
            %exit,
            elapsed_ms,
            outcome = ?outcome,
            "Test run finished"
        );

        if let Some(notification) = notification_for(&outcome, self.settings.dialog_policy()) {
            self.presenter.notify(notification);
        }

        self.last_outcome = Some(outcome);
        outcome
    }
}

impl<P: StatusPresenter> Drop for BuildTrigger<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Picks the dialog for an outcome under a policy.
fn notification_for(outcome: &BuildOutcome, policy: DialogPolicy) -> Option<Notification> {
    match (policy, outcome) {
        (DialogPolicy::Never, _) => None,
        (DialogPolicy::Failure, BuildOutcome::Failed(_)) => Some(Notification::failed()),
        (DialogPolicy::Failure, _) => None,
        (DialogPolicy::Always, BuildOutcome::Passed(_)) => Some(Notification::passed()),
        (DialogPolicy::Always, BuildOutcome::Failed(_)) => Some(Notification::failed()),
        (DialogPolicy::Always, BuildOutcome::Stopped) => Some(Notification::stopped()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::{PresenterCall, RecordingPresenter, StatusIcon};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn summary() -> RunSummary {
        RunSummary {
            coverage: None,
            stats: None,
            exit_code: Some(0),
        }
    }

    #[test]
    fn notification_policy() {
        let passed = BuildOutcome::Passed(summary());
        let failed = BuildOutcome::Failed(summary());
        let stopped = BuildOutcome::Stopped;

        assert_eq!(notification_for(&passed, DialogPolicy::Never), None);
        assert_eq!(notification_for(&failed, DialogPolicy::Never), None);

        assert_eq!(notification_for(&passed, DialogPolicy::Failure), None);
        assert_eq!(
            notification_for(&failed, DialogPolicy::Failure),
            Some(Notification::failed())
        );
        assert_eq!(notification_for(&stopped, DialogPolicy::Failure), None);

        assert_eq!(
            notification_for(&passed, DialogPolicy::Always),
            Some(Notification::passed())
        );
        assert_eq!(
            notification_for(&stopped, DialogPolicy::Always),
            Some(Notification::stopped())
        );
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(BuildOutcome::Stopped).unwrap();
        assert_eq!(json["outcome"], "stopped");

        let json = serde_json::to_value(BuildOutcome::Passed(summary())).unwrap();
        assert_eq!(json["outcome"], "passed");
        assert_eq!(json["exit_code"], 0);
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut trigger = BuildTrigger::new(dir.path(), Settings::default(), RecordingPresenter::new());

        assert!(!trigger.stop());
        trigger.dispose();
        trigger.dispose();

        assert!(trigger.presenter().calls.is_empty());
        assert_eq!(trigger.run_to_completion().await, None);
    }

    #[tokio::test]
    async fn missing_manifest_offers_deactivate() {
        let dir = TempDir::new().unwrap();
        let mut trigger = BuildTrigger::new(dir.path(), Settings::default(), RecordingPresenter::new());

        assert_eq!(trigger.run().await, RunStart::Aborted);
        assert!(!trigger.is_running());

        let prompts = trigger.presenter().prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].action, Some(PromptAction::Deactivate));
        assert!(prompts[0].message.starts_with("Node TDD: no package.json found"));
    }

    #[tokio::test]
    async fn invalid_manifest_offers_open() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{ broken").unwrap();
        let mut trigger = BuildTrigger::new(dir.path(), Settings::default(), RecordingPresenter::new());

        assert_eq!(trigger.run().await, RunStart::Aborted);
        let prompts = trigger.presenter().prompts();
        assert_eq!(prompts[0].action, Some(PromptAction::OpenManifest));
    }

    #[tokio::test]
    async fn missing_script_spawns_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts":{"test":"mocha"}}"#,
        )
        .unwrap();
        let settings = Settings {
            test_script: "customname".to_string(),
            ..Settings::default()
        };
        let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

        assert_eq!(trigger.run().await, RunStart::Aborted);
        assert!(!trigger.is_running());

        let presenter = trigger.presenter();
        assert!(presenter.last_status().is_none(), "no building status");
        let prompts = presenter.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].message.contains("customname"));
        assert_eq!(
            prompts[0].message,
            "Node TDD: npm script `customname` was not found"
        );
        assert_eq!(prompts[0].action, Some(PromptAction::OpenManifest));
    }

    #[cfg(unix)]
    mod with_process {
        use super::*;

        /// A workspace whose `test` script is run by `sh test`.
        fn workspace(script: &str) -> TempDir {
            let dir = TempDir::new().unwrap();
            std::fs::write(
                dir.path().join("package.json"),
                r#"{"name":"demo","scripts":{"test":"node test.js"}}"#,
            )
            .unwrap();
            std::fs::write(dir.path().join("test"), script).unwrap();
            dir
        }

        fn sh_settings() -> Settings {
            Settings {
                package_manager: "sh".to_string(),
                ..Settings::default()
            }
        }

        async fn complete(trigger: &mut BuildTrigger<RecordingPresenter>) -> BuildOutcome {
            timeout(Duration::from_secs(10), trigger.run_to_completion())
                .await
                .expect("run should finish")
                .expect("run should be active")
        }

        #[tokio::test]
        async fn passing_run_without_coverage_output() {
            let dir = workspace("echo '1 passing'\n");
            let settings = Settings {
                show_coverage: true,
                ..sh_settings()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            assert_eq!(trigger.run().await, RunStart::Started);
            let outcome = complete(&mut trigger).await;

            assert_eq!(
                outcome,
                BuildOutcome::Passed(RunSummary {
                    coverage: None,
                    stats: None,
                    exit_code: Some(0),
                })
            );
            assert!(!trigger.is_running());
            assert_eq!(trigger.last_outcome(), Some(outcome));

            let presenter = trigger.presenter();
            assert!(presenter.calls.contains(&PresenterCall::ClearCoverage));
            assert!(presenter.coverage().is_none(), "coverage stays cleared");
            assert_eq!(presenter.output(), "1 passing\n");
            assert_eq!(presenter.last_status().unwrap().icon, StatusIcon::Passing);
            assert!(presenter.notifications().is_empty(), "verbose is off");
        }

        #[tokio::test]
        async fn failing_run_with_coverage_and_tap() {
            let dir = workspace(
                "echo 'ok 1 adds'\necho 'not ok 2 subtracts'\necho '1..2'\n\
                 echo 'Statements : 80% ( 4/5 )'\necho 'Lines : 90%' >&2\nexit 1\n",
            );
            let settings = Settings {
                show_coverage: true,
                coverage_threshold: Some(85.0),
                reporter: Some("tap".to_string()),
                verbose: true,
                ..sh_settings()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            trigger.run().await;
            let outcome = complete(&mut trigger).await;

            let summary = outcome.summary().copied().expect("not stopped");
            assert!(matches!(outcome, BuildOutcome::Failed(_)));
            assert_eq!(summary.exit_code, Some(1));
            assert_eq!(summary.stats, Some(ReportStats { pass: 1, count: 2 }));
            // stderr percentages are not coverage
            assert_eq!(summary.coverage, Some(CoverageValue::new(80.0)));

            let presenter = trigger.presenter();
            let coverage = presenter.coverage().expect("coverage shown");
            assert_eq!(coverage.color, crate::presenter::StatusColor::Failing);
            assert_eq!(presenter.last_status().unwrap().text, "Failing 1/2");
            assert_eq!(presenter.notifications(), [&Notification::failed()]);
        }

        #[tokio::test]
        async fn other_exit_codes_fail() {
            let dir = workspace("exit 7\n");
            let mut trigger = BuildTrigger::new(dir.path(), sh_settings(), RecordingPresenter::new());

            trigger.run().await;
            let outcome = complete(&mut trigger).await;
            assert!(matches!(
                outcome,
                BuildOutcome::Failed(RunSummary { exit_code: Some(7), .. })
            ));
        }

        #[tokio::test]
        async fn run_while_running_is_ignored() {
            let dir = workspace("sleep 5\n");
            let mut trigger = BuildTrigger::new(dir.path(), sh_settings(), RecordingPresenter::new());

            assert_eq!(trigger.run().await, RunStart::Started);
            assert_eq!(trigger.run().await, RunStart::AlreadyRunning);
            assert_eq!(trigger.run().await, RunStart::AlreadyRunning);

            let clears = trigger
                .presenter()
                .calls
                .iter()
                .filter(|c| matches!(c, PresenterCall::ClearOutput))
                .count();
            assert_eq!(clears, 1, "only one run was started");

            assert!(trigger.stop());
            assert_eq!(complete(&mut trigger).await, BuildOutcome::Stopped);
        }

        #[tokio::test]
        async fn stop_after_exit_keeps_the_result() {
            let dir = workspace("exit 0\n");
            let mut trigger = BuildTrigger::new(dir.path(), sh_settings(), RecordingPresenter::new());

            trigger.run().await;
            // The exit event is queued but not handled yet
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(trigger.stop());

            let outcome = complete(&mut trigger).await;
            assert!(matches!(outcome, BuildOutcome::Passed(_)), "{outcome:?}");
            assert_eq!(
                trigger.presenter().last_status().unwrap().icon,
                StatusIcon::Passing
            );
        }

        #[tokio::test]
        async fn stopped_run_skips_parsing() {
            let dir = workspace("echo 'Lines: 50%'\nsleep 5\n");
            let settings = Settings {
                show_coverage: true,
                dialog: Some(DialogPolicy::Always),
                ..sh_settings()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            trigger.run().await;
            // Wait for the coverage line to arrive before stopping
            loop {
                let event = trigger.next_event().await;
                let is_output = matches!(event, TriggerEvent::Process(Some(ProcessEvent::Output(_))));
                trigger.handle(event).await;
                if is_output {
                    break;
                }
            }
            trigger.stop();
            let outcome = complete(&mut trigger).await;

            assert_eq!(outcome, BuildOutcome::Stopped);
            let presenter = trigger.presenter();
            assert!(presenter.coverage().is_none());
            assert_eq!(presenter.last_status().unwrap().text, "Build stopped");
            assert_eq!(presenter.notifications(), [&Notification::stopped()]);
        }

        #[tokio::test]
        async fn building_animation_cycles() {
            let dir = workspace("sleep 1\n");
            let settings = Settings {
                animation_interval_ms: 20,
                ..sh_settings()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            trigger.run().await;
            complete(&mut trigger).await;

            let texts: Vec<&str> = trigger
                .presenter()
                .calls
                .iter()
                .filter_map(|c| match c {
                    PresenterCall::Status(item) if item.icon == StatusIcon::Building => {
                        Some(item.text.as_str())
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(&texts[..4], ["Building", "Building.", "Building..", "Building..."]);
        }

        #[tokio::test]
        async fn minimal_mode_blinks() {
            let dir = workspace("sleep 1\n");
            let settings = Settings {
                animation_interval_ms: 20,
                minimal: true,
                ..sh_settings()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            trigger.run().await;
            complete(&mut trigger).await;

            let colors: Vec<_> = trigger
                .presenter()
                .calls
                .iter()
                .filter_map(|c| match c {
                    PresenterCall::Status(item) if item.icon == StatusIcon::Building => {
                        assert!(item.text.is_empty());
                        Some(item.color)
                    }
                    _ => None,
                })
                .collect();
            assert!(colors.contains(&crate::presenter::StatusColor::Muted));
            assert!(colors.len() < 25, "blink updates less often than frames");
        }

        #[tokio::test]
        async fn spawn_failure_stays_idle() {
            let dir = workspace("exit 0\n");
            let settings = Settings {
                package_manager: "definitely-not-a-package-manager".to_string(),
                ..Settings::default()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            assert_eq!(trigger.run().await, RunStart::Aborted);
            assert!(!trigger.is_running());
            let prompts = trigger.presenter().prompts();
            assert!(prompts[0].message.contains("failed to start"));
            assert_eq!(prompts[0].action, None);
        }

        #[tokio::test]
        async fn new_run_clears_previous_coverage() {
            let dir = workspace("echo 'Lines: 70%'\n");
            let settings = Settings {
                show_coverage: true,
                ..sh_settings()
            };
            let mut trigger = BuildTrigger::new(dir.path(), settings, RecordingPresenter::new());

            trigger.run().await;
            complete(&mut trigger).await;
            assert!(trigger.presenter().coverage().is_some());

            std::fs::write(dir.path().join("test"), "sleep 5\n").unwrap();
            trigger.run().await;
            assert!(trigger.presenter().coverage().is_none());
            trigger.stop();
            complete(&mut trigger).await;
        }
    }
}

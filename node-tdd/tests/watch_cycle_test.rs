//! End-to-end tests of the watch → debounce → run → outcome cycle.
//!
//! A real `sh` stands in for the package manager: with `packageManager = "sh"`
//! the `test` script becomes `sh test`, which runs the `test` file in the
//! workspace root. No Node toolchain is needed.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use node_tdd::config::{Config, ConfigSource, Settings};
use node_tdd::controller::{Command, Controller, Flow};
use node_tdd::presenter::{
    PresenterCall, RecordingPresenter, StatusIcon, StatusPresenter, PASSING_DIALOG_MESSAGE,
};
use node_tdd::trigger::{BuildOutcome, RunStart};
use node_tdd::tui::DashboardState;

// ============================================================================
// Helper Functions
// ============================================================================

/// Creates a workspace with a manifest, a `test` shell script and one source
/// file under `src/`.
fn create_workspace(test_script: &str) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("package.json"),
        r#"{"name":"demo","scripts":{"test":"mocha"}}"#,
    )
    .expect("Failed to write package.json");
    fs::write(dir.path().join("test"), test_script).expect("Failed to write test script");
    fs::create_dir_all(dir.path().join("src")).expect("Failed to create src");
    fs::write(dir.path().join("src/app.js"), "module.exports = 1;\n")
        .expect("Failed to write source file");
    dir
}

fn sh_settings() -> Settings {
    Settings {
        package_manager: "sh".to_string(),
        debounce_ms: 100,
        animation_interval_ms: 50,
        ..Settings::default()
    }
}

fn controller<P: StatusPresenter>(dir: &Path, settings: Settings, presenter: P) -> Controller<P> {
    let source = ConfigSource::new(dir).with_user_settings(None);
    let config = Config {
        workspace_root: dir.to_path_buf(),
        settings,
    };
    Controller::new(config, source, presenter)
}

/// Drives the controller until a build finishes.
async fn next_outcome<P: StatusPresenter>(controller: &mut Controller<P>) -> BuildOutcome {
    timeout(Duration::from_secs(10), async {
        loop {
            let event = controller.next_event().await;
            if let Some(outcome) = controller.handle(event).await {
                return outcome;
            }
        }
    })
    .await
    .expect("a build should finish")
}

fn runs_started(presenter: &RecordingPresenter) -> usize {
    presenter
        .calls
        .iter()
        .filter(|call| matches!(call, PresenterCall::ClearOutput))
        .count()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn source_change_runs_the_test_script() {
    let dir = create_workspace("echo 'ok 1 - works'\n");
    let mut c = controller(dir.path(), sh_settings(), RecordingPresenter::new());

    c.start().await;
    assert!(c.trigger().is_watching());
    sleep(Duration::from_millis(100)).await;

    fs::write(dir.path().join("src/app.js"), "module.exports = 2;\n").unwrap();

    let outcome = next_outcome(&mut c).await;
    assert!(matches!(outcome, BuildOutcome::Passed(_)), "{outcome:?}");

    let presenter = c.presenter();
    assert_eq!(presenter.output(), "ok 1 - works\n");
    assert_eq!(presenter.last_status().unwrap().icon, StatusIcon::Passing);
}

#[tokio::test]
async fn a_burst_of_changes_starts_one_run() {
    let dir = create_workspace("sleep 0.2\necho done\n");
    let mut c = controller(dir.path(), sh_settings(), RecordingPresenter::new());

    c.activate().await;
    sleep(Duration::from_millis(100)).await;

    for i in 0..5 {
        fs::write(dir.path().join("src/app.js"), format!("module.exports = {i};\n")).unwrap();
        sleep(Duration::from_millis(10)).await;
    }

    next_outcome(&mut c).await;
    assert_eq!(runs_started(c.presenter()), 1);
}

#[tokio::test]
async fn unmatched_files_do_not_trigger() {
    let dir = create_workspace("echo ran\n");
    let mut c = controller(dir.path(), sh_settings(), RecordingPresenter::new());

    c.activate().await;
    sleep(Duration::from_millis(100)).await;

    fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    fs::write(dir.path().join("src/notes.txt"), "todo\n").unwrap();

    let woke = timeout(Duration::from_millis(500), c.next_event()).await;
    assert!(woke.is_err(), "no trigger expected");
    assert_eq!(runs_started(c.presenter()), 0);
}

#[tokio::test]
async fn failing_build_with_tap_counts_and_coverage() {
    let script = "\
echo 'TAP version 13'
echo 'ok 1 - adds'
echo 'not ok 2 - subtracts'
echo '1..2'
echo 'Statements   : 80% ( 8/10 )'
echo 'Lines        : 70% ( 7/10 )'
exit 1
";
    let dir = create_workspace(script);
    let settings = Settings {
        reporter: Some("tap".to_string()),
        show_coverage: true,
        coverage_threshold: Some(90.0),
        verbose: true,
        ..sh_settings()
    };
    let mut c = controller(dir.path(), settings, RecordingPresenter::new());

    assert_eq!(c.run_now().await, RunStart::Started);
    let outcome = next_outcome(&mut c).await;

    let summary = *outcome.summary().expect("failed builds have a summary");
    assert!(matches!(outcome, BuildOutcome::Failed(_)));
    assert_eq!(summary.exit_code, Some(1));
    assert_eq!(summary.stats.map(|s| (s.pass, s.count)), Some((1, 2)));
    assert_eq!(summary.coverage.map(|c| c.percent()), Some(75.0));

    let presenter = c.presenter();
    assert_eq!(presenter.last_status().unwrap().text, "Failing 1/2");
    assert!(presenter.coverage().is_some());
    assert_eq!(presenter.notifications().len(), 1);
}

#[tokio::test]
async fn stop_command_ends_a_long_build() {
    let dir = create_workspace("sleep 30\n");
    let mut c = controller(dir.path(), sh_settings(), RecordingPresenter::new());

    assert_eq!(c.run_now().await, RunStart::Started);
    assert_eq!(c.dispatch(Command::StopBuild).await, Flow::Continue);

    assert_eq!(next_outcome(&mut c).await, BuildOutcome::Stopped);
    assert!(!c.trigger().is_running());
}

#[tokio::test]
async fn dashboard_state_as_presenter() {
    let dir = create_workspace("echo 'ok 1'\n");
    let settings = Settings {
        dialog: Some(node_tdd::config::DialogPolicy::Always),
        ..sh_settings()
    };
    let mut c = controller(dir.path(), settings, DashboardState::new("demo"));

    c.start().await;
    c.dispatch(Command::ToggleOutput).await;
    c.run_now().await;
    next_outcome(&mut c).await;

    let state = c.presenter();
    assert!(state.output_visible);
    assert_eq!(state.extension.icon, StatusIcon::Active);
    assert_eq!(state.status.as_ref().map(|s| s.icon), Some(StatusIcon::Passing));
    assert_eq!(state.output.iter().collect::<Vec<_>>(), ["ok 1"]);
    assert_eq!(
        state.current_dialog().map(|d| d.message.as_str()),
        Some(PASSING_DIALOG_MESSAGE)
    );

    c.dispatch(Command::Deactivate).await;
    assert!(c.presenter().status.is_none());
    assert_eq!(c.presenter().extension.icon, StatusIcon::Inactive);
}

#[tokio::test]
async fn missing_custom_script_is_reported_by_name() {
    let dir = create_workspace("echo never\n");
    let settings = Settings {
        test_script: "customname".to_string(),
        ..sh_settings()
    };
    let mut c = controller(dir.path(), settings, RecordingPresenter::new());

    assert_eq!(c.run_now().await, RunStart::Aborted);
    assert!(!c.trigger().is_running());

    let prompts = c.presenter().prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].message.contains("customname"));
}

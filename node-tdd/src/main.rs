//! Node TDD - re-runs a project's npm test script whenever its sources change.
//!
//! # Commands
//!
//! - `node-tdd watch`: Watch the workspace and show results in a dashboard
//!   (`--headless` prints status lines instead)
//! - `node-tdd run`: Run the test script once and exit with its outcome
//! - `node-tdd config`: Print the effective settings as JSON
//!
//! # Environment Variables
//!
//! See the [`node_tdd::config`] module for the `NODE_TDD_*` overrides.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::KeyEvent;
use directories::ProjectDirs;
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use node_tdd::config::{Config, ConfigSource, SettingsOverrides};
use node_tdd::controller::{Controller, Flow};
use node_tdd::error::TuiError;
use node_tdd::presenter::{ErrorPrompt, HeadlessPresenter, StatusPresenter};
use node_tdd::trigger::{BuildOutcome, BuildTrigger, RunStart};
use node_tdd::tui::{
    apply_key_action, install_panic_hook, map_key, ui, DashboardState, EventHandler, KeyAction,
    Symbols, Theme, Tui, TuiEvent,
};

/// Name of the log file written in dashboard mode.
const LOG_FILE: &str = "node-tdd.log";

/// Exit code of `run` when the build was interrupted.
const EXIT_STOPPED: u8 = 130;

/// Exit code of `run` when the build could not start.
const EXIT_ABORTED: u8 = 2;

/// Capacity of the terminal event channel.
const TUI_EVENT_BUFFER: usize = 100;

/// Node TDD - re-runs a project's npm test script whenever its sources change.
#[derive(Parser, Debug)]
#[command(name = "node-tdd")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
KEYS (dashboard):
    r  run now          s  stop build       o  toggle output
    a  activate         d  deactivate       p  open package.json
    R  reload settings  q  quit             Enter/Esc  dialog action/dismiss

ENVIRONMENT VARIABLES:
    NODE_TDD_TEST_SCRIPT        package.json script to run (default: test)
    NODE_TDD_GLOB               Files that trigger a run
    NODE_TDD_PACKAGE_MANAGER    Program used to run scripts (default: npm)
    NODE_TDD_DEBOUNCE_MS        Quiet period before a run (default: 400)
    NODE_TDD_SHOW_COVERAGE      Scrape a coverage percentage (true/false)
    RUST_LOG                    Log filter (default: info)

EXAMPLES:
    # Watch the current project
    node-tdd

    # Run a different script once, with coverage
    node-tdd --script test:unit --coverage run
")]
struct Cli {
    /// Workspace root containing package.json.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// package.json script to run.
    #[arg(long, global = true)]
    script: Option<String>,

    /// Glob of workspace-relative paths that trigger a run.
    #[arg(long, global = true)]
    glob: Option<String>,

    /// Reporter used to parse test counts (e.g. "tap").
    #[arg(long, global = true)]
    reporter: Option<String>,

    /// Program used to run scripts (npm, pnpm, yarn, ...).
    #[arg(long, global = true)]
    package_manager: Option<String>,

    /// Show the coverage percentage scraped from the output.
    #[arg(long, global = true)]
    coverage: bool,

    /// Icons only in the status bar.
    #[arg(long, global = true)]
    minimal: bool,

    /// Show a dialog after every build.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, Copy)]
enum CliCommand {
    /// Watch the workspace and re-run tests on change (default).
    Watch {
        /// Print status lines instead of opening the dashboard.
        #[arg(long)]
        headless: bool,
    },

    /// Run the tests once.
    ///
    /// Exits with 0 when the build passed, 1 when it failed, 130 when it was
    /// interrupted and 2 when it could not start.
    Run {
        /// Print the outcome as JSON after the run.
        #[arg(long)]
        json: bool,
    },

    /// Print the effective settings as JSON.
    Config,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            test_script: self.script.clone(),
            glob: self.glob.clone(),
            reporter: self.reporter.clone(),
            package_manager: self.package_manager.clone(),
            show_coverage: self.coverage,
            minimal: self.minimal,
            verbose: self.verbose,
        }
    }
}

/// Where log lines go.
enum LogTarget {
    Stderr,
    /// JSON lines in a file, so the dashboard screen stays clean.
    File(PathBuf),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(CliCommand::Watch { headless: false });

    let log_target = match command {
        CliCommand::Watch { headless: false } => LogTarget::File(log_file_path()),
        _ => LogTarget::Stderr,
    };
    init_logging(&log_target)?;

    let root = std::fs::canonicalize(&cli.root)
        .with_context(|| format!("Workspace root {} does not exist", cli.root.display()))?;
    let source = ConfigSource::new(&root).with_overrides(cli.overrides());
    let config = source.load().context("Failed to load settings")?;

    info!(
        root = %config.workspace_root.display(),
        script = %config.settings.test_script,
        glob = %config.settings.glob,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match command {
        CliCommand::Watch { headless: true } => {
            runtime.block_on(watch_headless(config, source))?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Watch { headless: false } => {
            runtime.block_on(watch_dashboard(config, source))?;
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Run { json } => runtime.block_on(run_once(config, json)),
        CliCommand::Config => {
            let json = serde_json::to_string_pretty(&config.settings)
                .context("Failed to serialize settings")?;
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs the test script once, forwarding Ctrl+C as a stop request.
async fn run_once(config: Config, json: bool) -> Result<ExitCode> {
    let presenter = HeadlessPresenter::new(io::stdout(), true);
    let mut trigger = BuildTrigger::new(config.workspace_root, config.settings, presenter);

    if trigger.run().await != RunStart::Started {
        return Ok(ExitCode::from(EXIT_ABORTED));
    }

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut stopping = false;

    let outcome = loop {
        let event = tokio::select! {
            _ = &mut shutdown, if !stopping => {
                info!("Interrupted, stopping the build");
                stopping = true;
                trigger.stop();
                continue;
            }
            event = trigger.next_event() => event,
        };

        if let Some(outcome) = trigger.handle(event).await {
            break outcome;
        }
    };

    if json {
        let json = serde_json::to_string(&outcome).context("Failed to serialize outcome")?;
        println!("{json}");
    }

    Ok(match outcome {
        BuildOutcome::Passed(_) => ExitCode::SUCCESS,
        BuildOutcome::Failed(_) => ExitCode::FAILURE,
        BuildOutcome::Stopped => ExitCode::from(EXIT_STOPPED),
    })
}

/// Watches with line output until Ctrl+C or SIGTERM.
///
/// TDD mode is always activated here; there is no way to toggle it later.
async fn watch_headless(config: Config, source: ConfigSource) -> Result<()> {
    let presenter = HeadlessPresenter::new(io::stdout(), true);
    let mut controller = Controller::new(config, source, presenter);
    controller.activate().await;

    info!("Watching. Press Ctrl+C to stop.");

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            event = controller.next_event() => event,
        };
        controller.handle(event).await;
    }

    controller.shutdown();
    info!("Stopped");
    Ok(())
}

/// What woke the dashboard loop.
enum Wake {
    Signal,
    Terminal(Option<TuiEvent>),
    Trigger(node_tdd::trigger::TriggerEvent),
}

/// The terminal input task. Stopped while an editor owns the terminal.
struct InputPump {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl InputPump {
    fn spawn(event_tx: mpsc::Sender<TuiEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(EventHandler::new(event_tx, shutdown_rx).run());
        Self { shutdown_tx, task }
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        match self.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Terminal event handler failed"),
            Err(e) => warn!(error = %e, "Terminal event handler panicked"),
        }
    }
}

/// Runs the dashboard until the user quits or a signal arrives.
async fn watch_dashboard(config: Config, source: ConfigSource) -> Result<()> {
    let root_label = config.workspace_root.display().to_string();
    let mut controller = Controller::new(config, source, DashboardState::new(root_label));

    install_panic_hook();
    let mut tui = Tui::new()
        .map_err(TuiError::TerminalInit)
        .context("Failed to set up the terminal")?;
    let theme = Theme::from_env();
    let symbols = Symbols::detect();

    let (event_tx, mut event_rx) = mpsc::channel(TUI_EVENT_BUFFER);
    let mut input = InputPump::spawn(event_tx.clone());

    controller.start().await;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tui.draw(|frame| ui::render(frame, controller.presenter(), &theme, &symbols))
            .map_err(TuiError::Render)?;

        let wake = tokio::select! {
            _ = &mut shutdown => Wake::Signal,
            event = event_rx.recv() => Wake::Terminal(event),
            event = controller.next_event() => Wake::Trigger(event),
        };

        let flow = match wake {
            Wake::Signal | Wake::Terminal(None) => Flow::Quit,
            Wake::Terminal(Some(TuiEvent::Key(key))) => handle_key(&mut controller, key).await,
            Wake::Terminal(Some(TuiEvent::Tick | TuiEvent::Resize(..))) => Flow::Continue,
            Wake::Trigger(event) => {
                controller.handle(event).await;
                Flow::Continue
            }
        };

        match flow {
            Flow::Continue => {}
            Flow::Quit => break,
            Flow::OpenFile(path) => {
                input.stop().await;
                if let Err(e) = open_in_editor(&mut tui, &path).await {
                    warn!(error = %e, "Failed to open editor");
                    controller.presenter_mut().prompt(ErrorPrompt::new(&e, None));
                }
                input = InputPump::spawn(event_tx.clone());
            }
        }
    }

    controller.shutdown();
    input.stop().await;
    tui.restore().map_err(TuiError::TerminalInit)?;
    info!("Dashboard closed");
    Ok(())
}

/// Routes a key press to the dashboard or the controller.
async fn handle_key(controller: &mut Controller<DashboardState>, key: KeyEvent) -> Flow {
    let dialog_open = controller.presenter().current_dialog().is_some();
    match map_key(key, dialog_open) {
        None => Flow::Continue,
        Some(KeyAction::Command(command)) => controller.dispatch(command).await,
        Some(action) => match apply_key_action(controller.presenter_mut(), action) {
            Some(prompt_action) => controller.accept(prompt_action).await,
            None => Flow::Continue,
        },
    }
}

/// Opens `path` in `$VISUAL` / `$EDITOR`, handing the terminal over while it
/// runs.
async fn open_in_editor(tui: &mut Tui, path: &Path) -> Result<(), TuiError> {
    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string());

    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or(default_editor());
    let args: Vec<&str> = parts.collect();

    tui.suspend().map_err(TuiError::TerminalInit)?;
    info!(editor = %editor, path = %path.display(), "Opening editor");

    let status = tokio::process::Command::new(program)
        .args(&args)
        .arg(path)
        .status()
        .await;

    tui.resume().map_err(TuiError::TerminalInit)?;

    match status {
        Ok(status) if !status.success() => {
            warn!(editor = %editor, %status, "Editor exited with an error");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(source) => Err(TuiError::Editor { editor, source }),
    }
}

fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

/// Log file location for dashboard mode: the user cache directory, or the
/// temp directory when there is none.
fn log_file_path() -> PathBuf {
    ProjectDirs::from("", "", "node-tdd")
        .map(|dirs| dirs.cache_dir().join(LOG_FILE))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE))
}

/// Initializes the logging subsystem.
fn init_logging(target: &LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_writer(io::stderr)
                .init();
        }
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            let json_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_writer(Mutex::new(file));

            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .init();
        }
    }
    Ok(())
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

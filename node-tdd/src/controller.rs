//! Activation state and command dispatch.
//!
//! The [`Controller`] is constructed once by the binary and owns the
//! [`BuildTrigger`]. It tracks whether TDD mode is active and whether the
//! output panel is shown, and turns user [`Command`]s into trigger calls.
//!
//! Commands that need the host (quitting, launching an editor) come back to
//! the caller as a [`Flow`] value instead of being performed here.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{Config, ConfigSource};
use crate::manifest::manifest_path;
use crate::presenter::{ErrorPrompt, PromptAction, StatusPresenter};
use crate::trigger::{BuildOutcome, BuildTrigger, RunStart, TriggerEvent};

/// User-facing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Activate,
    Deactivate,
    ToggleOutput,
    StopBuild,
    RunNow,
    OpenManifest,
    ReloadConfig,
    Quit,
}

/// What the host should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Open this file in an editor.
    OpenFile(PathBuf),
    Quit,
}

/// Owns the build trigger and the activation state.
pub struct Controller<P: StatusPresenter> {
    source: ConfigSource,
    trigger: BuildTrigger<P>,
    enabled: bool,
    output_visible: bool,
}

impl<P: StatusPresenter> Controller<P> {
    /// Creates an inactive controller. Call [`Controller::start`] next.
    pub fn new(config: Config, source: ConfigSource, presenter: P) -> Self {
        Self {
            source,
            trigger: BuildTrigger::new(config.workspace_root, config.settings, presenter),
            enabled: false,
            output_visible: false,
        }
    }

    /// Applies `activateOnStartup`.
    pub async fn start(&mut self) {
        if self.trigger.settings().activate_on_startup {
            self.activate().await;
        } else {
            self.trigger.presenter_mut().set_extension_status(false);
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn output_visible(&self) -> bool {
        self.output_visible
    }

    #[must_use]
    pub fn trigger(&self) -> &BuildTrigger<P> {
        &self.trigger
    }

    pub fn trigger_mut(&mut self) -> &mut BuildTrigger<P> {
        &mut self.trigger
    }

    #[must_use]
    pub fn presenter(&self) -> &P {
        self.trigger.presenter()
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        self.trigger.presenter_mut()
    }

    /// Turns TDD mode on and starts watching. No-op when already active.
    pub async fn activate(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.trigger.presenter_mut().set_extension_status(true);
        info!(root = %self.trigger.root().display(), "TDD mode activated");

        if let Err(e) = self.trigger.watch().await {
            warn!(error = %e, "Failed to start watching");
            self.trigger
                .presenter_mut()
                .prompt(ErrorPrompt::new(&e, Some(PromptAction::Deactivate)));
        }
    }

    /// Turns TDD mode off: stops any run, drops the watch and hides the build
    /// status. No-op when already inactive.
    pub fn deactivate(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.trigger.dispose();

        let presenter = self.trigger.presenter_mut();
        presenter.hide_status();
        presenter.set_extension_status(false);
        info!("TDD mode deactivated");
    }

    pub fn toggle_output(&mut self) {
        self.set_output_visible(!self.output_visible);
    }

    pub fn set_output_visible(&mut self, visible: bool) {
        self.output_visible = visible;
        self.trigger.presenter_mut().set_output_visible(visible);
    }

    pub fn stop_build(&mut self) {
        self.trigger.stop();
    }

    /// Starts a run right away, whether or not TDD mode is active.
    pub async fn run_now(&mut self) -> RunStart {
        self.trigger.run().await
    }

    /// Re-reads every settings layer and applies the result.
    ///
    /// On error the previous settings stay in effect and a prompt is shown.
    pub fn reload(&mut self) {
        match self.source.load() {
            Ok(config) => {
                info!("Reloaded settings");
                if let Err(e) = self.trigger.reconfigure(config.settings) {
                    warn!(error = %e, "Failed to re-establish watch");
                    self.trigger
                        .presenter_mut()
                        .prompt(ErrorPrompt::new(&e, Some(PromptAction::Deactivate)));
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload settings");
                self.trigger.presenter_mut().prompt(ErrorPrompt::new(&e, None));
            }
        }
    }

    /// Executes a command.
    pub async fn dispatch(&mut self, command: Command) -> Flow {
        match command {
            Command::Activate => self.activate().await,
            Command::Deactivate => self.deactivate(),
            Command::ToggleOutput => self.toggle_output(),
            Command::StopBuild => self.stop_build(),
            Command::RunNow => {
                self.run_now().await;
            }
            Command::OpenManifest => {
                return Flow::OpenFile(manifest_path(self.trigger.root()));
            }
            Command::ReloadConfig => self.reload(),
            Command::Quit => {
                self.shutdown();
                return Flow::Quit;
            }
        }
        Flow::Continue
    }

    /// Executes the action offered by a dialog.
    pub async fn accept(&mut self, action: PromptAction) -> Flow {
        match action {
            PromptAction::ShowOutput => {
                self.set_output_visible(true);
                Flow::Continue
            }
            PromptAction::OpenManifest => self.dispatch(Command::OpenManifest).await,
            PromptAction::Deactivate => self.dispatch(Command::Deactivate).await,
        }
    }

    /// See [`BuildTrigger::next_event`].
    pub async fn next_event(&mut self) -> TriggerEvent {
        self.trigger.next_event().await
    }

    /// See [`BuildTrigger::handle`].
    ///
    /// A run stopped by deactivation keeps the build status hidden.
    pub async fn handle(&mut self, event: TriggerEvent) -> Option<BuildOutcome> {
        let outcome = self.trigger.handle(event).await;
        if outcome == Some(BuildOutcome::Stopped) && !self.enabled {
            self.trigger.presenter_mut().hide_status();
        }
        outcome
    }

    /// Stops any run and releases the watch.
    pub fn shutdown(&mut self) {
        self.trigger.dispose();
    }
}

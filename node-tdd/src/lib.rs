//! Node TDD - re-runs a project's npm test script whenever its sources change.
//!
//! Node TDD watches a JavaScript/TypeScript workspace, runs the configured
//! `package.json` script after a debounced burst of file changes and reports
//! the result as pass/fail status items, optional test counts and an optional
//! coverage figure.
//!
//! # Overview
//!
//! A [`controller::Controller`] owns a [`trigger::BuildTrigger`], which owns
//! at most one [`watcher::FileWatcher`] and at most one running
//! [`process::TestProcess`]. Everything the user sees goes through the
//! [`presenter::StatusPresenter`] trait; the terminal dashboard and the
//! headless line printer are its two implementations.
//!
//! # Modules
//!
//! - [`config`]: Layered settings (defaults, user file, workspace file, environment, CLI)
//! - [`controller`]: Activation state and command dispatch
//! - [`coverage`]: Coverage percentage scraping
//! - [`error`]: Crate-level error type
//! - [`manifest`]: `package.json` loading and script resolution
//! - [`presenter`]: Status items, dialogs and the presenter trait
//! - [`process`]: Test process spawning, streaming and termination
//! - [`report`]: Test reporter parsing (TAP)
//! - [`trigger`]: The build trigger state machine
//! - [`tui`]: Terminal dashboard
//! - [`utils`]: Shared utilities (debouncing)
//! - [`watcher`]: Glob-filtered file system watcher

pub mod config;
pub mod controller;
pub mod coverage;
pub mod error;
pub mod manifest;
pub mod presenter;
pub mod process;
pub mod report;
pub mod trigger;
pub mod tui;
pub mod utils;
pub mod watcher;

pub use config::{Config, ConfigError, ConfigSource, DialogPolicy, Settings, SettingsOverrides};
pub use controller::{Command, Controller, Flow};
pub use coverage::{parse_coverage, CoverageParser, CoverageValue, PercentAverage};
pub use error::{Result, TddError};
pub use manifest::{ManifestError, PackageManifest, TestInvocation};
pub use presenter::{HeadlessPresenter, StatusPresenter};
pub use process::{ProcessError, ProcessEvent, ProcessExit, TestProcess};
pub use report::{parse_report, ReportStats};
pub use trigger::{BuildOutcome, BuildTrigger, RunStart, RunSummary, TriggerEvent};
pub use utils::{Debouncer, DebouncerError};
pub use watcher::{FileEvent, FileEventKind, FileWatcher, WatcherError};

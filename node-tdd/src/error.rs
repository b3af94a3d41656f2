//! Error types for Node TDD.
//!
//! Each module owns a focused error enum; [`TddError`] gathers them for code
//! that spans several modules (the controller and the binary).

use thiserror::Error;

use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::process::ProcessError;
use crate::utils::debounce::DebouncerError;
use crate::watcher::WatcherError;

/// Errors that can occur while running Node TDD.
///
/// None of these are fatal for a long-lived watch session: the build trigger
/// reports them through the presenter and stays idle.
#[derive(Error, Debug)]
pub enum TddError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `package.json` is missing, unreadable or lacks the script.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// The test process could not be started or signalled.
    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    /// File watching error.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// The debouncer task went away.
    #[error("debounce error: {0}")]
    Debounce(#[from] DebouncerError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TUI-related error.
    #[error("TUI error: {0}")]
    Tui(#[from] TuiError),
}

/// Errors that can occur during TUI operation.
#[derive(Error, Debug)]
pub enum TuiError {
    /// Terminal initialization failed.
    #[error("failed to initialize terminal: {0}")]
    TerminalInit(#[source] std::io::Error),

    /// Terminal rendering failed.
    #[error("render error: {0}")]
    Render(#[source] std::io::Error),

    /// Event handling error.
    #[error("event error: {0}")]
    Event(String),

    /// The external editor could not be launched.
    #[error("failed to launch editor `{editor}`: {source}")]
    Editor {
        editor: String,
        #[source]
        source: std::io::Error,
    },
}

/// A specialized `Result` type for Node TDD operations.
pub type Result<T> = std::result::Result<T, TddError>;

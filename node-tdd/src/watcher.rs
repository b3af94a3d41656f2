//! File watcher for the project's source and test files.
//!
//! The whole workspace is watched recursively with [`notify`]; every event path
//! is made relative to the workspace root and matched against the configured
//! glob. Matching events are handed to a [`Debouncer`], which emits a single
//! [`FileEvent`] once the project has been quiet for the debounce interval.
//!
//! # Architecture
//!
//! The notify callback runs on notify's own thread, so it is kept lightweight:
//! it filters and classifies the event, then `try_send`s it into the
//! debouncer's input channel. The debouncer task (on the Tokio runtime) does the
//! waiting and forwards the trailing event to the build trigger.
//!
//! Dropping the [`FileWatcher`] drops the notify subscription and the debouncer
//! together, so no trigger can fire after the watch is torn down.
//!
//! # Example
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use node_tdd::config::Settings;
//! use node_tdd::watcher::FileWatcher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::channel(8);
//!     let watch = Settings::default().watch_configuration();
//!     let _watcher = FileWatcher::new(".", &watch, tx)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         println!("{:?} {}", event.kind, event.path.display());
//!     }
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use globset::GlobMatcher;
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigError, WatchConfiguration};
use crate::utils::debounce::Debouncer;

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// The file was created. Only delivered when `buildOnCreate` is on.
    Created,
    /// The file's contents changed.
    Changed,
    /// The file was removed. Only delivered when `buildOnDelete` is on.
    Removed,
}

/// A file event that passed the glob and the create/delete gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    /// What happened.
    pub kind: FileEventKind,
    /// Path relative to the workspace root.
    pub path: PathBuf,
}

/// Errors that can occur during file watching operations.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The workspace root does not exist or is inaccessible.
    #[error("watch directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The watch glob does not compile.
    #[error("invalid watch glob: {0}")]
    InvalidGlob(#[from] ConfigError),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Decides which raw paths become [`FileEvent`]s.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    root: PathBuf,
    matcher: GlobMatcher,
    trigger_on_create: bool,
    trigger_on_delete: bool,
}

impl WatchFilter {
    /// Builds a filter for a workspace root and watch configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidGlob`] when the glob does not compile.
    pub fn new(root: impl Into<PathBuf>, config: &WatchConfiguration) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            matcher: config.matcher()?,
            trigger_on_create: config.trigger_on_create,
            trigger_on_delete: config.trigger_on_delete,
        })
    }

    /// Returns the event for `path`, or `None` if it is filtered out.
    #[must_use]
    pub fn accept(&self, kind: FileEventKind, path: &Path) -> Option<FileEvent> {
        let enabled = match kind {
            FileEventKind::Created => self.trigger_on_create,
            FileEventKind::Changed => true,
            FileEventKind::Removed => self.trigger_on_delete,
        };
        if !enabled {
            return None;
        }

        let relative = path.strip_prefix(&self.root).ok()?;
        if !self.matcher.is_match(relative) {
            return None;
        }

        Some(FileEvent {
            kind,
            path: relative.to_path_buf(),
        })
    }
}

/// Maps a notify event kind onto the three kinds the trigger cares about.
///
/// Renames count as a change of the destination so atomic "write temp file,
/// rename over" saves are picked up.
#[must_use]
pub fn classify(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => {
            Some(FileEventKind::Created)
        }
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEventKind::Changed),
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => {
            Some(FileEventKind::Removed)
        }
        _ => None,
    }
}

/// An active, debounced watch over the workspace.
#[derive(Debug)]
pub struct FileWatcher {
    /// Kept alive to maintain the watch subscription.
    _watcher: RecommendedWatcher,
    /// Kept alive to keep the debounce task running.
    _debouncer: Debouncer<FileEvent>,
    root: PathBuf,
}

impl FileWatcher {
    /// Starts watching `root` with the given configuration.
    ///
    /// Debounced events are sent to `trigger_tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist, the glob is invalid, or
    /// the file system watcher cannot be initialized.
    pub fn new(
        root: impl AsRef<Path>,
        config: &WatchConfiguration,
        trigger_tx: mpsc::Sender<FileEvent>,
    ) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|_| WatcherError::DirectoryNotFound(root.to_path_buf()))?;

        let filter = WatchFilter::new(root.clone(), config)?;
        let debouncer = Debouncer::new(config.debounce, trigger_tx);
        let internal_tx = debouncer.sender();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &filter, &internal_tx);
            },
            Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(
            root = %root.display(),
            glob = %config.glob,
            debounce_ms = config.debounce.as_millis(),
            "Started file watch"
        );

        Ok(Self {
            _watcher: watcher,
            _debouncer: debouncer,
            root,
        })
    }

    /// Returns the (canonical) directory being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        debug!(root = %self.root.display(), "Stopped file watch");
    }
}

/// Handles events from the notify crate.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    filter: &WatchFilter,
    internal_tx: &mpsc::Sender<FileEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    let Some(kind) = classify(&event.kind) else {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    };

    for path in &event.paths {
        let Some(file_event) = filter.accept(kind, path) else {
            continue;
        };

        debug!(kind = ?file_event.kind, path = %file_event.path.display(), "Watched file event");

        // Never block the notify thread; a full channel only loses events that
        // the pending trigger already covers.
        if let Err(e) = internal_tx.try_send(file_event) {
            warn!(error = %e, "Failed to queue file event");
        }
    }
}

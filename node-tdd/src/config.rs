//! Configuration for Node TDD.
//!
//! Settings are assembled from several layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. User settings: `<config dir>/node-tdd/settings.json`
//! 3. Workspace settings: `<workspace>/.node-tdd.json`
//! 4. Environment variables (`NODE_TDD_*`)
//! 5. Command line flags ([`SettingsOverrides`])
//!
//! Settings files use the same camelCase keys as the editor extension this
//! tool grew out of, so an existing `nodeTdd` settings block can be pasted in
//! as is. Unknown keys are ignored.
//!
//! # Settings
//!
//! | Key | Environment variable | Default |
//! |-----|----------------------|---------|
//! | `activateOnStartup` | `NODE_TDD_ACTIVATE_ON_STARTUP` | `true` |
//! | `testScript` | `NODE_TDD_TEST_SCRIPT` | `"test"` |
//! | `glob` | `NODE_TDD_GLOB` | `"{test,src}/**/*.{js,ts,jsx,tsx}"` |
//! | `reporter` | `NODE_TDD_REPORTER` | `null` |
//! | `verbose` | `NODE_TDD_VERBOSE` | `false` |
//! | `dialog` | `NODE_TDD_DIALOG` | derived from `verbose` |
//! | `minimal` | `NODE_TDD_MINIMAL` | `false` |
//! | `buildOnActivation` | `NODE_TDD_BUILD_ON_ACTIVATION` | `false` |
//! | `buildOnCreate` | `NODE_TDD_BUILD_ON_CREATE` | `false` |
//! | `buildOnDelete` | `NODE_TDD_BUILD_ON_DELETE` | `false` |
//! | `showCoverage` | `NODE_TDD_SHOW_COVERAGE` | `false` |
//! | `coverageThreshold` | `NODE_TDD_COVERAGE_THRESHOLD` | `null` |
//! | `packageManager` | `NODE_TDD_PACKAGE_MANAGER` | `"npm"` |
//! | `debounceMs` | `NODE_TDD_DEBOUNCE_MS` | `400` |
//! | `animationIntervalMs` | `NODE_TDD_ANIMATION_INTERVAL_MS` | `300` |
//!
//! # Example
//!
//! ```no_run
//! use node_tdd::config::ConfigSource;
//!
//! let config = ConfigSource::new(".").load().expect("Failed to load configuration");
//! println!("Running `{}` on change", config.settings.test_script);
//! ```

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Default glob for files that trigger a run.
pub const DEFAULT_GLOB: &str = "{test,src}/**/*.{js,ts,jsx,tsx}";

/// Default trailing-edge debounce for file events.
pub const DEFAULT_DEBOUNCE_MS: u64 = 400;

/// Default interval between building animation frames.
pub const DEFAULT_ANIMATION_INTERVAL_MS: u64 = 300;

/// Default package manager used to run scripts.
const DEFAULT_PACKAGE_MANAGER: &str = "npm";

/// Name of the workspace settings file.
pub const WORKSPACE_SETTINGS_FILE: &str = ".node-tdd.json";

/// Name of the user settings file inside the config directory.
const USER_SETTINGS_FILE: &str = "settings.json";

/// Prefix of all environment variable overrides.
const ENV_PREFIX: &str = "NODE_TDD_";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A setting has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// A settings file exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A settings file is not valid JSON or has values of the wrong type.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// When a dialog is shown after a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogPolicy {
    /// Notify about every outcome.
    Always,
    /// Never notify.
    Never,
    /// Only notify when the build failed.
    #[serde(alias = "onFailure", alias = "on-failure")]
    Failure,
}

impl FromStr for DialogPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "failure" | "onfailure" | "on-failure" => Ok(Self::Failure),
            other => Err(format!("expected always, never or failure, got '{other}'")),
        }
    }
}

impl fmt::Display for DialogPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// User-facing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Start watching as soon as the tool launches.
    pub activate_on_startup: bool,
    /// npm script to run.
    pub test_script: String,
    /// Files (relative to the workspace root) whose changes trigger a run.
    pub glob: String,
    /// Structured reporter whose output is parsed for pass/total counts.
    pub reporter: Option<String>,
    /// Show a dialog after every run (see [`Settings::dialog_policy`]).
    pub verbose: bool,
    /// Explicit dialog policy, overriding `verbose`.
    pub dialog: Option<DialogPolicy>,
    /// Compact status text.
    pub minimal: bool,
    /// Run once immediately on activation.
    pub build_on_activation: bool,
    /// Also trigger on file creation.
    pub build_on_create: bool,
    /// Also trigger on file deletion.
    pub build_on_delete: bool,
    /// Scrape coverage from the output and show it.
    pub show_coverage: bool,
    /// Coverage at or above this value is shown as passing.
    pub coverage_threshold: Option<f64>,
    /// Package manager executable.
    pub package_manager: String,
    /// Trailing-edge debounce for file events, in milliseconds.
    pub debounce_ms: u64,
    /// Building animation frame interval, in milliseconds.
    pub animation_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            activate_on_startup: true,
            test_script: crate::manifest::DEFAULT_SCRIPT.to_string(),
            glob: DEFAULT_GLOB.to_string(),
            reporter: None,
            verbose: false,
            dialog: None,
            minimal: false,
            build_on_activation: false,
            build_on_create: false,
            build_on_delete: false,
            show_coverage: false,
            coverage_threshold: None,
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            animation_interval_ms: DEFAULT_ANIMATION_INTERVAL_MS,
        }
    }
}

impl Settings {
    /// Effective dialog policy: the explicit `dialog` setting, otherwise
    /// `always` when `verbose` is on and `never` when it is off.
    #[must_use]
    pub fn dialog_policy(&self) -> DialogPolicy {
        match (self.dialog, self.verbose) {
            (Some(policy), _) => policy,
            (None, true) => DialogPolicy::Always,
            (None, false) => DialogPolicy::Never,
        }
    }

    /// Interval between building animation frames.
    #[must_use]
    pub fn animation_interval(&self) -> Duration {
        Duration::from_millis(self.animation_interval_ms)
    }

    /// Snapshot of the settings that shape the file watch.
    #[must_use]
    pub fn watch_configuration(&self) -> WatchConfiguration {
        WatchConfiguration {
            glob: self.glob.clone(),
            trigger_on_create: self.build_on_create,
            trigger_on_delete: self.build_on_delete,
            debounce: Duration::from_millis(self.debounce_ms),
            run_on_activation: self.build_on_activation,
        }
    }

    /// Checks values that deserialization alone cannot rule out.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an uncompilable glob, an empty
    /// script or package manager, a zero animation interval, or a coverage
    /// threshold outside `0..=100`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.test_script.trim().is_empty() {
            return Err(invalid("testScript", "script name cannot be empty"));
        }

        if self.package_manager.trim().is_empty() {
            return Err(invalid("packageManager", "package manager cannot be empty"));
        }

        Glob::new(&self.glob).map_err(|e| invalid("glob", e.to_string()))?;

        if self.animation_interval_ms == 0 {
            return Err(invalid(
                "animationIntervalMs",
                "animation interval must be at least 1 millisecond",
            ));
        }

        if let Some(threshold) = self.coverage_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(invalid(
                    "coverageThreshold",
                    format!("threshold must be between 0 and 100, got {threshold}"),
                ));
            }
        }

        Ok(())
    }

    /// Applies `NODE_TDD_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable cannot be parsed.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        env_override("ACTIVATE_ON_STARTUP", &mut self.activate_on_startup, parse_bool)?;
        env_override("TEST_SCRIPT", &mut self.test_script, parse_string)?;
        env_override("GLOB", &mut self.glob, parse_string)?;
        env_override("REPORTER", &mut self.reporter, parse_optional_string)?;
        env_override("VERBOSE", &mut self.verbose, parse_bool)?;
        env_override("DIALOG", &mut self.dialog, |v| v.parse().map(Some))?;
        env_override("MINIMAL", &mut self.minimal, parse_bool)?;
        env_override("BUILD_ON_ACTIVATION", &mut self.build_on_activation, parse_bool)?;
        env_override("BUILD_ON_CREATE", &mut self.build_on_create, parse_bool)?;
        env_override("BUILD_ON_DELETE", &mut self.build_on_delete, parse_bool)?;
        env_override("SHOW_COVERAGE", &mut self.show_coverage, parse_bool)?;
        env_override("COVERAGE_THRESHOLD", &mut self.coverage_threshold, |v| {
            if v.trim().is_empty() {
                Ok(None)
            } else {
                parse_number(v).map(Some)
            }
        })?;
        env_override("PACKAGE_MANAGER", &mut self.package_manager, parse_string)?;
        env_override("DEBOUNCE_MS", &mut self.debounce_ms, parse_number)?;
        env_override("ANIMATION_INTERVAL_MS", &mut self.animation_interval_ms, parse_number)?;
        Ok(())
    }
}

/// Settings that shape the file watch.
///
/// This is an immutable snapshot: changing any of it means tearing down the
/// watch and establishing a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfiguration {
    /// Glob relative to the workspace root.
    pub glob: String,
    /// Deliver file creation events.
    pub trigger_on_create: bool,
    /// Deliver file deletion events.
    pub trigger_on_delete: bool,
    /// Quiet period before a burst of events fires a run.
    pub debounce: Duration,
    /// Fire a run as soon as the watch is established.
    pub run_on_activation: bool,
}

impl WatchConfiguration {
    /// Compiles the glob into a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the glob does not compile.
    pub fn matcher(&self) -> Result<GlobMatcher, ConfigError> {
        Glob::new(&self.glob)
            .map(|glob| glob.compile_matcher())
            .map_err(|e| invalid("glob", e.to_string()))
    }
}

/// Command line overrides, applied after every other layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsOverrides {
    pub test_script: Option<String>,
    pub glob: Option<String>,
    pub reporter: Option<String>,
    pub package_manager: Option<String>,
    pub show_coverage: bool,
    pub minimal: bool,
    pub verbose: bool,
}

impl SettingsOverrides {
    /// Applies the overrides on top of already loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(script) = &self.test_script {
            settings.test_script.clone_from(script);
        }
        if let Some(glob) = &self.glob {
            settings.glob.clone_from(glob);
        }
        if let Some(reporter) = &self.reporter {
            settings.reporter = Some(reporter.clone());
        }
        if let Some(pm) = &self.package_manager {
            settings.package_manager.clone_from(pm);
        }
        settings.show_coverage |= self.show_coverage;
        settings.minimal |= self.minimal;
        settings.verbose |= self.verbose;
    }
}

/// Loaded configuration: the workspace plus its effective settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Workspace root; `package.json` and the watched files live below it.
    pub workspace_root: PathBuf,
    /// Effective settings after all layers.
    pub settings: Settings,
}

/// Where configuration comes from, kept around so it can be re-read.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    workspace_root: PathBuf,
    user_settings: Option<PathBuf>,
    overrides: SettingsOverrides,
}

impl ConfigSource {
    /// Creates a source for a workspace, using the platform user settings file.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            user_settings: user_settings_path(),
            overrides: SettingsOverrides::default(),
        }
    }

    /// Replaces the user settings file (or disables it with `None`).
    #[must_use]
    pub fn with_user_settings(mut self, path: Option<PathBuf>) -> Self {
        self.user_settings = path;
        self
    }

    /// Sets command line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// The workspace root this source loads for.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Reads every layer and returns the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a settings file is unreadable or malformed,
    /// an environment variable cannot be parsed, or the result fails
    /// [`Settings::validate`].
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut merged = serde_json::to_value(Settings::default()).map_err(|source| {
            ConfigError::Parse {
                path: PathBuf::from("<defaults>"),
                source,
            }
        })?;

        let workspace_file = self.workspace_root.join(WORKSPACE_SETTINGS_FILE);
        for path in self.user_settings.iter().chain(std::iter::once(&workspace_file)) {
            if let Some(layer) = read_settings_file(path)? {
                debug!(path = %path.display(), "Applying settings file");
                merge_objects(&mut merged, layer);
            }
        }

        let mut settings: Settings =
            serde_json::from_value(merged).map_err(|source| ConfigError::Parse {
                path: workspace_file.clone(),
                source,
            })?;

        settings.apply_env()?;
        self.overrides.apply(&mut settings);
        settings.validate()?;

        Ok(Config {
            workspace_root: self.workspace_root.clone(),
            settings,
        })
    }
}

/// Path of the user-level settings file, if a config directory exists.
#[must_use]
pub fn user_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "node-tdd").map(|dirs| dirs.config_dir().join(USER_SETTINGS_FILE))
}

/// Reads one settings file; a missing file is simply an absent layer.
fn read_settings_file(path: &Path) -> Result<Option<Map<String, Value>>, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str::<Map<String, Value>>(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Shallow merge: keys present in `layer` replace those in `base`.
fn merge_objects(base: &mut Value, layer: Map<String, Value>) {
    if let Value::Object(base) = base {
        base.extend(layer);
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Overrides `target` from `NODE_TDD_<suffix>` when the variable is set.
fn env_override<T>(
    suffix: &str,
    target: &mut T,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> Result<(), ConfigError> {
    let key = format!("{ENV_PREFIX}{suffix}");
    if let Ok(value) = env::var(&key) {
        *target = parse(&value).map_err(|message| ConfigError::InvalidValue { key, message })?;
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected boolean, got '{other}'")),
    }
}

fn parse_string(value: &str) -> Result<String, String> {
    Ok(value.to_string())
}

fn parse_optional_string(value: &str) -> Result<Option<String>, String> {
    let trimmed = value.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn parse_number<N: FromStr>(value: &str) -> Result<N, String> {
    value
        .trim()
        .parse::<N>()
        .map_err(|_| format!("expected non-negative number, got '{value}'"))
}

//! Package manifest lookup and test invocation.
//!
//! Before every run the workspace's `package.json` is read and checked for the
//! configured script. The result of that check is a [`TestInvocation`], the
//! exact argument vector handed to the package manager:
//!
//! | Script name | Invocation |
//! |-------------|------------|
//! | `test` | `npm test` |
//! | anything else | `npm run <name>` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// File name of the package manifest at the workspace root.
pub const MANIFEST_FILE: &str = "package.json";

/// Script name that maps to the package manager's bare `test` command.
pub const DEFAULT_SCRIPT: &str = "test";

/// Errors that prevent a run from starting.
///
/// These are environment problems the user can fix; the build trigger turns
/// each into a prompt and stays idle.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// There is no `package.json` at the workspace root.
    #[error("no package.json found in {}", .0.display())]
    NotFound(PathBuf),

    /// `package.json` exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `package.json` is not valid JSON.
    #[error("failed to parse {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configured script is not declared in `scripts`.
    #[error("{package_manager} script `{script}` was not found")]
    ScriptNotFound {
        package_manager: String,
        script: String,
    },
}

impl ManifestError {
    /// Returns `true` when the manifest itself is missing.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The parts of `package.json` this tool cares about.
///
/// Only the top level has to be an object. Fields of an unexpected type are
/// treated as absent, so unrelated oddities never block a run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    /// Package name, used in log lines only.
    #[serde(default, deserialize_with = "string_or_none")]
    pub name: Option<String>,

    /// Declared npm scripts, values as written.
    #[serde(default, deserialize_with = "object_or_empty")]
    pub scripts: Map<String, Value>,
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(name) => Some(name),
        _ => None,
    })
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

impl PackageManifest {
    /// Parses a manifest from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the text is not a valid object.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reads and parses `<root>/package.json`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotFound`], [`ManifestError::Unreadable`] or
    /// [`ManifestError::Invalid`].
    pub async fn load(root: &Path) -> Result<Self, ManifestError> {
        let path = manifest_path(root);

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(root.to_path_buf()));
            }
            Err(source) => return Err(ManifestError::Unreadable { path, source }),
        };

        let manifest =
            Self::from_json(&text).map_err(|source| ManifestError::Invalid { path, source })?;

        debug!(
            name = manifest.name.as_deref().unwrap_or("<unnamed>"),
            scripts = manifest.scripts.len(),
            "Loaded package manifest"
        );

        Ok(manifest)
    }

    /// Returns `true` when the manifest declares a non-empty script of that name.
    #[must_use]
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts
            .get(script)
            .and_then(Value::as_str)
            .is_some_and(|command| !command.trim().is_empty())
    }
}

/// Returns the path of the manifest for a workspace root.
#[must_use]
pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

/// A resolved package-manager command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInvocation {
    program: String,
    args: Vec<String>,
    script: String,
}

impl TestInvocation {
    /// Builds the invocation for a script name.
    ///
    /// The name is trimmed; exactly `test` uses the bare `test` sub-command,
    /// anything else goes through `run`.
    #[must_use]
    pub fn new(package_manager: &str, script: &str) -> Self {
        let script = script.trim().to_string();
        let args = if script == DEFAULT_SCRIPT {
            vec![DEFAULT_SCRIPT.to_string()]
        } else {
            vec!["run".to_string(), script.clone()]
        };

        Self {
            program: package_manager.to_string(),
            args,
            script,
        }
    }

    /// Validates the script against a manifest and builds the invocation.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::ScriptNotFound`] when the manifest does not
    /// declare the script.
    pub fn resolve(
        manifest: &PackageManifest,
        package_manager: &str,
        script: &str,
    ) -> Result<Self, ManifestError> {
        let invocation = Self::new(package_manager, script);
        if manifest.has_script(&invocation.script) {
            Ok(invocation)
        } else {
            Err(ManifestError::ScriptNotFound {
                package_manager: package_manager.to_string(),
                script: invocation.script,
            })
        }
    }

    /// The program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The (trimmed) script name.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Human-readable command line, e.g. `npm run unit`.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(json: &str) -> PackageManifest {
        PackageManifest::from_json(json).expect("valid manifest")
    }

    #[test]
    fn test_script_uses_bare_command() {
        let invocation = TestInvocation::new("npm", "test");
        assert_eq!(invocation.program(), "npm");
        assert_eq!(invocation.args(), ["test"]);
        assert_eq!(invocation.display(), "npm test");
    }

    #[test]
    fn other_scripts_use_run() {
        let invocation = TestInvocation::new("yarn", "  unit ");
        assert_eq!(invocation.args(), ["run", "unit"]);
        assert_eq!(invocation.script(), "unit");
        assert_eq!(invocation.display(), "yarn run unit");
    }

    #[test]
    fn resolve_finds_declared_script() {
        let m = manifest(r#"{"name":"demo","scripts":{"test":"mocha","cov":"nyc mocha"}}"#);
        assert!(TestInvocation::resolve(&m, "npm", "test").is_ok());
        assert!(TestInvocation::resolve(&m, "npm", "cov").is_ok());
    }

    #[test]
    fn resolve_reports_missing_script_by_name() {
        let m = manifest(r#"{"scripts":{"test":"mocha"}}"#);
        let err = TestInvocation::resolve(&m, "npm", "customname").unwrap_err();
        assert!(matches!(err, ManifestError::ScriptNotFound { ref script, .. } if script == "customname"));
        assert_eq!(err.to_string(), "npm script `customname` was not found");
    }

    #[test]
    fn manifest_without_scripts_has_none() {
        let m = manifest(r#"{"name":"bare"}"#);
        assert!(!m.has_script("test"));
    }

    #[test]
    fn empty_script_command_is_not_runnable() {
        let m = manifest(r#"{"scripts":{"test":"  "}}"#);
        assert!(!m.has_script("test"));
    }

    #[test]
    fn unrelated_odd_fields_are_tolerated() {
        let m = manifest(r#"{"name":42,"scripts":{"test":"mocha","husky":null,"n":1}}"#);
        assert!(m.name.is_none());
        assert!(m.has_script("test"));
        assert!(!m.has_script("husky"));
        assert!(!m.has_script("n"));

        let m = manifest(r#"{"name":"demo","scripts":null}"#);
        assert!(!m.has_script("test"));
        let m = manifest(r#"{"scripts":"mocha"}"#);
        assert!(!m.has_script("test"));
    }

    #[test]
    fn non_object_manifest_is_invalid() {
        assert!(PackageManifest::from_json("[1, 2]").is_err());
        assert!(PackageManifest::from_json("{ not json").is_err());
    }

    #[tokio::test]
    async fn load_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = PackageManifest::load(dir.path()).await.unwrap_err();
        assert!(err.is_missing());
    }

    #[tokio::test]
    async fn load_invalid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{ nope").unwrap();

        let err = PackageManifest::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { .. }));
        assert!(!err.is_missing());
    }

    #[tokio::test]
    async fn load_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name":"demo","scripts":{"test":"node test.js"}}"#,
        )
        .unwrap();

        let m = PackageManifest::load(dir.path()).await.unwrap();
        assert_eq!(m.name.as_deref(), Some("demo"));
        assert!(m.has_script("test"));
    }

    #[tokio::test]
    async fn load_manifest_with_null_script_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name":"demo","scripts":{"test":"mocha","husky":null}}"#,
        )
        .unwrap();

        let m = PackageManifest::load(dir.path()).await.unwrap();
        let invocation = TestInvocation::resolve(&m, "npm", "test").unwrap();
        assert_eq!(invocation.display(), "npm test");
    }
}

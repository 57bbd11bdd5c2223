//! Session configuration.
//!
//! Everything the host supplies when constructing a session: where the server
//! executable lives, how to spawn it, which documents are in scope, which
//! filesystem patterns to watch, and the lifecycle timeouts. Defaults mirror
//! the stock Bazel/Starlark server setup.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::router::SelectorRule;

fn default_name() -> String {
    "Bazel Language Server".to_string()
}

fn default_command() -> PathBuf {
    PathBuf::from("bazel-lsp-server")
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_document_selector() -> Vec<SelectorRule> {
    vec![
        SelectorRule {
            language: Some("starlark".to_string()),
            scheme: Some("file".to_string()),
            pattern: None,
        },
        plaintext_rule("**/WORKSPACE"),
        plaintext_rule("**/BUILD"),
        plaintext_rule("**/BUILD.bazel"),
        plaintext_rule("**/*.bzl"),
        SelectorRule::pattern("file", "**/tools/build_rules/prelude_bazel"),
    ]
}

fn plaintext_rule(pattern: &str) -> SelectorRule {
    SelectorRule {
        language: Some("plaintext".to_string()),
        scheme: Some("file".to_string()),
        pattern: Some(pattern.to_string()),
    }
}

fn default_watch_patterns() -> Vec<String> {
    vec!["**/WORKSPACE".to_string()]
}

fn default_init_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Deserializes a timeout given as a number of seconds (fractions allowed),
/// e.g. `"init_timeout": 2.5`.
fn duration_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom(
            "timeout must be a non-negative number of seconds",
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Configuration for one language server session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session identity shown to the user in logs and error messages.
    pub name: String,

    /// Server executable. Absolute paths are used as-is; relative paths are
    /// resolved against `install_root` when set, otherwise left to `PATH`
    /// lookup at spawn time.
    pub command: PathBuf,

    /// Arguments passed to the server on every launch.
    pub args: Vec<String>,

    /// Environment variable overrides for the server process.
    pub env: HashMap<String, String>,

    /// Whether to append `debug_args` when launching.
    pub debug: bool,

    /// Extra arguments for debug launches (inspector ports and the like).
    /// Recognized but otherwise opaque pass-through.
    pub debug_args: Vec<String>,

    /// Installation root that relative `command` paths resolve against.
    pub install_root: Option<PathBuf>,

    /// Workspace root; document selector and watch globs anchor here, and the
    /// server process runs with this as its working directory.
    pub workspace_root: PathBuf,

    /// Document selector rules (see [`crate::router`]).
    pub document_selector: Vec<SelectorRule>,

    /// Filesystem watch glob patterns (implicit `file` scheme).
    pub watch_patterns: Vec<String>,

    /// Bound on the `initialize` handshake, in seconds.
    #[serde(deserialize_with = "duration_secs")]
    pub init_timeout: Duration,

    /// Bound on the `shutdown` request during teardown, in seconds. On expiry
    /// the process is force-terminated; `stop()` still completes.
    #[serde(deserialize_with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            command: default_command(),
            args: Vec::new(),
            env: HashMap::new(),
            debug: false,
            debug_args: Vec::new(),
            install_root: None,
            workspace_root: default_workspace_root(),
            document_selector: default_document_selector(),
            watch_patterns: default_watch_patterns(),
            init_timeout: default_init_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl SessionConfig {
    /// Loads a configuration from a JSON file. Absent fields take their
    /// defaults.
    ///
    /// ## Errors
    /// Returns a configuration error if the file is unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("failed to read {}: {err}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|err| Error::Config(format!("failed to parse {}: {err}", path.display())))
    }

    /// The executable path the launcher will spawn.
    pub fn resolved_command(&self) -> PathBuf {
        if self.command.is_absolute() {
            return self.command.clone();
        }
        match &self.install_root {
            Some(root) => root.join(&self.command),
            None => self.command.clone(),
        }
    }

    /// Arguments for this launch, with debug flags appended when enabled.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if self.debug {
            args.extend(self.debug_args.iter().cloned());
        }
        args
    }
}

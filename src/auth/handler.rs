//! Dynamic page handlers run as external processes.
//!
//! # Protocol
//! ```text
//! <interpreter> <script> --key value --key value ...
//!     stdout (+ stderr) → split on "\r\n\r\n"
//!     → [] (not handled) | [head] | [head, body]
//! ```
//!
//! A multi-valued parameter repeats its flag once per value. Each value is
//! passed as its own argument, so no shell quoting is involved.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::config::HandlerConfig;
use crate::http::request::Params;

/// Error type for handler execution.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler {0:?} is not an eligible script")]
    NotEligible(PathBuf),

    #[error("failed to run handler {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("handler {path:?} did not finish within {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },
}

/// Spawns handler scripts found under the document root.
#[derive(Debug, Clone)]
pub struct HandlerRunner {
    root: PathBuf,
    interpreters: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl HandlerRunner {
    pub fn new(root: &Path, config: &HandlerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            interpreters: config.interpreters.clone(),
            timeout: config.timeout(),
        }
    }

    /// Whether `script` can be run as a handler.
    ///
    /// It must be a regular file that either has an interpreter registered
    /// for its extension or is executable.
    pub fn is_eligible(&self, script: &Path) -> bool {
        script.is_file() && (self.interpreter_for(script).is_some() || is_executable(script))
    }

    fn interpreter_for(&self, script: &Path) -> Option<&str> {
        let extension = script.extension()?.to_str()?;
        self.interpreters.get(extension).map(String::as_str)
    }

    fn command(&self, script: &Path) -> Option<Command> {
        if !script.is_file() {
            return None;
        }
        match self.interpreter_for(script) {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(script);
                Some(command)
            }
            None if is_executable(script) => Some(Command::new(script)),
            None => None,
        }
    }

    /// Run the handler at `script` (relative to the root) and split its
    /// output into response segments.
    pub async fn run(&self, script: &str, params: &Params) -> Result<Vec<String>, HandlerError> {
        let path = self.root.join(script);
        let mut command = self
            .command(&path)
            .ok_or_else(|| HandlerError::NotEligible(path.clone()))?;
        command
            .args(handler_args(params))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(handler = %path.display(), params = params.len(), "Running handler");

        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, command.output())
                .await
                .map_err(|_| HandlerError::Timeout {
                    path: path.clone(),
                    timeout,
                })?,
            None => command.output().await,
        }
        .map_err(|source| HandlerError::Spawn {
            path: path.clone(),
            source,
        })?;

        if !output.status.success() {
            tracing::warn!(handler = %path.display(), status = %output.status, "Handler exited with failure");
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(split_segments(&text))
    }
}

/// Command line arguments for a parameter map.
pub fn handler_args(params: &Params) -> Vec<String> {
    params
        .iter()
        .flat_map(|(key, values)| {
            values
                .iter()
                .flat_map(move |value| [format!("--{}", key), value.clone()])
        })
        .collect()
}

/// Split handler output on blank lines, dropping whitespace-only pieces.
pub fn split_segments(output: &str) -> Vec<String> {
    output
        .split("\r\n\r\n")
        .filter(|segment| !segment.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

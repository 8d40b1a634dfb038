//! Rule Store: the access rule file and glob matching.
//!
//! The rule file is a JSON object kept at `<root>/rules.json`:
//!
//! ```text
//! {
//!     "Allow": ["*.html"],
//!     "Forbidden": ["*"],
//!     "Exception": [{ "Username": "alice", "Files": ["private/*"] }],
//!     "Database": "users.keys",
//!     "Handler": { "login.html": "scripts/login.sh" }
//! }
//! ```
//!
//! Loading never fails on malformed content. Missing keys get safe
//! defaults, broken entries are dropped, and every correction is logged.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::http::request::normalize_path;

const KEY_ALLOW: &str = "Allow";
const KEY_FORBIDDEN: &str = "Forbidden";
const KEY_EXCEPTION: &str = "Exception";
const KEY_DATABASE: &str = "Database";
const KEY_HANDLER: &str = "Handler";
const KEY_USERNAME: &str = "Username";
const KEY_FILES: &str = "Files";

/// Error type for reading and writing the rule file.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to access rule file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rule file {path:?} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Grants one user access to extra paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRule {
    #[serde(rename = "Username")]
    pub username: String,

    #[serde(rename = "Files")]
    pub files: Vec<String>,
}

/// The complete set of access rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Globs served to everyone.
    #[serde(rename = "Allow")]
    pub allow: Vec<String>,

    /// Globs denied unless allowed or excepted.
    #[serde(rename = "Forbidden")]
    pub forbidden: Vec<String>,

    /// Per-user grants, checked first.
    #[serde(rename = "Exception")]
    pub exceptions: Vec<ExceptionRule>,

    /// Credential file relative to the root, empty for none.
    #[serde(rename = "Database")]
    pub database: String,

    /// Page file name to handler script relative to the root.
    #[serde(rename = "Handler")]
    pub handlers: BTreeMap<String, String>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            allow: vec!["*".to_string()],
            forbidden: vec!["*".to_string()],
            exceptions: Vec::new(),
            database: String::new(),
            handlers: BTreeMap::new(),
        }
    }
}

impl RuleSet {
    /// Load and repair the rule file.
    ///
    /// A missing file yields the default rule set. `eligible` decides
    /// whether a handler script may be kept.
    pub fn load<F>(path: &Path, root: &Path, eligible: F) -> Result<Self, RuleError>
    where
        F: Fn(&Path) -> bool,
    {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Rule file not found, generating defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|source| RuleError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let mut object = match value {
            Value::Object(object) => object,
            other => {
                tracing::warn!(
                    path = %path.display(),
                    found = %other,
                    "Rule file is not an object, setting to default"
                );
                Map::new()
            }
        };

        let mut rules = Self {
            allow: take_patterns(&mut object, KEY_ALLOW, path),
            forbidden: take_patterns(&mut object, KEY_FORBIDDEN, path),
            exceptions: take_exceptions(&mut object, path),
            database: take_database(&mut object, path),
            handlers: take_handlers(&mut object, path),
        };

        if !rules.database.is_empty() && !root.join(&rules.database).is_file() {
            tracing::warn!(
                database = %root.join(&rules.database).display(),
                path = %path.display(),
                "Database not found, removed"
            );
            rules.database.clear();
        }

        rules.handlers.retain(|page, script| {
            let script_path = root.join(script);
            let keep = eligible(&script_path);
            if !keep {
                tracing::warn!(
                    page = %page,
                    handler = %script_path.display(),
                    "Handler not found or not an eligible script, removed"
                );
            }
            keep
        });

        Ok(rules)
    }

    /// Write the rule set as pretty printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), RuleError> {
        let content = serde_json::to_string_pretty(self).map_err(|source| RuleError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The exception entry for `username`, if any.
    pub fn exception_for(&self, username: &str) -> Option<&ExceptionRule> {
        self.exceptions.iter().find(|entry| entry.username == username)
    }
}

fn missing(key: &str, path: &Path) {
    tracing::warn!(key, path = %path.display(), "Rule key not defined, setting to default");
}

fn take_patterns(object: &mut Map<String, Value>, key: &str, path: &Path) -> Vec<String> {
    match object.remove(key).map(serde_json::from_value::<Vec<String>>) {
        Some(Ok(patterns)) => patterns,
        Some(Err(err)) => {
            tracing::warn!(key, error = %err, path = %path.display(), "Rule key malformed, setting to default");
            vec!["*".to_string()]
        }
        None => {
            missing(key, path);
            vec!["*".to_string()]
        }
    }
}

fn take_exceptions(object: &mut Map<String, Value>, path: &Path) -> Vec<ExceptionRule> {
    let items = match object.remove(KEY_EXCEPTION) {
        Some(Value::Array(items)) => items,
        Some(other) => {
            tracing::warn!(key = KEY_EXCEPTION, found = %other, "Rule key malformed, setting to default");
            return Vec::new();
        }
        None => {
            missing(KEY_EXCEPTION, path);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| {
            let well_formed = item.get(KEY_USERNAME).is_some() && item.get(KEY_FILES).is_some();
            let parsed = if well_formed {
                serde_json::from_value::<ExceptionRule>(item.clone()).ok()
            } else {
                None
            };
            if parsed.is_none() {
                tracing::warn!(item = %item, path = %path.display(), "Exception has wrong format, removed");
            }
            parsed
        })
        .collect()
}

fn take_database(object: &mut Map<String, Value>, path: &Path) -> String {
    match object.remove(KEY_DATABASE) {
        Some(Value::String(database)) => database,
        Some(Value::Null) => String::new(),
        Some(other) => {
            tracing::warn!(key = KEY_DATABASE, found = %other, "Rule key malformed, setting to default");
            String::new()
        }
        None => {
            missing(KEY_DATABASE, path);
            String::new()
        }
    }
}

fn take_handlers(object: &mut Map<String, Value>, path: &Path) -> BTreeMap<String, String> {
    let entries = match object.remove(KEY_HANDLER) {
        Some(Value::Object(entries)) => entries,
        Some(other) => {
            tracing::warn!(key = KEY_HANDLER, found = %other, "Rule key malformed, setting to default");
            return BTreeMap::new();
        }
        None => {
            missing(KEY_HANDLER, path);
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(page, script)| match script {
            Value::String(script) => Some((page, script)),
            other => {
                tracing::warn!(page = %page, found = %other, "Handler is not a path, removed");
                None
            }
        })
        .collect()
}

/// Whether `path` is among the files `pattern` expands to under `root`.
///
/// Expansion follows shell rules: `*` does not cross `/` and does not
/// pick up dot files. `path` is expected to be normalized already.
pub fn glob_matches(root: &Path, pattern: &str, path: &Path) -> bool {
    let escaped_root = Pattern::escape(&root.to_string_lossy());
    let full = Path::new(&escaped_root).join(pattern.trim_start_matches('/'));
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    match glob::glob_with(&full.to_string_lossy(), options) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .any(|candidate| normalize_path(&candidate) == path),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "Invalid glob pattern");
            false
        }
    }
}

//! The Authorization Engine.
//!
//! `AuthHandler` has no internal locking. Connection workers share it as a
//! [`SharedAuth`] and hold the lock across the whole auth, handle and
//! session update sequence of one request.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth::credentials::Credentials;
use crate::auth::handler::HandlerRunner;
use crate::auth::rules::{glob_matches, RuleError, RuleSet};
use crate::config::HandlerConfig;
use crate::http::request::Params;

/// The engine behind the single lock shared by all connections.
pub type SharedAuth = Arc<Mutex<AuthHandler>>;

/// Evaluates access rules, tracks sessions and dispatches handlers.
#[derive(Debug)]
pub struct AuthHandler {
    root: PathBuf,
    rules_path: PathBuf,
    rules: RuleSet,
    credentials: Credentials,
    /// Client address to authenticated username.
    sessions: HashMap<IpAddr, Option<String>>,
    runner: HandlerRunner,
    closed: bool,
}

impl AuthHandler {
    /// Load the rule file `rules_file` under `root`, repair it and write the
    /// repaired version back.
    pub fn load(root: &Path, rules_file: &str, handlers: &HandlerConfig) -> Result<Self, RuleError> {
        let rules_path = root.join(rules_file);
        let runner = HandlerRunner::new(root, handlers);
        let mut rules = RuleSet::load(&rules_path, root, |script| runner.is_eligible(script))?;

        let mut credentials = Credentials::default();
        if !rules.database.is_empty() {
            let database = root.join(&rules.database);
            match Credentials::load(&database) {
                Ok(loaded) => credentials = loaded,
                Err(err) => {
                    tracing::warn!(
                        database = %database.display(),
                        error = %err,
                        "Database unreadable, removed"
                    );
                    rules.database.clear();
                }
            }
        }

        let engine = Self {
            root: root.to_path_buf(),
            rules_path,
            rules,
            credentials,
            sessions: HashMap::new(),
            runner,
            closed: false,
        };

        tracing::info!(
            allow = engine.rules.allow.len(),
            forbidden = engine.rules.forbidden.len(),
            exceptions = engine.rules.exceptions.len(),
            handlers = engine.rules.handlers.len(),
            "Rules initialized"
        );
        tracing::info!(users = engine.credentials.len(), "Database initialized");

        engine.save()?;
        Ok(engine)
    }

    /// Wrap the engine in its shared lock.
    pub fn into_shared(self) -> SharedAuth {
        Arc::new(Mutex::new(self))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Whether `path` may be served to `client`.
    ///
    /// `path` is the normalized absolute path under the document root.
    /// First match wins: the session user's exception entry, then `allow`,
    /// then `forbidden`. A path no rule mentions is allowed with a warning.
    pub fn auth(&self, path: &Path, client: IpAddr) -> bool {
        if let Some(username) = self.session(client) {
            if !self.credentials.is_empty() {
                if let Some(entry) = self.rules.exception_for(username) {
                    if self.any_match(&entry.files, path) {
                        tracing::debug!(user = %username, path = %path.display(), "Access granted by exception");
                        return true;
                    }
                }
            }
        }

        if self.any_match(&self.rules.allow, path) {
            return true;
        }
        if self.any_match(&self.rules.forbidden, path) {
            return false;
        }

        tracing::warn!(path = %path.display(), "Path is authenticated, but not mentioned in the rules");
        true
    }

    fn any_match(&self, patterns: &[String], path: &Path) -> bool {
        patterns
            .iter()
            .any(|pattern| glob_matches(&self.root, pattern, path))
    }

    /// Produce dynamic content for `path`.
    ///
    /// Returns no segments when there are no parameters, when no handler is
    /// registered for the file name, or when the handler fails or prints
    /// nothing.
    pub async fn handle(&self, path: &Path, params: &Params) -> Vec<String> {
        if params.is_empty() {
            return Vec::new();
        }

        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            return Vec::new();
        };
        let Some(script) = self.rules.handlers.get(filename) else {
            tracing::warn!(path = %path.display(), "Failed to handle, unknown handler");
            return Vec::new();
        };

        match self.runner.run(script, params).await {
            Ok(segments) => {
                if segments.is_empty() {
                    tracing::debug!(handler = %script, "Handler produced no output");
                }
                segments
            }
            Err(err) => {
                tracing::error!(handler = %script, error = %err, "Handler failed");
                Vec::new()
            }
        }
    }

    /// Check a username and password against the credential table.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        if self.credentials.is_empty() {
            return false;
        }
        self.credentials.verify(username, password)
    }

    /// Set or clear the session of `client`.
    pub fn update_user_session(&mut self, client: IpAddr, username: Option<String>) {
        tracing::info!(client = %client, user = ?username, "Session updated");
        self.sessions.insert(client, username);
    }

    /// The authenticated username of `client`, if any.
    pub fn session(&self, client: IpAddr) -> Option<&str> {
        self.sessions.get(&client)?.as_deref()
    }

    /// Persist rules and credentials. Later calls do nothing.
    pub fn shutdown(&mut self) -> Result<(), RuleError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.save()?;
        tracing::info!("Authorization engine closed");
        Ok(())
    }

    fn save(&self) -> Result<(), RuleError> {
        self.rules.save(&self.rules_path)?;
        if !self.rules.database.is_empty() {
            let database = self.root.join(&self.rules.database);
            self.credentials
                .save(&database)
                .map_err(|source| RuleError::Io {
                    path: database,
                    source,
                })?;
        }
        tracing::info!(path = %self.rules_path.display(), "Rules and Database saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Counts warning events.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct Site {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    impl Site {
        fn new(rules: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().canonicalize().unwrap();
            for page in ["index.html", "public.html", "secret.html"] {
                fs::write(root.join(page), page).unwrap();
            }
            fs::create_dir(root.join("docs")).unwrap();
            fs::write(root.join("docs/readme.txt"), "readme").unwrap();
            fs::write(root.join("users.keys"), "alice\nwonderland\n").unwrap();
            fs::write(root.join("rules.json"), rules).unwrap();
            Self { _dir: dir, root }
        }

        fn engine(&self) -> AuthHandler {
            AuthHandler::load(&self.root, "rules.json", &HandlerConfig::default()).unwrap()
        }
    }

    const RULES: &str = r#"{
        "Allow": ["index.html", "public.html"],
        "Forbidden": ["*.html"],
        "Exception": [
            { "Username": "alice", "Files": ["secret.html"] },
            { "Username": "alice", "Files": ["docs/*"] }
        ],
        "Database": "users.keys",
        "Handler": {}
    }"#;

    #[test]
    fn allow_then_forbidden() {
        let site = Site::new(RULES);
        let engine = site.engine();
        assert!(engine.auth(&site.root.join("public.html"), CLIENT));
        assert!(!engine.auth(&site.root.join("secret.html"), CLIENT));
    }

    #[test]
    fn exception_overrides_forbidden() {
        let site = Site::new(RULES);
        let mut engine = site.engine();
        engine.update_user_session(CLIENT, Some("alice".into()));

        assert!(engine.auth(&site.root.join("secret.html"), CLIENT));
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        assert!(!engine.auth(&site.root.join("secret.html"), other));

        engine.update_user_session(CLIENT, None);
        assert!(!engine.auth(&site.root.join("secret.html"), CLIENT));
    }

    #[test]
    fn only_first_exception_entry_is_consulted() {
        let site = Site::new(RULES);
        let mut engine = site.engine();
        engine.update_user_session(CLIENT, Some("alice".into()));

        // docs/* is in alice's second entry and nothing else mentions it
        let readme = site.root.join("docs/readme.txt");
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let allowed = tracing::subscriber::with_default(subscriber, || engine.auth(&readme, CLIENT));
        assert!(allowed);
        assert_eq!(warnings.load(Ordering::SeqCst), 1, "reached the default branch");
    }

    #[test]
    fn exceptions_need_a_credential_table() {
        let site = Site::new(&RULES.replace("users.keys", ""));
        let mut engine = site.engine();
        engine.update_user_session(CLIENT, Some("alice".into()));
        assert!(!engine.auth(&site.root.join("secret.html"), CLIENT));
    }

    #[test]
    fn unmentioned_path_allowed_with_one_warning() {
        let site = Site::new(r#"{ "Allow": ["index.html"], "Forbidden": ["secret.html"] }"#);
        let engine = site.engine();

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let allowed = tracing::subscriber::with_default(subscriber, || {
            engine.auth(&site.root.join("public.html"), CLIENT)
        });

        assert!(allowed);
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn verify_uses_credential_table() {
        let site = Site::new(RULES);
        let engine = site.engine();
        assert!(engine.verify("alice", "wonderland"));
        assert!(!engine.verify("alice", "looking-glass"));
        assert!(!engine.verify("bob", "wonderland"));

        let empty = Site::new(r#"{ "Database": "" }"#).engine();
        assert!(!empty.verify("alice", "wonderland"));
    }

    #[test]
    fn load_persists_corrections() {
        let site = Site::new(r#"{ "Allow": ["index.html"], "Database": "nope.keys" }"#);
        let engine = site.engine();
        assert_eq!(engine.rules().database, "");

        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(site.root.join("rules.json")).unwrap()).unwrap();
        assert_eq!(saved["Database"], "");
        assert_eq!(saved["Forbidden"], serde_json::json!(["*"]));
        assert_eq!(saved["Exception"], serde_json::json!([]));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let site = Site::new(RULES);
        let mut engine = site.engine();
        engine.shutdown().unwrap();
        fs::remove_file(site.root.join("rules.json")).unwrap();
        engine.shutdown().unwrap();
        assert!(!site.root.join("rules.json").exists());
    }

    #[tokio::test]
    async fn handle_without_params_or_handler() {
        let site = Site::new(RULES);
        let engine = site.engine();
        let page = site.root.join("public.html");

        assert!(engine.handle(&page, &Params::new()).await.is_empty());

        let mut params = Params::new();
        params.insert("q".into(), vec!["1".into()]);
        assert!(engine.handle(&page, &params).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn handle_runs_registered_script() {
        let site = Site::new(&RULES.replace(
            r#""Handler": {}"#,
            r#""Handler": { "public.html": "greet.sh" }"#,
        ));
        fs::write(
            site.root.join("greet.sh"),
            "printf 'HTTP/1.1 200 OK\\r\\nContent-Length: 5\\r\\n\\r\\nhello'\n",
        )
        .unwrap();
        let engine = site.engine();

        let mut params = Params::new();
        params.insert("name".into(), vec!["alice".into()]);
        let segments = engine.handle(&site.root.join("public.html"), &params).await;
        assert_eq!(segments, vec!["HTTP/1.1 200 OK\r\nContent-Length: 5", "hello"]);
    }
}

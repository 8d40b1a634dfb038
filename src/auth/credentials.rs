//! The credential table.
//!
//! Stored on disk as plain text, one username line followed by one password
//! line. Passwords are kept in the same plaintext form in memory.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

/// Username to password table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    entries: BTreeMap<String, String>,
}

impl Credentials {
    /// Read a credential file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse alternating username and password lines.
    ///
    /// A trailing username without a password line is ignored.
    pub fn parse(content: &str) -> Self {
        let lines: Vec<&str> = content.lines().collect();
        let entries = lines
            .chunks_exact(2)
            .map(|pair| (pair[0].trim().to_string(), pair[1].trim().to_string()))
            .collect();
        Self { entries }
    }

    /// Write the table back in the on-disk format.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut content = String::new();
        for (username, password) in &self.entries {
            let _ = writeln!(content, "{}", username);
            let _ = writeln!(content, "{}", password);
        }
        fs::write(path, content)
    }

    pub fn insert(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.entries.insert(username.into(), password.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Exact match of a stored password.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.entries
            .get(username)
            .is_some_and(|stored| stored == password)
    }
}

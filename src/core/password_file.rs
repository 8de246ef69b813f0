//! Loading and parsing of `username=hash` password files.
//!
//! Format per line: `username=hash`, split at the first `=`, both sides
//! trimmed. Blank lines and lines starting with `#` or `!` are ignored.
//! Malformed lines are skipped with a [`LineWarning`]; only an unreadable
//! file is an error.

use crate::constants;
use crate::error::{describe_io, StoreError};
use crate::models::credential::{CredentialEntry, Username};
use crate::util::fs as store_fs;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

/// A line skipped while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineWarning {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for LineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// In-memory snapshot of a password file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordFile {
    entries: Vec<CredentialEntry>,
}

/// Result of loading a file: the entries plus anything that was skipped.
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    pub file: PasswordFile,
    pub warnings: Vec<LineWarning>,
}

/// Whether an upsert created a new entry or replaced an existing hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

impl PasswordFile {
    pub fn entries(&self) -> &[CredentialEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored hash for `username`, if present.
    pub fn lookup(&self, username: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.username.as_str() == username)
            .map(|e| e.hashed_password.as_str())
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.username.as_str())
    }

    /// Set the hash for `username`, keeping its position if it already exists.
    pub fn upsert(&mut self, username: Username, hashed_password: String) -> UpsertOutcome {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.username == username) {
            existing.hashed_password = hashed_password;
            return UpsertOutcome::Updated;
        }
        self.entries.push(CredentialEntry {
            username,
            hashed_password,
        });
        UpsertOutcome::Added
    }
}

/// Parse password file text (testable without filesystem).
pub fn parse_content(content: &str) -> Loaded {
    let mut loaded = Loaded::default();
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    for (idx, raw_line) in content.lines().enumerate() {
        let line_num = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once('=') else {
            loaded.warnings.push(LineWarning {
                line: line_num,
                message: "missing '=' separator".to_string(),
            });
            continue;
        };

        let username = match Username::parse(key.trim()) {
            Ok(u) => u,
            Err(e) => {
                loaded.warnings.push(LineWarning {
                    line: line_num,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let value = value.trim();
        if value.is_empty() {
            loaded.warnings.push(LineWarning {
                line: line_num,
                message: format!("empty password hash for '{}'", username),
            });
            continue;
        }

        if loaded.file.upsert(username.clone(), value.to_string()) == UpsertOutcome::Updated {
            loaded.warnings.push(LineWarning {
                line: line_num,
                message: format!("duplicate entry for '{}' replaces an earlier line", username),
            });
        }
    }

    loaded
}

/// Read and parse an existing password file.
pub fn load(path: &Path) -> Result<Loaded, StoreError> {
    if path.is_dir() {
        return Err(StoreError::file_access(path, "is a directory"));
    }
    let content =
        fs::read_to_string(path).map_err(|e| StoreError::file_access(path, describe_io(&e)))?;
    let loaded = parse_content(&content);
    for warning in &loaded.warnings {
        tracing::warn!(
            path = %path.display(),
            line = warning.line,
            "skipping password file line: {}",
            warning.message
        );
    }
    tracing::debug!(path = %path.display(), entries = loaded.file.len(), "loaded password file");
    Ok(loaded)
}

/// Like [`load`], but a missing file is an empty store.
///
/// A symlink whose target is missing counts as missing.
pub fn load_or_empty(path: &Path) -> Result<Loaded, StoreError> {
    match fs::metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "password file does not exist");
            Ok(Loaded::default())
        }
        _ => load(path),
    }
}

/// Create an empty password file if nothing exists at `path`.
///
/// Returns `true` when the file was created by this call.
pub fn ensure_exists(path: &Path) -> Result<bool, StoreError> {
    if path.exists() {
        return Ok(false);
    }
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            store_fs::set_permissions(path, constants::PASSWORD_FILE_MODE)
                .map_err(|e| StoreError::file_create(path, describe_io(&e)))?;
            tracing::info!(path = %path.display(), "created empty password file");
            Ok(true)
        }
        // Either another creator won the race, or `path` is a dangling symlink.
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match fs::metadata(path) {
            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::file_create(
                path,
                "symbolic link points to a missing file",
            )),
            Err(e) => Err(StoreError::file_create(path, describe_io(&e))),
        },
        Err(e) => Err(StoreError::file_create(path, describe_io(&e))),
    }
}

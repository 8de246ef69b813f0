//! Operations exposed to the host: check a credential, store a credential.
//!
//! Each call loads the password file fresh and keeps nothing afterwards.
//! Operational failures come back as [`StoreError`]; a rejected credential
//! is a plain `false` and looks the same whether the user is unknown or the
//! password is wrong.

use crate::core::hasher;
use crate::core::password_file::{self, UpsertOutcome};
use crate::core::writer;
use crate::error::StoreError;
use crate::models::auth_config::AuthConfig;
use crate::models::credential::Username;
use std::path::Path;

/// Result of a successful add-or-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddUserOutcome {
    Added,
    Updated,
}

impl AddUserOutcome {
    /// Confirmation text suitable for an end user.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Added => "User successfully added to password file",
            Self::Updated => "User password updated in password file",
        }
    }
}

impl From<UpsertOutcome> for AddUserOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Added => Self::Added,
            UpsertOutcome::Updated => Self::Updated,
        }
    }
}

/// Check `password` for `username` against the file at `path`.
///
/// A missing file authenticates nobody.
pub fn verify_credentials(path: &Path, username: &str, password: &str) -> Result<bool, StoreError> {
    let loaded = password_file::load_or_empty(path)?;
    let verified = match loaded.file.lookup(username) {
        Some(stored) => hasher::verify_password(password, stored),
        None => {
            // An unknown user still costs one hash.
            let _ = hasher::hash_password(password);
            false
        }
    };
    tracing::debug!(path = %path.display(), username, verified, "credential check");
    Ok(verified)
}

/// Hash `password` and store it for `username` in the file at `path`,
/// creating the file if needed. An existing entry is overwritten.
pub fn add_or_update_user(
    path: &Path,
    username: &str,
    password: &str,
) -> Result<AddUserOutcome, StoreError> {
    let username = Username::parse(username)?;
    // Resolve the file before paying for the hash.
    password_file::ensure_exists(path)?;
    let hashed = hasher::hash_password(password)?;
    let outcome = writer::upsert(path, &username, &hashed.to_string())?;
    Ok(outcome.into())
}

/// All usernames in file order. A missing file has no users.
pub fn list_users(path: &Path) -> Result<Vec<String>, StoreError> {
    let loaded = password_file::load_or_empty(path)?;
    Ok(loaded.file.usernames().map(str::to_string).collect())
}

/// Usernames containing `query`, case-insensitively.
pub fn search_users(path: &Path, query: &str) -> Result<Vec<String>, StoreError> {
    let needle = query.to_lowercase();
    let users = list_users(path)?;
    Ok(users
        .into_iter()
        .filter(|u| u.to_lowercase().contains(&needle))
        .collect())
}

/// Password file path configured in `config`.
pub fn password_file_of(config: &AuthConfig) -> Result<&Path, StoreError> {
    config
        .password_file_path
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(StoreError::NotConfigured)
}

/// [`verify_credentials`] against the file named by `config`.
pub fn verify_credentials_with_config(
    config: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<bool, StoreError> {
    verify_credentials(password_file_of(config)?, username, password)
}

/// [`add_or_update_user`] against the file named by `config`.
pub fn add_or_update_user_with_config(
    config: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<AddUserOutcome, StoreError> {
    add_or_update_user(password_file_of(config)?, username, password)
}

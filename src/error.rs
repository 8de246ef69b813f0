//! Errors surfaced by the credential store.
//!
//! Messages are safe to show an end user: they name the file and the failing
//! step, never a password or a stored hash.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Operational failure of a store operation.
///
/// A rejected credential is not an error; verification reports it as `false`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read password file {path}: {reason}")]
    FileAccess { path: String, reason: String },

    #[error("cannot create password file {path}: {reason}")]
    FileCreate { path: String, reason: String },

    #[error("cannot write password file {path}: {reason}")]
    Persist { path: String, reason: String },

    /// A username that cannot be written as a `username=hash` line.
    /// Only raised when storing; verification reports such a name as `false`.
    #[error("invalid username: {reason}")]
    InvalidUsername { reason: String },

    /// bcrypt refused to produce a hash, e.g. no OS randomness for the salt.
    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// The `*_with_config` entry points were given a config with no file path.
    #[error("no password file path configured")]
    NotConfigured,
}

impl StoreError {
    #[must_use]
    pub fn file_access(path: &Path, reason: impl ToString) -> Self {
        Self::FileAccess {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn file_create(path: &Path, reason: impl ToString) -> Self {
        Self::FileCreate {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn persist(path: &Path, reason: impl ToString) -> Self {
        Self::Persist {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_username(reason: impl Into<String>) -> Self {
        Self::InvalidUsername {
            reason: reason.into(),
        }
    }

    /// Short kind name, used by the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileAccess { .. } => "file-access",
            Self::FileCreate { .. } => "file-create",
            Self::Persist { .. } => "persist",
            Self::InvalidUsername { .. } => "invalid-username",
            Self::Hashing(_) => "hashing",
            Self::NotConfigured => "not-configured",
        }
    }
}

/// Describe an I/O error without leaking its `Debug` form.
pub(crate) fn describe_io(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "not found".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        io::ErrorKind::InvalidData => "not valid UTF-8 text".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_path_and_reason() {
        let err = StoreError::persist(Path::new("/tmp/passwd"), "disk full");
        assert_eq!(err.to_string(), "cannot write password file /tmp/passwd: disk full");
        assert_eq!(err.kind(), "persist");
    }

    #[test]
    fn test_describe_io_kinds() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(describe_io(&err), "permission denied");
        let err = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(describe_io(&err), "not found");
    }
}

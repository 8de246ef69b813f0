//! Caller-supplied configuration for one operation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies the password file (and optional audit log) an operation uses.
///
/// Owned by the caller; the store reads it once per call and keeps nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default)]
    pub password_file_path: Option<PathBuf>,

    /// Append-only audit trail for add-user and verify results.
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl AuthConfig {
    pub fn for_file(path: impl Into<PathBuf>) -> Self {
        Self {
            password_file_path: Some(path.into()),
            audit_log: None,
        }
    }
}

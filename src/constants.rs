//! Centralized constants for hashing, permissions, and file layout.

use std::time::Duration;

/// bcrypt cost factor applied to every new hash.
///
/// Changing this only affects hashes written afterwards; stored hashes keep
/// the cost they were created with.
pub const HASH_COST: u32 = 10;

/// Lowest cost accepted when parsing a stored hash.
pub const MIN_HASH_COST: u32 = 4;

/// Highest cost accepted when parsing a stored hash.
pub const MAX_HASH_COST: u32 = 31;

/// Permission mode for newly created password files.
pub const PASSWORD_FILE_MODE: u32 = 0o600;

/// Permission mode for the audit log.
pub const AUDIT_LOG_MODE: u32 = 0o640;

/// First comment line written at the top of every password file.
pub const FILE_HEADER: &str = "# Updated by pwfile-auth";

/// Suffix appended to the password file path to form its writer lock.
pub const LOCK_SUFFIX: &str = ".lock";

/// How long an upsert waits for the writer lock before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between writer lock attempts.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pwfile-auth.toml";

/// Maximum accepted password length in bytes when read by the CLI.
pub const MAX_PASSWORD_SIZE: usize = 4096;

/// Default length for generated passwords.
pub const DEFAULT_GENERATED_LENGTH: usize = 24;

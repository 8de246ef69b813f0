//! Flat-file password store.
//!
//! Keeps `username=hash` lines with bcrypt hashes in a single text file and
//! offers two operations over it: check a username/password pair, and add or
//! replace a user's password. Updates replace the file atomically and are
//! serialized with a writer lock.
//!
//! ## Modules
//! - `core`: Store logic (parse, hash, persist, audit, config)
//! - `models`: Data structures
//! - `cli`: Command-line handlers
//! - `util`: Filesystem helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;

pub use crate::core::authenticator::{
    add_or_update_user, list_users, search_users, verify_credentials, AddUserOutcome,
};
pub use crate::error::StoreError;
pub use crate::models::auth_config::AuthConfig;

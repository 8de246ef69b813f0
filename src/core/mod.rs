//! Credential store: parsing, hashing, persistence, and the host operations.

pub mod audit_log;
pub mod authenticator;
pub mod config;
pub mod file_lock;
pub mod hasher;
pub mod password_file;
pub mod writer;

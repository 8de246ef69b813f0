//! Data structures shared by the store and the CLI.

pub mod auth_config;
pub mod credential;

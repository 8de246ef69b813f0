//! Config file loading and password file resolution.

use crate::constants;
use crate::models::auth_config::AuthConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Read an [`AuthConfig`] from a TOML file.
pub fn load(path: &Path) -> Result<AuthConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: AuthConfig = toml::from_str(&content)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(config)
}

/// Build the effective config from CLI/env values and an optional file.
///
/// Explicit values win over the config file. Without `--config`, the
/// default file in the working directory is used only if it exists.
pub fn resolve(
    password_file: Option<PathBuf>,
    audit_log: Option<PathBuf>,
    config_file: Option<PathBuf>,
) -> Result<AuthConfig> {
    let mut config = match config_file {
        Some(path) => load(&path)?,
        None => {
            let default = PathBuf::from(constants::DEFAULT_CONFIG_FILE);
            if default.is_file() {
                load(&default)?
            } else {
                AuthConfig::default()
            }
        }
    };

    if password_file.is_some() {
        config.password_file_path = password_file;
    }
    if audit_log.is_some() {
        config.audit_log = audit_log;
    }
    Ok(config)
}

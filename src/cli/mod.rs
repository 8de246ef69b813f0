//! CLI routing and command dispatch.

use crate::core::audit_log::{AuditLog, AuditResult};
use crate::core::{authenticator, config};
use crate::models::auth_config::AuthConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod audit;
pub mod check;
pub mod user;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub config: AuthConfig,
    pub non_interactive: bool,
}

impl CliContext {
    /// Password file for commands that need one.
    pub fn password_file(&self) -> Result<&Path> {
        Ok(authenticator::password_file_of(&self.config)?)
    }

    pub fn audit_log(&self) -> Option<AuditLog> {
        self.config.audit_log.as_ref().map(AuditLog::new)
    }

    /// Record an outcome in the audit log, if one is configured.
    /// Audit failures are reported but never fail the command.
    pub fn audit(&self, action: &str, username: &str, success: bool, error: Option<String>) {
        let Some(log) = self.audit_log() else {
            return;
        };
        if let Err(e) = log.record(action, username, AuditResult { success, error }) {
            tracing::warn!(path = %log.path().display(), "audit log failed: {:#}", e);
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pwfile-auth", version, about = "Manage and check a bcrypt password file")]
pub struct Cli {
    /// Password file to operate on
    #[arg(long, global = true, value_name = "PATH", env = "PWFILE_AUTH_PASSWORD_FILE")]
    pub password_file: Option<PathBuf>,

    /// TOML config file (default: ./pwfile-auth.toml if present)
    #[arg(long, global = true, value_name = "PATH", env = "PWFILE_AUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Append-only audit log for add-user and verify
    #[arg(long, global = true, value_name = "PATH", env = "PWFILE_AUTH_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "PWFILE_AUTH_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = config::resolve(self.password_file, self.audit_log, self.config)?;
        let ctx = CliContext {
            config,
            non_interactive: self.non_interactive,
        };

        match self.command {
            Commands::AddUser(args) => user::run_add(&ctx, args),
            Commands::Verify(args) => user::run_verify(&ctx, args),
            Commands::List(args) => user::run_list(&ctx, args),
            Commands::Search(args) => user::run_search(&ctx, args),
            Commands::Check(args) => check::run(&ctx, args),
            Commands::Audit { command } => audit::run(&ctx, command),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a user, or replace an existing user's password
    AddUser(user::AddUserArgs),
    /// Check a username/password pair (exit status 1 if rejected)
    Verify(user::VerifyArgs),
    /// List usernames
    List(user::ListArgs),
    /// Search usernames (case-insensitive substring)
    Search(user::SearchArgs),
    /// Diagnose the password file (safe, read-only)
    Check(check::CheckArgs),
    /// View or verify the audit trail
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
}

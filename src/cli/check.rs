//! Read-only diagnostics for a password file.

use crate::cli::CliContext;
use crate::constants;
use crate::core::file_lock::{self, FileLock};
use crate::core::hasher::HashedPassword;
use crate::core::password_file;
#[cfg(unix)]
use crate::util::fs as store_fs;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Treat warnings as failures
    #[arg(long)]
    pub strict: bool,
}

pub fn run(ctx: &CliContext, args: CheckArgs) -> Result<()> {
    let path = ctx.password_file()?;
    let mut ok = 0u32;
    let mut warn = 0u32;
    let mut fail = 0u32;

    println!("Check: {}", path.display());

    if !path.exists() {
        println!("  [WARN] password file missing (it will be created by add-user)");
        warn += 1;
        return summary(ok, warn, fail, args.strict);
    }

    let loaded = match password_file::load(path) {
        Ok(loaded) => {
            println!("  [PASS] readable: {} entries", loaded.file.len());
            ok += 1;
            loaded
        }
        Err(e) => {
            println!("  [FAIL] {}", e);
            fail += 1;
            return summary(ok, warn, fail, args.strict);
        }
    };

    if loaded.warnings.is_empty() {
        println!("  [PASS] no malformed lines");
        ok += 1;
    } else {
        for w in &loaded.warnings {
            println!("  [WARN] skipped {}", w);
        }
        warn += loaded.warnings.len() as u32;
    }

    let mut bad_hashes = 0u32;
    let mut weak_cost = 0u32;
    for entry in loaded.file.entries() {
        match entry.hashed_password.parse::<HashedPassword>() {
            Ok(hash) if hash.cost() < constants::HASH_COST => {
                println!(
                    "  [WARN] '{}' uses cost {} (current default {})",
                    entry.username,
                    hash.cost(),
                    constants::HASH_COST
                );
                weak_cost += 1;
            }
            Ok(_) => {}
            Err(e) => {
                println!("  [FAIL] '{}' has an unusable hash: {}", entry.username, e);
                bad_hashes += 1;
            }
        }
    }
    if bad_hashes == 0 && weak_cost == 0 {
        println!("  [PASS] all hashes are bcrypt at cost >= {}", constants::HASH_COST);
        ok += 1;
    }
    fail += bad_hashes;
    warn += weak_cost;

    #[cfg(unix)]
    {
        if let Some(mode) = store_fs::file_mode(path) {
            if mode & 0o077 == 0 {
                println!("  [PASS] file mode ok: {:04o}", mode);
                ok += 1;
            } else {
                println!(
                    "  [WARN] file mode: {:04o} (expected {:04o}; hashes are readable by others)",
                    mode,
                    constants::PASSWORD_FILE_MODE
                );
                warn += 1;
            }
        }
    }

    let lock_path = file_lock::lock_path_for(path);
    if !lock_path.exists() {
        println!("  [PASS] no writer lock file");
        ok += 1;
        return summary(ok, warn, fail, args.strict);
    }
    match FileLock::try_exclusive(&lock_path) {
        Ok(Some(_)) => {
            println!("  [PASS] writer lock free: {}", lock_path.display());
            ok += 1;
        }
        Ok(None) => {
            println!("  [WARN] writer lock held by another process: {}", lock_path.display());
            warn += 1;
        }
        Err(e) => {
            println!("  [WARN] cannot open writer lock {}: {}", lock_path.display(), e);
            warn += 1;
        }
    }

    summary(ok, warn, fail, args.strict)
}

fn summary(ok: u32, warn: u32, fail: u32, strict: bool) -> Result<()> {
    println!();
    println!("Check summary: {} pass, {} warn, {} fail", ok, warn, fail);
    if fail > 0 || (strict && warn > 0) {
        std::process::exit(1);
    }
    Ok(())
}

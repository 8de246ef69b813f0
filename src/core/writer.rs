//! Serializing and atomically replacing password files.
//!
//! New content is written to a temp file in the target's directory, synced,
//! then renamed over the target. Readers see the old file or the new one,
//! never a mix. A staged file dropped before [`commit`] is deleted and the
//! target is left as it was.

use crate::constants;
use crate::core::file_lock::FileLock;
use crate::core::password_file::{self, PasswordFile, UpsertOutcome};
use crate::error::{describe_io, StoreError};
use crate::models::credential::Username;
use crate::util::fs as store_fs;
use chrono::{SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Render a password file: header comments, then one entry per line.
pub fn serialize(file: &PasswordFile) -> String {
    let mut out = String::new();
    out.push_str(constants::FILE_HEADER);
    out.push('\n');
    let _ = writeln!(
        out,
        "# {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    for entry in file.entries() {
        let _ = writeln!(out, "{}={}", entry.username, entry.hashed_password);
    }
    out
}

fn persist_io(target: &Path, step: &str, err: &io::Error) -> StoreError {
    StoreError::persist(target, format!("{}: {}", step, describe_io(err)))
}

/// Write `content` to a synced temp file next to `target`.
pub fn stage(target: &Path, content: &str) -> Result<NamedTempFile, StoreError> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".pwfile-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| persist_io(target, "create temp file", &e))?;

    let mode = store_fs::file_mode(target).unwrap_or(constants::PASSWORD_FILE_MODE);
    store_fs::set_permissions(tmp.path(), mode)
        .map_err(|e| persist_io(target, "set temp file mode", &e))?;

    tmp.write_all(content.as_bytes())
        .map_err(|e| persist_io(target, "write temp file", &e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| persist_io(target, "sync temp file", &e))?;
    Ok(tmp)
}

/// Rename a staged file over `target`.
pub fn commit(staged: NamedTempFile, target: &Path) -> Result<(), StoreError> {
    staged
        .persist(target)
        .map_err(|e| persist_io(target, "replace file", &e.error))?;
    Ok(())
}

/// Replace the whole content of `target` in one step.
pub fn write_atomic(target: &Path, file: &PasswordFile) -> Result<(), StoreError> {
    let staged = stage(target, &serialize(file))?;
    commit(staged, target)
}

/// Set the hash for `username` in the file at `target` and persist it.
///
/// Creates the file if absent, then holds the writer lock across load and replace
/// so concurrent upserts through this function cannot drop each other's
/// entries.
pub fn upsert(
    target: &Path,
    username: &Username,
    hashed_password: &str,
) -> Result<UpsertOutcome, StoreError> {
    password_file::ensure_exists(target)?;
    let _lock = FileLock::for_writer(target, constants::LOCK_TIMEOUT)?;

    let mut loaded = password_file::load(target)?;
    let outcome = loaded
        .file
        .upsert(username.clone(), hashed_password.to_string());
    write_atomic(target, &loaded.file)?;

    tracing::info!(
        path = %target.display(),
        username = %username,
        ?outcome,
        "password file updated"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn user(name: &str) -> Username {
        Username::parse(name).unwrap()
    }

    #[test]
    fn test_serialize_header_and_entries() {
        let loaded = password_file::parse_content("alice=h1\nbob=h2\n");
        let text = serialize(&loaded.file);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], constants::FILE_HEADER);
        assert!(lines[1].starts_with("# "));
        assert_eq!(&lines[2..], &["alice=h1", "bob=h2"]);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_serialized_file_parses_back() {
        let loaded = password_file::parse_content("alice=h1\nbob=h2\n");
        let reparsed = password_file::parse_content(&serialize(&loaded.file));
        assert!(reparsed.warnings.is_empty());
        assert_eq!(reparsed.file, loaded.file);
    }

    #[test]
    fn test_upsert_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        let outcome = upsert(&path, &user("alice"), "h1").unwrap();
        assert_eq!(outcome, UpsertOutcome::Added);
        let loaded = password_file::load(&path).unwrap();
        assert_eq!(loaded.file.lookup("alice"), Some("h1"));
    }

    #[test]
    fn test_upsert_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        upsert(&path, &user("alice"), "h1").unwrap();
        upsert(&path, &user("bob"), "h2").unwrap();
        let outcome = upsert(&path, &user("alice"), "h3").unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        let loaded = password_file::load(&path).unwrap();
        assert_eq!(loaded.file.len(), 2);
        assert_eq!(loaded.file.lookup("alice"), Some("h3"));
    }

    #[test]
    fn test_upsert_drops_malformed_lines_on_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        fs::write(&path, "garbage\nalice=h1\n").unwrap();
        upsert(&path, &user("bob"), "h2").unwrap();
        let loaded = password_file::load(&path).unwrap();
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.file.len(), 2);
    }

    #[test]
    fn test_dropped_stage_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        fs::write(&path, "alice=h1\n").unwrap();

        let staged = stage(&path, "alice=h2\nbob=").unwrap();
        let staged_path = staged.path().to_path_buf();
        drop(staged);

        assert!(!staged_path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "alice=h1\n");
    }

    #[test]
    fn test_stage_in_missing_dir_is_persist_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("passwd");
        let err = stage(&path, "x").unwrap_err();
        assert!(matches!(err, StoreError::Persist { .. }));
    }

    #[test]
    fn test_no_temp_files_left_after_upsert() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        upsert(&path, &user("alice"), "h1").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_keeps_existing_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        fs::write(&path, "alice=h1\n").unwrap();
        store_fs::set_permissions(&path, 0o640).unwrap();
        upsert(&path, &user("bob"), "h2").unwrap();
        assert_eq!(store_fs::file_mode(&path), Some(0o640));
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_private() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passwd");
        upsert(&path, &user("alice"), "h1").unwrap();
        assert_eq!(store_fs::file_mode(&path), Some(constants::PASSWORD_FILE_MODE));
    }
}

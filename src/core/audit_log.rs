//! Append-only audit trail of add-user and verify results.
//!
//! One JSON object per line. Each record carries the SHA-256 of its own
//! canonical form and of the record before it, so edits and deletions in
//! the middle of the log are detectable. Records hold usernames and outcomes
//! only.

use crate::constants;
use crate::core::file_lock::{self, FileLock};
use crate::util::fs as store_fs;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub username: String,
    pub result: AuditResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_hash: Option<String>,
}

/// Handle to an audit log file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    lock_timeout: Duration,
}

fn detect_actor() -> String {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return format!("{}(sudo)", user);
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: constants::LOCK_TIMEOUT,
        }
    }

    /// How long an append waits for another appender before giving up.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record with the current user as actor.
    pub fn record(&self, action: &str, username: &str, result: AuditResult) -> Result<()> {
        self.record_as(action, username, &detect_actor(), result)
    }

    pub fn record_as(
        &self,
        action: &str,
        username: &str,
        actor: &str,
        result: AuditResult,
    ) -> Result<()> {
        let lock_path = file_lock::lock_path_for(&self.path);
        let _lock = FileLock::wait_exclusive(&lock_path, self.lock_timeout)
            .with_context(|| format!("open audit lock {}", lock_path.display()))?
            .with_context(|| {
                format!(
                    "timed out after {:?} waiting for audit lock {}",
                    self.lock_timeout,
                    lock_path.display()
                )
            })?;
        let prev_hash = self.last_entry_hash()?;

        let mut record = AuditRecord {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: actor.to_string(),
            username: username.to_string(),
            result,
            prev_hash,
            entry_hash: None,
        };
        record.entry_hash = Some(compute_entry_hash(&record)?);

        let line = serde_json::to_string(&record).context("serialize audit record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        writeln!(file, "{}", line).context("write audit record")?;
        store_fs::set_permissions(&self.path, constants::AUDIT_LOG_MODE)
            .context("set audit log permissions")?;
        Ok(())
    }

    /// Read records, keeping only the last `limit` if given.
    pub fn read(&self, limit: Option<usize>) -> Result<Vec<AuditRecord>> {
        let (mut records, malformed) = self.read_all()?;
        if malformed > 0 {
            tracing::warn!(
                path = %self.path.display(),
                malformed,
                "skipped malformed audit records"
            );
        }
        if let Some(limit) = limit {
            if records.len() > limit {
                records = records.split_off(records.len() - limit);
            }
        }
        Ok(records)
    }

    /// Check hashes and chaining. Returns (total, errors).
    pub fn verify_chain(&self) -> Result<(usize, Vec<String>)> {
        let (records, malformed) = self.read_all()?;
        let mut errors = Vec::new();
        if malformed > 0 {
            errors.push(format!("{} malformed lines", malformed));
        }

        let mut prev: Option<&String> = None;
        for (i, record) in records.iter().enumerate() {
            if i > 0 && record.prev_hash.as_ref() != prev {
                errors.push(format!("record {}: prev_hash does not match record {}", i + 1, i));
            }
            match &record.entry_hash {
                Some(stored) => {
                    if &compute_entry_hash(record)? != stored {
                        errors.push(format!("record {}: entry_hash mismatch (tampered?)", i + 1));
                    }
                }
                None => errors.push(format!("record {}: missing entry_hash", i + 1)),
            }
            prev = record.entry_hash.as_ref();
        }

        Ok((records.len(), errors))
    }

    fn read_all(&self) -> Result<(Vec<AuditRecord>, usize)> {
        if !self.path.exists() {
            return Ok((Vec::new(), 0));
        }
        let file = fs::File::open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        let mut records = Vec::new();
        let mut malformed = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line.context("read audit log line")?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(_) => malformed += 1,
            }
        }
        Ok((records, malformed))
    }

    /// `entry_hash` of the last parseable record, reading backwards from
    /// the end of the file.
    fn last_entry_hash(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = fs::File::open(&self.path)
            .with_context(|| format!("open audit log {}", self.path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("stat audit log {}", self.path.display()))?
            .len();

        const CHUNK: u64 = 8192;
        let mut offset = len;
        // Bytes not yet scanned; everything after them has been.
        let mut buf = Vec::new();

        while offset > 0 {
            let read_size = CHUNK.min(offset);
            offset -= read_size;
            file.seek(SeekFrom::Start(offset))
                .with_context(|| format!("seek audit log {}", self.path.display()))?;
            let mut chunk = vec![0u8; read_size as usize];
            file.read_exact(&mut chunk)
                .with_context(|| format!("read audit log {}", self.path.display()))?;
            buf.splice(0..0, chunk);

            // The first line may be cut off until the start of the file is reached.
            let start = if offset == 0 {
                0
            } else {
                match buf.iter().position(|b| *b == b'\n') {
                    Some(i) => i + 1,
                    None => continue,
                }
            };
            for line in buf[start..].split(|b| *b == b'\n').rev() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if let Ok(record) = serde_json::from_slice::<AuditRecord>(line) {
                    return Ok(record.entry_hash);
                }
            }
            buf.truncate(start);
        }
        Ok(None)
    }
}

/// SHA-256 over the record's JSON with sorted keys and no `entry_hash`.
fn compute_entry_hash(record: &AuditRecord) -> Result<String> {
    let mut value = serde_json::to_value(record).context("serialize for hash")?;
    if let Some(obj) = value.as_object_mut() {
        obj.remove("entry_hash");
    }
    let canonical =
        serde_json::to_string(&canonicalize(&value)).context("serialize canonical json")?;
    Ok(format!("{:064x}", Sha256::digest(canonical.as_bytes())))
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                out.insert(k.clone(), canonicalize(&map[k]));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ok() -> AuditResult {
        AuditResult {
            success: true,
            error: None,
        }
    }

    fn test_log() -> (TempDir, AuditLog) {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"));
        (dir, log)
    }

    #[test]
    fn test_record_and_read() {
        let (_dir, log) = test_log();
        log.record_as("add-user", "alice", "tester", ok()).unwrap();
        let records = log.read(None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "add-user");
        assert_eq!(records[0].username, "alice");
        assert!(records[0].prev_hash.is_none());
        assert!(records[0].entry_hash.is_some());
    }

    #[test]
    fn test_read_with_limit() {
        let (_dir, log) = test_log();
        for i in 0..5 {
            log.record_as("verify", &format!("user{}", i), "tester", ok()).unwrap();
        }
        let records = log.read(Some(2)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].username, "user4");
    }

    #[test]
    fn test_read_missing_log() {
        let (_dir, log) = test_log();
        assert!(log.read(None).unwrap().is_empty());
    }

    #[test]
    fn test_chain_ok() {
        let (_dir, log) = test_log();
        log.record_as("add-user", "alice", "tester", ok()).unwrap();
        log.record_as(
            "verify",
            "alice",
            "tester",
            AuditResult {
                success: false,
                error: None,
            },
        )
        .unwrap();
        log.record_as("update-user", "alice", "tester", ok()).unwrap();
        let (total, errors) = log.verify_chain().unwrap();
        assert_eq!(total, 3);
        assert!(errors.is_empty(), "errors: {:?}", errors);
    }

    #[test]
    fn test_chain_detects_tamper() {
        let (_dir, log) = test_log();
        log.record_as("add-user", "alice", "tester", ok()).unwrap();
        log.record_as("add-user", "bob", "tester", ok()).unwrap();
        let content = fs::read_to_string(log.path()).unwrap();
        fs::write(log.path(), content.replace("\"bob\"", "\"mallory\"")).unwrap();
        let (total, errors) = log.verify_chain().unwrap();
        assert_eq!(total, 2);
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_chain_detects_deleted_record() {
        let (_dir, log) = test_log();
        for name in ["a", "b", "c"] {
            log.record_as("add-user", name, "tester", ok()).unwrap();
        }
        let content = fs::read_to_string(log.path()).unwrap();
        let kept: Vec<&str> = content
            .lines()
            .enumerate()
            .filter(|(i, _)| *i != 1)
            .map(|(_, l)| l)
            .collect();
        fs::write(log.path(), kept.join("\n")).unwrap();
        let (total, errors) = log.verify_chain().unwrap();
        assert_eq!(total, 2);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_chain_spans_many_read_chunks() {
        let (_dir, log) = test_log();
        let long_name = "x".repeat(10_000);
        log.record_as("add-user", &long_name, "tester", ok()).unwrap();
        for i in 0..100 {
            log.record_as("verify", &format!("user{}", i), "tester", ok()).unwrap();
        }
        log.record_as("verify", &long_name, "tester", ok()).unwrap();
        log.record_as("verify", "last", "tester", ok()).unwrap();
        assert!(fs::metadata(log.path()).unwrap().len() > 3 * 8192);

        let (total, errors) = log.verify_chain().unwrap();
        assert_eq!(total, 103);
        assert!(errors.is_empty(), "errors: {:?}", errors);
    }

    #[test]
    fn test_append_links_past_malformed_tail() {
        let (_dir, log) = test_log();
        log.record_as("add-user", "alice", "tester", ok()).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        writeln!(file, "{{not json").unwrap();
        drop(file);
        log.record_as("verify", "alice", "tester", ok()).unwrap();

        let records = log.read(None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].prev_hash, records[0].entry_hash);
        let (_, errors) = log.verify_chain().unwrap();
        assert_eq!(errors, vec!["1 malformed lines".to_string()]);
    }

    #[test]
    fn test_append_times_out_on_held_audit_lock() {
        let (_dir, log) = test_log();
        let log = log.with_lock_timeout(Duration::from_millis(60));
        let lock_path = file_lock::lock_path_for(log.path());
        let _held = FileLock::try_exclusive(&lock_path).unwrap().unwrap();

        let err = log.record_as("verify", "alice", "tester", ok()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("audit lock"), "{}", message);
        assert!(!message.contains("password file"), "{}", message);
        assert!(!log.path().exists());
    }

    #[test]
    fn test_canonical_json_deterministic() {
        let c1 = canonicalize(&serde_json::json!({"b": 1, "a": 2}));
        let c2 = canonicalize(&serde_json::json!({"a": 2, "b": 1}));
        assert_eq!(serde_json::to_string(&c1).unwrap(), r#"{"a":2,"b":1}"#);
        assert_eq!(c1, c2);
    }
}

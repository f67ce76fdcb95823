//! Append-only migration audit log
//!
//! Every migration and reconciliation attempt — success or failure — is
//! recorded here for auditing and retry diagnostics. Rows are never
//! mutated. The log shares the ledger's RocksDB under the `mig:` key
//! prefix; keys embed a millisecond timestamp plus a process-local
//! sequence number so writes are strictly ordered and never collide.

use chrono::{DateTime, Utc};
use rocksdb::{IteratorMode, WriteOptions, DB};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::ledger::WriteMode;
use crate::errors::{Result, StoreError};
use crate::types::{MigrationAttempt, MigrationStatus};

const MIG_PREFIX: &str = "mig:";

pub struct MigrationLog {
    db: Arc<DB>,
    write_mode: WriteMode,
    seq: AtomicU64,
}

impl MigrationLog {
    pub fn new(db: Arc<DB>, write_mode: WriteMode) -> Self {
        Self {
            db,
            write_mode,
            seq: AtomicU64::new(0),
        }
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.write_mode == WriteMode::Sync);
        write_opts
    }

    /// Append one attempt. The key orders by attempt timestamp, then by
    /// insertion sequence for same-millisecond attempts.
    pub fn append(&self, attempt: &MigrationAttempt) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = format!(
            "{MIG_PREFIX}{:020}:{:06}",
            attempt.timestamp.timestamp_millis(),
            seq
        );
        let value = bincode::serde::encode_to_vec(attempt, bincode::config::standard())
            .map_err(|e| StoreError::Ledger(format!("serialize migration attempt: {e}")))?;
        self.db.put_opt(key.as_bytes(), &value, &self.write_opts())?;
        Ok(())
    }

    /// The most recent `limit` attempts, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<MigrationAttempt>> {
        // `mig;` is the first key past the `mig:` prefix, so a reverse
        // iteration from it walks the log newest-first.
        let upper_bound = "mig;";
        let iter = self.db.iterator(IteratorMode::From(
            upper_bound.as_bytes(),
            rocksdb::Direction::Reverse,
        ));

        let mut attempts = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(MIG_PREFIX.as_bytes()) {
                break;
            }
            attempts.push(decode_attempt(&value)?);
            if attempts.len() >= limit {
                break;
            }
        }
        Ok(attempts)
    }

    /// Failed attempts with a timestamp at or after `since`, newest
    /// first. Walks the log newest-first and stops at the cutoff, so
    /// cost scales with the window, not the log.
    pub fn failures_since(&self, since: DateTime<Utc>) -> Result<Vec<MigrationAttempt>> {
        let upper_bound = "mig;";
        let iter = self.db.iterator(IteratorMode::From(
            upper_bound.as_bytes(),
            rocksdb::Direction::Reverse,
        ));

        let mut failures = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(MIG_PREFIX.as_bytes()) {
                break;
            }
            let attempt = decode_attempt(&value)?;
            if attempt.timestamp < since {
                break;
            }
            if attempt.status == MigrationStatus::Failure {
                failures.push(attempt);
            }
        }
        Ok(failures)
    }
}

fn decode_attempt(data: &[u8]) -> Result<MigrationAttempt> {
    bincode::serde::decode_from_slice::<MigrationAttempt, _>(data, bincode::config::standard())
        .map(|(attempt, _)| attempt)
        .map_err(|e| StoreError::Ledger(format!("deserialize migration attempt: {e}")))
}

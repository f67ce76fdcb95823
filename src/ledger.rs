//! Tracking ledger: durable source of truth for where a vector lives
//!
//! One RocksDB row per (namespace, vector_id, tier) triple, keyed
//! `track:{tier}:{namespace}\u{1f}{id}` with a bincode `TrackingEntry`
//! value. Ids are only unique within a namespace, so the namespace is
//! part of the key; the `\u{1f}` separator cannot appear in either part
//! (validation rejects control characters). Keying by tier first lets
//! the sweep scan a whole tier (expiry, frequency) with a single prefix
//! iteration, while per-vector lookups stay point reads.
//!
//! All read-modify-write mutations go through one conditional-update
//! primitive serialized by a mutex, so a concurrent access-count
//! increment can never be clobbered by a stale demotion write or vice
//! versa.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{IteratorMode, Options, WriteOptions, DB};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::errors::{Result, StoreError};
use crate::types::{StoreStats, Tier, TrackingEntry, VectorId};

/// Helper trait to safely iterate over RocksDB results with error logging.
/// Unlike `.flatten()` which silently ignores errors, this logs them.
trait LogErrors<T> {
    fn log_errors(self) -> impl Iterator<Item = T>;
}

impl<I, T, E> LogErrors<T> for I
where
    I: Iterator<Item = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    fn log_errors(self) -> impl Iterator<Item = T> {
        self.filter_map(|r| match r {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("RocksDB iterator error (continuing): {}", e);
                None
            }
        })
    }
}

/// Write mode for ledger mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// fsync() on every write (durable but slow: 2-10ms per write)
    Sync,
    /// No fsync(), data buffered in OS page cache (fast: <1ms per write).
    /// Data survives process crashes but NOT power loss before next fsync.
    Async,
}

impl Default for WriteMode {
    fn default() -> Self {
        match std::env::var("VECTIER_WRITE_MODE") {
            Ok(mode) if mode.to_lowercase() == "sync" => WriteMode::Sync,
            _ => WriteMode::Async,
        }
    }
}

const TRACK_PREFIX: &str = "track";

fn track_key(tier: Tier, namespace: Option<&str>, id: &VectorId) -> String {
    format!(
        "{TRACK_PREFIX}:{}:{}\u{1f}{}",
        tier.as_str(),
        namespace.unwrap_or(""),
        id
    )
}

fn tier_prefix(tier: Tier) -> String {
    format!("{TRACK_PREFIX}:{}:", tier.as_str())
}

fn encode_entry(entry: &TrackingEntry) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(entry, bincode::config::standard())
        .map_err(|e| StoreError::Ledger(format!("serialize tracking entry: {e}")))
}

fn decode_entry(data: &[u8]) -> Result<TrackingEntry> {
    bincode::serde::decode_from_slice::<TrackingEntry, _>(data, bincode::config::standard())
        .map(|(entry, _)| entry)
        .map_err(|e| StoreError::Ledger(format!("deserialize tracking entry: {e}")))
}

/// Durable tracking table over RocksDB
pub struct TrackingLedger {
    db: Arc<DB>,
    write_mode: WriteMode,
    /// Serializes every read-modify-write so conditional updates never
    /// interleave. Plain reads and scans bypass it.
    mutate: Mutex<()>,
}

impl TrackingLedger {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| StoreError::Ledger(format!("create ledger dir: {e}")))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_max_write_buffer_number(4);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_background_jobs(2);

        let db = Arc::new(DB::open(&opts, path.join("ledger"))?);

        let write_mode = WriteMode::default();
        tracing::info!(
            "Tracking ledger opened at {:?} ({:?} write mode)",
            path,
            write_mode
        );

        Ok(Self {
            db,
            write_mode,
            mutate: Mutex::new(()),
        })
    }

    /// Shared DB handle; the migration log lives in the same database
    /// under its own key prefix.
    pub fn db_handle(&self) -> Arc<DB> {
        Arc::clone(&self.db)
    }

    /// Write mode shared with the migration log
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.write_mode == WriteMode::Sync);
        write_opts
    }

    /// The conditional-update primitive: fetch the current entry for
    /// (namespace, id, tier), apply `f`, and persist the result, all
    /// under the mutation lock. `f` returning `None` deletes the row.
    ///
    /// Both the tiered store and the migration engine mutate tracking
    /// state exclusively through this, which is what makes their
    /// concurrent updates safe.
    pub fn update_entry<F>(
        &self,
        id: &VectorId,
        namespace: Option<&str>,
        tier: Tier,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(Option<TrackingEntry>) -> Option<TrackingEntry>,
    {
        let _guard = self.mutate.lock();
        let key = track_key(tier, namespace, id);
        let current = match self.db.get(key.as_bytes())? {
            Some(bytes) => Some(decode_entry(&bytes)?),
            None => None,
        };
        match f(current) {
            Some(updated) => {
                let value = encode_entry(&updated)?;
                self.db.put_opt(key.as_bytes(), &value, &self.write_opts())?;
            }
            None => {
                self.db.delete_opt(key.as_bytes(), &self.write_opts())?;
            }
        }
        Ok(())
    }

    /// Mark a vector present in a tier, preserving access statistics when
    /// an entry already exists. The expiry is always refreshed.
    pub fn upsert_presence(
        &self,
        id: &VectorId,
        namespace: Option<&str>,
        tier: Tier,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let owned_ns = namespace.map(str::to_string);
        self.update_entry(id, namespace, tier, |current| match current {
            Some(mut entry) => {
                entry.expires_at = expires_at;
                Some(entry)
            }
            None => Some(TrackingEntry::new(id.clone(), owned_ns, tier, expires_at)),
        })
    }

    /// Remove the presence row for (namespace, id, tier). Only called
    /// after the tier's own delete has succeeded.
    pub fn clear_presence(&self, id: &VectorId, namespace: Option<&str>, tier: Tier) -> Result<()> {
        self.update_entry(id, namespace, tier, |_| None)
    }

    /// Record one read hit against a tier copy.
    ///
    /// A missing row for a durable tier is created on the fly (the read
    /// proved the copy exists); a missing cache row is left for
    /// reconciliation rather than guessed at, since its expiry is
    /// unknown here.
    pub fn record_access(&self, id: &VectorId, namespace: Option<&str>, tier: Tier) -> Result<()> {
        let owned_ns = namespace.map(str::to_string);
        self.update_entry(id, namespace, tier, |current| {
            let now = Utc::now();
            match current {
                Some(mut entry) => {
                    entry.access_count += 1;
                    entry.last_accessed_at = Some(now);
                    Some(entry)
                }
                None if tier.is_durable() => {
                    let mut entry = TrackingEntry::new(id.clone(), owned_ns, tier, None);
                    entry.access_count = 1;
                    entry.last_accessed_at = Some(now);
                    Some(entry)
                }
                None => {
                    tracing::debug!(
                        vector_id = %id,
                        tier = tier.as_str(),
                        "access to untracked cache copy, leaving for reconciliation"
                    );
                    None
                }
            }
        })
    }

    /// Fetch the tracking entry for (namespace, id, tier)
    pub fn entry(
        &self,
        id: &VectorId,
        namespace: Option<&str>,
        tier: Tier,
    ) -> Result<Option<TrackingEntry>> {
        match self.db.get(track_key(tier, namespace, id).as_bytes())? {
            Some(bytes) => Ok(Some(decode_entry(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Existence probe: every tier the ledger claims holds this vector,
    /// slowest first.
    pub fn tier_set(&self, id: &VectorId, namespace: Option<&str>) -> Result<Vec<Tier>> {
        let mut tiers = Vec::new();
        for tier in Tier::ALL {
            if self
                .db
                .get(track_key(tier, namespace, id).as_bytes())?
                .is_some()
            {
                tiers.push(tier);
            }
        }
        Ok(tiers)
    }

    /// Entries in `tier` whose TTL has passed
    pub fn expired_entries(&self, tier: Tier, now: DateTime<Utc>) -> Result<Vec<TrackingEntry>> {
        Ok(self
            .scan_tier(tier)?
            .into_iter()
            .filter(|entry| entry.is_expired(now))
            .collect())
    }

    /// All entries for one tier
    pub fn entries_for_tier(&self, tier: Tier) -> Result<Vec<TrackingEntry>> {
        self.scan_tier(tier)
    }

    fn scan_tier(&self, tier: Tier) -> Result<Vec<TrackingEntry>> {
        let prefix = tier_prefix(tier);
        let iter = self.db.iterator(IteratorMode::From(
            prefix.as_bytes(),
            rocksdb::Direction::Forward,
        ));

        let mut entries = Vec::new();
        for (key, value) in iter.log_errors() {
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            entries.push(decode_entry(&value)?);
        }
        Ok(entries)
    }

    /// Distinct (namespace, vector id) pairs referenced by any ledger
    /// entry
    pub fn all_vectors(&self) -> Result<Vec<(Option<String>, VectorId)>> {
        let mut vectors = BTreeSet::new();
        for tier in Tier::ALL {
            for entry in self.scan_tier(tier)? {
                vectors.insert((entry.namespace, entry.vector_id));
            }
        }
        Ok(vectors.into_iter().collect())
    }

    /// Tracked-vector counts per tier
    pub fn tier_counts(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        let mut distinct = BTreeSet::new();
        for tier in Tier::ALL {
            let entries = self.scan_tier(tier)?;
            let count = entries.len() as u64;
            match tier {
                Tier::Authoritative => stats.authoritative_count = count,
                Tier::Cold => stats.cold_count = count,
                Tier::Warm => stats.warm_count = count,
                Tier::Hot => stats.hot_count = count,
            }
            for entry in entries {
                distinct.insert((entry.namespace, entry.vector_id));
            }
        }
        stats.distinct_vectors = distinct.len() as u64;
        Ok(stats)
    }

    /// Roll access-frequency windows: entries whose window started more
    /// than `window` ago get their counter reset and window restarted.
    /// Returns the number of entries rolled.
    pub fn roll_windows(&self, window: chrono::Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut rolled = 0u64;
        for tier in Tier::ALL {
            let stale: Vec<(Option<String>, VectorId)> = self
                .scan_tier(tier)?
                .into_iter()
                .filter(|e| now - e.window_started_at > window)
                .map(|e| (e.namespace, e.vector_id))
                .collect();
            for (ns, id) in stale {
                self.update_entry(&id, ns.as_deref(), tier, |current| {
                    current.map(|mut entry| {
                        entry.access_count = 0;
                        entry.window_started_at = now;
                        entry
                    })
                })?;
                rolled += 1;
            }
        }
        Ok(rolled)
    }

    /// Flush RocksDB memtables; call during shutdown
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_ledger() -> (TrackingLedger, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let ledger = TrackingLedger::open(dir.path()).expect("open ledger");
        (ledger, dir)
    }

    #[test]
    fn test_upsert_and_tier_set() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");

        ledger.upsert_presence(&id, None, Tier::Authoritative, None).expect("upsert");
        ledger.upsert_presence(&id, None, Tier::Cold, None).expect("upsert");
        ledger
            .upsert_presence(&id, None, Tier::Hot, Some(Utc::now() + chrono::Duration::hours(1)))
            .expect("upsert");

        let tiers = ledger.tier_set(&id, None).expect("tier_set");
        assert_eq!(tiers, vec![Tier::Authoritative, Tier::Cold, Tier::Hot]);
    }

    #[test]
    fn test_same_id_in_two_namespaces_is_two_rows() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");

        ledger
            .upsert_presence(&id, Some("ns-a"), Tier::Cold, None)
            .expect("upsert");
        ledger
            .upsert_presence(&id, Some("ns-b"), Tier::Cold, None)
            .expect("upsert");
        ledger.record_access(&id, Some("ns-a"), Tier::Cold).expect("access");

        // Access stats and presence stay scoped to their namespace
        let a = ledger.entry(&id, Some("ns-a"), Tier::Cold).expect("entry").expect("present");
        let b = ledger.entry(&id, Some("ns-b"), Tier::Cold).expect("entry").expect("present");
        assert_eq!(a.access_count, 1);
        assert_eq!(b.access_count, 0);
        assert_eq!(a.namespace.as_deref(), Some("ns-a"));
        assert_eq!(b.namespace.as_deref(), Some("ns-b"));

        ledger.clear_presence(&id, Some("ns-a"), Tier::Cold).expect("clear");
        assert!(ledger.entry(&id, Some("ns-a"), Tier::Cold).expect("entry").is_none());
        assert!(ledger.tier_set(&id, Some("ns-b")).expect("tier_set").contains(&Tier::Cold));

        let vectors = ledger.all_vectors().expect("all_vectors");
        assert_eq!(vectors, vec![(Some("ns-b".to_string()), id)]);
    }

    #[test]
    fn test_upsert_preserves_access_stats() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");

        ledger.upsert_presence(&id, None, Tier::Cold, None).expect("upsert");
        ledger.record_access(&id, None, Tier::Cold).expect("access");
        ledger.record_access(&id, None, Tier::Cold).expect("access");

        // Re-upsert (e.g. an idempotent re-write) must not reset counters
        ledger.upsert_presence(&id, None, Tier::Cold, None).expect("upsert");
        let entry = ledger.entry(&id, None, Tier::Cold).expect("entry").expect("present");
        assert_eq!(entry.access_count, 2);
    }

    #[test]
    fn test_clear_presence() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");

        ledger.upsert_presence(&id, None, Tier::Warm, None).expect("upsert");
        ledger.clear_presence(&id, None, Tier::Warm).expect("clear");
        assert!(ledger.entry(&id, None, Tier::Warm).expect("entry").is_none());
    }

    #[test]
    fn test_record_access_creates_durable_entry() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");

        ledger.record_access(&id, None, Tier::Cold).expect("access");
        let entry = ledger.entry(&id, None, Tier::Cold).expect("entry").expect("created");
        assert_eq!(entry.access_count, 1);
        assert!(entry.last_accessed_at.is_some());
    }

    #[test]
    fn test_record_access_skips_untracked_cache() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");

        ledger.record_access(&id, None, Tier::Hot).expect("access");
        assert!(ledger.entry(&id, None, Tier::Hot).expect("entry").is_none());
    }

    #[test]
    fn test_expired_entries_scoped_to_tier() {
        let (ledger, _dir) = open_ledger();
        let past = Utc::now() - chrono::Duration::minutes(5);
        let future = Utc::now() + chrono::Duration::hours(1);

        ledger
            .upsert_presence(&VectorId::from("old"), None, Tier::Hot, Some(past))
            .expect("upsert");
        ledger
            .upsert_presence(&VectorId::from("fresh"), None, Tier::Hot, Some(future))
            .expect("upsert");
        ledger
            .upsert_presence(&VectorId::from("warm-old"), None, Tier::Warm, Some(past))
            .expect("upsert");

        let expired = ledger.expired_entries(Tier::Hot, Utc::now()).expect("scan");
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].vector_id, VectorId::from("old"));
    }

    #[test]
    fn test_tier_counts() {
        let (ledger, _dir) = open_ledger();
        for i in 0..3 {
            let id = VectorId::from(format!("v{i}").as_str());
            ledger.upsert_presence(&id, None, Tier::Authoritative, None).expect("upsert");
            ledger.upsert_presence(&id, None, Tier::Cold, None).expect("upsert");
        }
        ledger
            .upsert_presence(&VectorId::from("v0"), None, Tier::Hot, None)
            .expect("upsert");

        let stats = ledger.tier_counts().expect("counts");
        assert_eq!(stats.authoritative_count, 3);
        assert_eq!(stats.cold_count, 3);
        assert_eq!(stats.hot_count, 1);
        assert_eq!(stats.warm_count, 0);
        assert_eq!(stats.distinct_vectors, 3);
    }

    #[test]
    fn test_roll_windows_resets_stale_counters() {
        let (ledger, _dir) = open_ledger();
        let id = VectorId::from("v1");
        let now = Utc::now();

        ledger.upsert_presence(&id, None, Tier::Cold, None).expect("upsert");
        for _ in 0..10 {
            ledger.record_access(&id, None, Tier::Cold).expect("access");
        }
        // Backdate the window start past the window length
        ledger
            .update_entry(&id, None, Tier::Cold, |current| {
                current.map(|mut e| {
                    e.window_started_at = now - chrono::Duration::hours(48);
                    e
                })
            })
            .expect("backdate");

        let rolled = ledger
            .roll_windows(chrono::Duration::hours(24), now)
            .expect("roll");
        assert_eq!(rolled, 1);

        let entry = ledger.entry(&id, None, Tier::Cold).expect("entry").expect("present");
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.window_started_at, now);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let id = VectorId::from("v1");
        {
            let ledger = TrackingLedger::open(dir.path()).expect("open");
            ledger.upsert_presence(&id, None, Tier::Cold, None).expect("upsert");
            ledger.flush().expect("flush");
        }
        {
            let ledger = TrackingLedger::open(dir.path()).expect("reopen");
            assert!(ledger.entry(&id, None, Tier::Cold).expect("entry").is_some());
        }
    }
}

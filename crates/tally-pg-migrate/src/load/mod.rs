//! Batch loader: dependency-staged, chunked, retrying writes.
//!
//! Kinds load stage by stage in dependency order; kinds within a stage are
//! independent and run on concurrent workers capped by a semaphore. Writes
//! go out in fixed-size chunks, each committing atomically. A transient
//! failure gets bounded retries with doubling backoff; a chunk that still
//! fails is marked failed, its records reported fatal, and the remaining
//! chunks proceed. Surrogate ids learned from committed chunks feed the
//! resolver cache at each stage boundary so dependent stages see them.

use crate::config::MigrationConfig;
use crate::entity::{EntityKind, EntryRecord, MasterRecord, Snapshot, VoucherRecord, LOAD_STAGES};
use crate::error::{MigrateError, Result};
use crate::report::{LoadCounts, RecordIssue};
use crate::resolve::ResolverCache;
use crate::target::{StoredKey, TargetStore, UpsertStats};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

/// Aggregated result of the load phase.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub counts: BTreeMap<EntityKind, LoadCounts>,
    pub issues: Vec<RecordIssue>,
}

impl LoadOutcome {
    pub fn failed_total(&self) -> u64 {
        self.counts.values().map(|c| c.failed).sum()
    }
}

/// What one worker writes: the records of a single kind.
enum Workload {
    Masters(Vec<MasterRecord>),
    Vouchers(Vec<VoucherRecord>),
    Entries(Vec<EntryRecord>),
}

impl Workload {
    fn is_empty(&self) -> bool {
        match self {
            Workload::Masters(r) => r.is_empty(),
            Workload::Vouchers(r) => r.is_empty(),
            Workload::Entries(r) => r.is_empty(),
        }
    }
}

/// Per-kind worker result: counters, ids to teach the cache, fatal issues
/// from failed chunks.
#[derive(Debug, Default)]
struct KindResult {
    counts: LoadCounts,
    /// (guid, name, id) triples learned from committed rows.
    learned: Vec<(String, String, i64)>,
    issues: Vec<RecordIssue>,
}

/// Stage-ordered chunked loader.
pub struct BatchLoader {
    store: Arc<dyn TargetStore>,
    chunk_size: usize,
    max_retries: u32,
    backoff_ms: u64,
    workers: usize,
    cancel: watch::Receiver<bool>,
}

impl BatchLoader {
    pub fn new(
        store: Arc<dyn TargetStore>,
        config: &MigrationConfig,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            chunk_size: config.get_chunk_size(),
            max_retries: config.get_max_retries(),
            backoff_ms: config.get_retry_backoff_ms(),
            workers: config.get_load_workers(),
            cancel,
        }
    }

    /// Load an accepted snapshot. The snapshot's pending foreign keys are
    /// filled in as the stages that produce them commit.
    pub async fn run(
        &self,
        snapshot: &mut Snapshot,
        cache: &mut ResolverCache,
    ) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();

        for (stage_no, stage) in LOAD_STAGES.iter().enumerate() {
            if *self.cancel.borrow() {
                return Err(MigrateError::Cancelled);
            }

            // Ids committed by earlier stages are in the cache by now.
            cache.resolve_snapshot_refs(snapshot);

            let semaphore = Arc::new(Semaphore::new(self.workers));
            let mut handles = Vec::new();

            for kind in stage.iter().copied() {
                let workload = collect_workload(snapshot, kind, &mut outcome);
                if workload.is_empty() {
                    continue;
                }

                let semaphore = semaphore.clone();
                let store = self.store.clone();
                let cancel = self.cancel.clone();
                let (chunk_size, max_retries, backoff_ms) =
                    (self.chunk_size, self.max_retries, self.backoff_ms);

                handles.push(tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| MigrateError::persistence(kind.to_string(), e.to_string()))?;
                    load_kind(store, kind, workload, chunk_size, max_retries, backoff_ms, cancel)
                        .await
                }));
            }

            for handle in handles {
                let (kind, result) = handle
                    .await
                    .map_err(|e| MigrateError::persistence("load worker", e.to_string()))??;

                for (guid, name, id) in &result.learned {
                    cache.learn(kind, guid, name, Some(*id));
                }
                outcome.counts.entry(kind).or_default().merge(result.counts);
                outcome.issues.extend(result.issues);
            }

            debug!("load stage {} committed", stage_no + 1);

            // Hierarchical masters commit in the first stage with pending
            // parent ids; patch them now that every row has an id.
            if stage_no == 0 {
                self.patch_hierarchies(snapshot, cache).await?;
            }
        }

        info!(
            "load complete: {} kinds written, {} records failed",
            outcome.counts.len(),
            outcome.failed_total()
        );
        Ok(outcome)
    }

    /// Second pass over self-referential kinds: set parent ids that were
    /// unknown when the rows were first written.
    async fn patch_hierarchies(
        &self,
        snapshot: &Snapshot,
        cache: &ResolverCache,
    ) -> Result<()> {
        for master in &snapshot.masters {
            if !master.kind.is_hierarchical()
                || master.parent_name.is_empty()
                || master.parent_id.is_some()
            {
                continue;
            }
            let child = cache.resolve(master.kind, &master.guid).id;
            let parent = cache.resolve(master.kind, &master.parent_name).id;
            if let (Some(child_id), Some(parent_id)) = (child, parent) {
                self.store
                    .patch_parent(master.kind, child_id, parent_id)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Pull one kind's records out of the snapshot. Records whose mandatory
/// reference never got an id by the time their stage starts (the
/// referenced row was excluded or its chunk failed) cannot be written and
/// are counted failed here: vouchers need their voucher type, entries
/// their parent voucher.
fn collect_workload(snapshot: &Snapshot, kind: EntityKind, outcome: &mut LoadOutcome) -> Workload {
    if kind == EntityKind::Voucher {
        let mut ready = Vec::new();
        for voucher in &snapshot.vouchers {
            if voucher.voucher_type_id.is_none() {
                outcome.issues.push(RecordIssue::fatal(
                    kind,
                    voucher.guid.clone(),
                    format!("voucher type '{}' was not persisted", voucher.voucher_type),
                ));
                outcome.counts.entry(kind).or_default().failed += 1;
            } else {
                ready.push(voucher.clone());
            }
        }
        return Workload::Vouchers(ready);
    }
    if kind.is_entry() {
        let mut ready = Vec::new();
        for entry in snapshot.entries_of(kind) {
            if entry.voucher_id.is_none() {
                outcome.issues.push(RecordIssue::fatal(
                    kind,
                    entry.guid.clone(),
                    format!("parent voucher '{}' was not persisted", entry.voucher_guid),
                ));
                outcome.counts.entry(kind).or_default().failed += 1;
            } else {
                ready.push(entry.clone());
            }
        }
        return Workload::Entries(ready);
    }
    Workload::Masters(snapshot.masters_of(kind).cloned().collect())
}

/// Write every chunk of one kind, serially within the kind.
async fn load_kind(
    store: Arc<dyn TargetStore>,
    kind: EntityKind,
    workload: Workload,
    chunk_size: usize,
    max_retries: u32,
    backoff_ms: u64,
    cancel: watch::Receiver<bool>,
) -> Result<(EntityKind, KindResult)> {
    let mut result = KindResult::default();

    match &workload {
        Workload::Masters(records) => {
            for chunk in records.chunks(chunk_size) {
                if *cancel.borrow() {
                    return Err(MigrateError::Cancelled);
                }
                let keys: Vec<(String, String)> = chunk
                    .iter()
                    .map(|r| (r.guid.clone(), r.name.clone()))
                    .collect();
                let written = upsert_with_retry(
                    &store,
                    kind,
                    || store.upsert_masters(kind, chunk),
                    max_retries,
                    backoff_ms,
                )
                .await;
                apply_chunk(kind, written, keys, &mut result)?;
            }
        }
        Workload::Vouchers(records) => {
            for chunk in records.chunks(chunk_size) {
                if *cancel.borrow() {
                    return Err(MigrateError::Cancelled);
                }
                let keys: Vec<(String, String)> = chunk
                    .iter()
                    .map(|r| (r.guid.clone(), String::new()))
                    .collect();
                let written = upsert_with_retry(
                    &store,
                    kind,
                    || store.upsert_vouchers(chunk),
                    max_retries,
                    backoff_ms,
                )
                .await;
                apply_chunk(kind, written, keys, &mut result)?;
            }
        }
        Workload::Entries(records) => {
            for chunk in records.chunks(chunk_size) {
                if *cancel.borrow() {
                    return Err(MigrateError::Cancelled);
                }
                let keys: Vec<(String, String)> = chunk
                    .iter()
                    .map(|r| (r.guid.clone(), String::new()))
                    .collect();
                let written = upsert_with_retry(
                    &store,
                    kind,
                    || store.upsert_entries(kind, chunk),
                    max_retries,
                    backoff_ms,
                )
                .await;
                apply_chunk(kind, written, keys, &mut result)?;
            }
        }
    }

    Ok((kind, result))
}

/// Fold one chunk's outcome into the kind result. A failed chunk marks its
/// records fatal and lets the next chunk proceed; cancellation propagates.
fn apply_chunk(
    kind: EntityKind,
    written: Result<(UpsertStats, Vec<StoredKey>)>,
    keys: Vec<(String, String)>,
    result: &mut KindResult,
) -> Result<()> {
    match written {
        Ok((stats, refreshed)) => {
            result.counts.inserted += stats.inserted;
            result.counts.updated += stats.updated;
            for key in refreshed {
                result.learned.push((key.guid, key.name, key.id));
            }
            for (guid, id) in stats.ids {
                let name = keys
                    .iter()
                    .find(|(g, _)| g == &guid)
                    .map(|(_, n)| n.clone())
                    .unwrap_or_default();
                result.learned.push((guid, name, id));
            }
            Ok(())
        }
        Err(MigrateError::Cancelled) => Err(MigrateError::Cancelled),
        Err(e) => {
            warn!("{}: chunk of {} failed permanently: {}", kind, keys.len(), e);
            result.counts.failed += keys.len() as u64;
            for (guid, _) in keys {
                result.issues.push(RecordIssue::fatal(
                    kind,
                    guid,
                    format!("write failed after retries: {}", e),
                ));
            }
            Ok(())
        }
    }
}

/// Run one chunk write with the retry policy: doubling backoff for
/// transient failures, and a single immediate retry after a key-map refresh
/// when the store reports a uniqueness conflict the validator did not see
/// (a concurrent external writer). The refreshed keys are surfaced so the
/// cache can absorb the externally created rows.
async fn upsert_with_retry<F, Fut>(
    store: &Arc<dyn TargetStore>,
    kind: EntityKind,
    op: F,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<(UpsertStats, Vec<StoredKey>)>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<UpsertStats>>,
{
    let mut refreshed = Vec::new();
    let mut conflict_retried = false;
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(stats) => return Ok((stats, refreshed)),
            Err(e) if e.is_unique_violation() && !conflict_retried => {
                conflict_retried = true;
                warn!("{}: uniqueness conflict, refreshing key map and retrying once", kind);
                refreshed = store.fetch_key_map(kind).await?;
            }
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = backoff_ms.saturating_mul(1u64 << attempt.min(16));
                warn!(
                    "{}: transient failure (attempt {}/{}): {}; retrying in {}ms",
                    kind,
                    attempt + 1,
                    max_retries,
                    e,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn test_config() -> MigrationConfig {
        MigrationConfig {
            chunk_size: Some(2),
            max_retries: Some(2),
            retry_backoff_ms: Some(1),
            ..Default::default()
        }
    }

    fn master(kind: EntityKind, guid: &str, name: &str, parent: &str) -> MasterRecord {
        MasterRecord {
            kind,
            guid: guid.into(),
            name: name.into(),
            alias: String::new(),
            parent_name: parent.into(),
            parent_id: None,
            description: String::new(),
        }
    }

    fn voucher(guid: &str, vtype: &str) -> VoucherRecord {
        VoucherRecord {
            guid: guid.into(),
            date: NaiveDate::from_ymd_opt(2025, 4, 1),
            voucher_type: vtype.into(),
            voucher_type_id: None,
            voucher_number: "1".into(),
            party_name: String::new(),
            party_ledger_id: None,
            narration: String::new(),
            reference: String::new(),
            amount: Decimal::new(10000, 2),
            is_invoice: false,
            affects_inventory: false,
        }
    }

    fn full_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot
            .masters
            .push(master(EntityKind::VoucherType, "VT1", "Payment", ""));
        snapshot
            .masters
            .push(master(EntityKind::Ledger, "L1", "Cash", ""));
        snapshot.vouchers.push(voucher("V1", "Payment"));

        let mut entry = EntryRecord::new(EntityKind::LedgerEntry, "V1-le-0".into(), "V1".into());
        entry.ref_name = "Cash".into();
        entry.amount = Decimal::new(10000, 2);
        snapshot.entries.push(entry);
        snapshot
    }

    fn loader(store: &Arc<MemoryStore>) -> (BatchLoader, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let store: Arc<dyn TargetStore> = store.clone();
        let loader = BatchLoader::new(store, &test_config(), rx);
        (loader, tx)
    }

    #[tokio::test]
    async fn test_staged_load_fills_foreign_keys() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);

        let mut snapshot = full_snapshot();
        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);

        let outcome = loader.run(&mut snapshot, &mut cache).await.unwrap();
        assert_eq!(outcome.failed_total(), 0);
        assert!(outcome.issues.is_empty());

        let vt_id = store.master_id(EntityKind::VoucherType, "VT1").unwrap();
        let ledger_id = store.master_id(EntityKind::Ledger, "L1").unwrap();
        let voucher_id = store.voucher_id("V1").unwrap();

        let stored_voucher = store.voucher("V1").unwrap();
        assert_eq!(stored_voucher.voucher_type_id, Some(vt_id));

        let stored_entry = store.entry(EntityKind::LedgerEntry, "V1-le-0").unwrap();
        assert_eq!(stored_entry.voucher_id, Some(voucher_id));
        assert_eq!(stored_entry.ref_id, Some(ledger_id));
    }

    #[tokio::test]
    async fn test_rerun_reports_no_changes() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);

        let mut snapshot = full_snapshot();
        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);
        let first = loader.run(&mut snapshot, &mut cache).await.unwrap();
        assert_eq!(first.counts[&EntityKind::Voucher].inserted, 1);

        // Same snapshot again, cache seeded the way a fresh run would be
        let mut snapshot = full_snapshot();
        let mut cache = ResolverCache::seed_from_store(store.as_ref(), &crate::entity::MASTER_KINDS)
            .await
            .unwrap();
        for key in store.fetch_key_map(EntityKind::Voucher).await.unwrap() {
            cache.learn(EntityKind::Voucher, &key.guid, "", Some(key.id));
        }
        cache.learn_snapshot_masters(&snapshot);

        let second = loader.run(&mut snapshot, &mut cache).await.unwrap();
        for counts in second.counts.values() {
            assert_eq!(counts.inserted, 0);
            assert_eq!(counts.updated, 0);
            assert_eq!(counts.failed, 0);
        }
    }

    #[tokio::test]
    async fn test_hierarchy_parent_patched_second_pass() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);

        let mut snapshot = Snapshot::default();
        snapshot
            .masters
            .push(master(EntityKind::Group, "G1", "Primary", ""));
        snapshot
            .masters
            .push(master(EntityKind::Group, "G2", "Child", "Primary"));

        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);
        loader.run(&mut snapshot, &mut cache).await.unwrap();

        let parent_id = store.master_id(EntityKind::Group, "G1").unwrap();
        assert_eq!(
            store.master(EntityKind::Group, "G2").unwrap().parent_id,
            Some(parent_id)
        );
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);
        store.fail_next_writes(1);

        let mut snapshot = Snapshot::default();
        snapshot
            .masters
            .push(master(EntityKind::Group, "G1", "Primary", ""));

        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);
        let outcome = loader.run(&mut snapshot, &mut cache).await.unwrap();

        assert_eq!(outcome.counts[&EntityKind::Group].inserted, 1);
        assert_eq!(outcome.failed_total(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_chunk_and_continue() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);
        // max_retries = 2, so 3 failures exhaust the first chunk's budget
        store.fail_next_writes(3);

        // chunk_size = 2: two chunks for one kind
        let mut snapshot = Snapshot::default();
        snapshot
            .masters
            .push(master(EntityKind::Group, "G1", "A", ""));
        snapshot
            .masters
            .push(master(EntityKind::Group, "G2", "B", ""));
        snapshot
            .masters
            .push(master(EntityKind::Group, "G3", "C", ""));

        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);
        let outcome = loader.run(&mut snapshot, &mut cache).await.unwrap();

        let counts = &outcome.counts[&EntityKind::Group];
        assert_eq!(counts.failed, 2);
        assert_eq!(counts.inserted, 1);
        assert_eq!(outcome.issues.len(), 2);
        assert!(store.master(EntityKind::Group, "G3").is_some());
    }

    #[tokio::test]
    async fn test_cancellation_stops_run() {
        let store = Arc::new(MemoryStore::new());
        let (loader, tx) = loader(&store);
        tx.send(true).unwrap();

        let mut snapshot = full_snapshot();
        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);

        let err = loader.run(&mut snapshot, &mut cache).await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
    }

    #[tokio::test]
    async fn test_voucher_with_unpersisted_type_counted_failed() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);

        // The voucher type master was excluded before load, so the cache
        // only knows the name with a pending id that never materializes.
        let mut snapshot = Snapshot::default();
        snapshot.vouchers.push(voucher("V1", "Payment"));
        let mut cache = ResolverCache::new();
        cache.learn(EntityKind::VoucherType, "", "Payment", None);

        let outcome = loader.run(&mut snapshot, &mut cache).await.unwrap();

        assert!(store.voucher("V1").is_none());
        assert_eq!(outcome.counts[&EntityKind::Voucher].failed, 1);
        let issue = &outcome.issues[0];
        assert_eq!(issue.natural_key, "V1");
        assert!(issue.reason.contains("'Payment' was not persisted"));
    }

    /// Flips the cancellation signal once the first chunk has committed.
    struct CancelAfterFirstWrite {
        inner: MemoryStore,
        tx: watch::Sender<bool>,
    }

    #[async_trait::async_trait]
    impl TargetStore for CancelAfterFirstWrite {
        async fn fetch_key_map(&self, kind: EntityKind) -> Result<Vec<StoredKey>> {
            self.inner.fetch_key_map(kind).await
        }

        async fn upsert_masters(
            &self,
            kind: EntityKind,
            records: &[MasterRecord],
        ) -> Result<UpsertStats> {
            let stats = self.inner.upsert_masters(kind, records).await?;
            let _ = self.tx.send(true);
            Ok(stats)
        }

        async fn upsert_vouchers(&self, records: &[VoucherRecord]) -> Result<UpsertStats> {
            self.inner.upsert_vouchers(records).await
        }

        async fn upsert_entries(
            &self,
            kind: EntityKind,
            records: &[EntryRecord],
        ) -> Result<UpsertStats> {
            self.inner.upsert_entries(kind, records).await
        }

        async fn patch_parent(
            &self,
            kind: EntityKind,
            child_id: i64,
            parent_id: i64,
        ) -> Result<()> {
            self.inner.patch_parent(kind, child_id, parent_id).await
        }

        async fn count_rows(&self, kind: EntityKind) -> Result<u64> {
            self.inner.count_rows(kind).await
        }

        async fn count_dangling_entries(&self, kind: EntityKind) -> Result<u64> {
            self.inner.count_dangling_entries(kind).await
        }
    }

    #[tokio::test]
    async fn test_cancel_between_chunks_keeps_whole_chunks() {
        let (tx, rx) = watch::channel(false);
        let store = Arc::new(CancelAfterFirstWrite {
            inner: MemoryStore::new(),
            tx,
        });
        let dyn_store: Arc<dyn TargetStore> = store.clone();
        let loader = BatchLoader::new(dyn_store, &test_config(), rx);

        // chunk_size = 2: G1/G2 commit, then the boundary check fires
        let mut snapshot = Snapshot::default();
        snapshot.masters.push(master(EntityKind::Group, "G1", "A", ""));
        snapshot.masters.push(master(EntityKind::Group, "G2", "B", ""));
        snapshot.masters.push(master(EntityKind::Group, "G3", "C", ""));

        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);
        let err = loader.run(&mut snapshot, &mut cache).await.unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));

        // The committed chunk is intact, the next one was never started
        assert_eq!(store.inner.count_rows(EntityKind::Group).await.unwrap(), 2);
        assert!(store.inner.master(EntityKind::Group, "G2").is_some());
        assert!(store.inner.master(EntityKind::Group, "G3").is_none());
    }

    #[tokio::test]
    async fn test_unique_conflict_refreshes_keys_and_retries_once() {
        let store = Arc::new(MemoryStore::new());

        // Row created by a concurrent writer before our chunk lands
        store
            .upsert_masters(EntityKind::Group, &[master(EntityKind::Group, "G0", "External", "")])
            .await
            .unwrap();
        store.conflict_next_writes(1);

        let (loader, _tx) = loader(&store);
        let mut snapshot = Snapshot::default();
        snapshot
            .masters
            .push(master(EntityKind::Group, "G1", "Primary", ""));

        let mut cache = ResolverCache::new();
        cache.learn_snapshot_masters(&snapshot);
        let outcome = loader.run(&mut snapshot, &mut cache).await.unwrap();

        // One conflict, one key-map refresh, then the chunk lands
        assert_eq!(outcome.counts[&EntityKind::Group].inserted, 1);
        assert_eq!(outcome.failed_total(), 0);
        assert!(outcome.issues.is_empty());
        assert!(store.master(EntityKind::Group, "G1").is_some());

        // The refreshed key map taught the cache the external row
        let external_id = store.master_id(EntityKind::Group, "G0").unwrap();
        assert_eq!(
            cache.resolve(EntityKind::Group, "External").id,
            Some(external_id)
        );
    }

    #[tokio::test]
    async fn test_entry_with_failed_voucher_counted_failed() {
        let store = Arc::new(MemoryStore::new());
        let (loader, _tx) = loader(&store);

        // Entry references a voucher that is in no batch and no store
        let mut snapshot = Snapshot::default();
        let entry = EntryRecord::new(EntityKind::LedgerEntry, "E1".into(), "V-missing".into());
        snapshot.entries.push(entry);

        let mut cache = ResolverCache::new();
        let outcome = loader.run(&mut snapshot, &mut cache).await.unwrap();

        assert_eq!(outcome.counts[&EntityKind::LedgerEntry].failed, 1);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].reason.contains("was not persisted"));
    }
}

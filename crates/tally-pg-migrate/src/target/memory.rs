//! In-memory target store.
//!
//! Mirrors the Postgres store's observable semantics: GUID-keyed upserts,
//! unchanged rows count as neither insert nor update, ids are assigned once
//! and stable across re-runs. Backs the test suite and dry runs; a failure
//! budget can be armed to exercise the loader's retry path.

use crate::entity::{EntityKind, EntryRecord, MasterRecord, VoucherRecord};
use crate::error::{MigrateError, Result};
use crate::target::{StoredKey, TargetStore, UpsertStats};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    masters: BTreeMap<EntityKind, BTreeMap<String, (i64, MasterRecord)>>,
    vouchers: BTreeMap<String, (i64, VoucherRecord)>,
    entries: BTreeMap<EntityKind, BTreeMap<String, (i64, EntryRecord)>>,
    /// Remaining write calls to fail with a transient error.
    fail_budget: u32,
    /// Remaining write calls to fail with a uniqueness conflict.
    conflict_budget: u32,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_failure(&mut self) -> bool {
        if self.fail_budget > 0 {
            self.fail_budget -= 1;
            true
        } else {
            false
        }
    }

    fn take_conflict(&mut self) -> bool {
        if self.conflict_budget > 0 {
            self.conflict_budget -= 1;
            true
        } else {
            false
        }
    }
}

/// Deterministic in-memory implementation of [`TargetStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the next `n` write calls to fail with a transient error.
    pub fn fail_next_writes(&self, n: u32) {
        self.inner.lock().unwrap().fail_budget = n;
    }

    /// Arm the next `n` write calls to fail with a uniqueness conflict,
    /// as a concurrent external writer would trigger.
    pub fn conflict_next_writes(&self, n: u32) {
        self.inner.lock().unwrap().conflict_budget = n;
    }

    pub fn master(&self, kind: EntityKind, guid: &str) -> Option<MasterRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .masters
            .get(&kind)
            .and_then(|m| m.get(guid))
            .map(|(_, r)| r.clone())
    }

    pub fn master_id(&self, kind: EntityKind, guid: &str) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner
            .masters
            .get(&kind)
            .and_then(|m| m.get(guid))
            .map(|(id, _)| *id)
    }

    pub fn voucher(&self, guid: &str) -> Option<VoucherRecord> {
        let inner = self.inner.lock().unwrap();
        inner.vouchers.get(guid).map(|(_, r)| r.clone())
    }

    pub fn voucher_id(&self, guid: &str) -> Option<i64> {
        let inner = self.inner.lock().unwrap();
        inner.vouchers.get(guid).map(|(id, _)| *id)
    }

    pub fn entry(&self, kind: EntityKind, guid: &str) -> Option<EntryRecord> {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&kind)
            .and_then(|m| m.get(guid))
            .map(|(_, r)| r.clone())
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn fetch_key_map(&self, kind: EntityKind) -> Result<Vec<StoredKey>> {
        let inner = self.inner.lock().unwrap();
        if kind == EntityKind::Voucher {
            return Ok(inner
                .vouchers
                .iter()
                .map(|(guid, (id, _))| StoredKey {
                    guid: guid.clone(),
                    name: String::new(),
                    id: *id,
                })
                .collect());
        }
        if kind.is_entry() {
            return Ok(inner
                .entries
                .get(&kind)
                .map(|m| {
                    m.iter()
                        .map(|(guid, (id, _))| StoredKey {
                            guid: guid.clone(),
                            name: String::new(),
                            id: *id,
                        })
                        .collect()
                })
                .unwrap_or_default());
        }
        Ok(inner
            .masters
            .get(&kind)
            .map(|m| {
                m.iter()
                    .map(|(guid, (id, record))| StoredKey {
                        guid: guid.clone(),
                        name: record.name.clone(),
                        id: *id,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_masters(
        &self,
        kind: EntityKind,
        records: &[MasterRecord],
    ) -> Result<UpsertStats> {
        let mut inner = self.inner.lock().unwrap();
        if inner.take_failure() {
            return Err(MigrateError::connectivity("memory store", "injected failure"));
        }
        if inner.take_conflict() {
            return Err(MigrateError::conflict(kind.to_string(), "injected conflict"));
        }

        let mut stats = UpsertStats::default();
        for record in records {
            let existing = inner
                .masters
                .get(&kind)
                .and_then(|m| m.get(&record.guid))
                .map(|(id, existing)| (*id, existing == record));
            let id = match existing {
                Some((_, true)) => continue,
                Some((id, false)) => {
                    stats.updated += 1;
                    id
                }
                None => {
                    stats.inserted += 1;
                    inner.next_id()
                }
            };
            inner
                .masters
                .entry(kind)
                .or_default()
                .insert(record.guid.clone(), (id, record.clone()));
            stats.ids.push((record.guid.clone(), id));
        }
        Ok(stats)
    }

    async fn upsert_vouchers(&self, records: &[VoucherRecord]) -> Result<UpsertStats> {
        let mut inner = self.inner.lock().unwrap();
        if inner.take_failure() {
            return Err(MigrateError::connectivity("memory store", "injected failure"));
        }
        if inner.take_conflict() {
            return Err(MigrateError::conflict("vouchers", "injected conflict"));
        }

        let mut stats = UpsertStats::default();
        for record in records {
            let existing = inner
                .vouchers
                .get(&record.guid)
                .map(|(id, existing)| (*id, existing == record));
            let id = match existing {
                Some((_, true)) => continue,
                Some((id, false)) => {
                    stats.updated += 1;
                    id
                }
                None => {
                    stats.inserted += 1;
                    inner.next_id()
                }
            };
            inner
                .vouchers
                .insert(record.guid.clone(), (id, record.clone()));
            stats.ids.push((record.guid.clone(), id));
        }
        Ok(stats)
    }

    async fn upsert_entries(
        &self,
        kind: EntityKind,
        records: &[EntryRecord],
    ) -> Result<UpsertStats> {
        let mut inner = self.inner.lock().unwrap();
        if inner.take_failure() {
            return Err(MigrateError::connectivity("memory store", "injected failure"));
        }
        if inner.take_conflict() {
            return Err(MigrateError::conflict(kind.to_string(), "injected conflict"));
        }

        let mut stats = UpsertStats::default();
        for record in records {
            let existing = inner
                .entries
                .get(&kind)
                .and_then(|m| m.get(&record.guid))
                .map(|(id, existing)| (*id, existing == record));
            let id = match existing {
                Some((_, true)) => continue,
                Some((id, false)) => {
                    stats.updated += 1;
                    id
                }
                None => {
                    stats.inserted += 1;
                    inner.next_id()
                }
            };
            inner
                .entries
                .entry(kind)
                .or_default()
                .insert(record.guid.clone(), (id, record.clone()));
            stats.ids.push((record.guid.clone(), id));
        }
        Ok(stats)
    }

    async fn patch_parent(&self, kind: EntityKind, child_id: i64, parent_id: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(table) = inner.masters.get_mut(&kind) {
            for (id, record) in table.values_mut() {
                if *id == child_id {
                    record.parent_id = Some(parent_id);
                    return Ok(());
                }
            }
        }
        Err(MigrateError::persistence(
            kind.to_string(),
            format!("no row with id {} to patch", child_id),
        ))
    }

    async fn count_rows(&self, kind: EntityKind) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let count = if kind == EntityKind::Voucher {
            inner.vouchers.len()
        } else if kind.is_entry() {
            inner.entries.get(&kind).map(|m| m.len()).unwrap_or(0)
        } else {
            inner.masters.get(&kind).map(|m| m.len()).unwrap_or(0)
        };
        Ok(count as u64)
    }

    async fn count_dangling_entries(&self, kind: EntityKind) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        let voucher_ids: std::collections::HashSet<i64> =
            inner.vouchers.values().map(|(id, _)| *id).collect();
        let count = inner
            .entries
            .get(&kind)
            .map(|m| {
                m.values()
                    .filter(|(_, e)| match e.voucher_id {
                        Some(id) => !voucher_ids.contains(&id),
                        None => true,
                    })
                    .count()
            })
            .unwrap_or(0);
        Ok(count as u64)
    }
}

//! Reference resolver: natural keys → surrogate ids.
//!
//! The cache is scoped to a single run. It is seeded once from the target
//! store so that references to previously migrated rows resolve without a
//! per-record round-trip, then updated incrementally: first with the names
//! of masters normalized in this run (id pending), later with the ids the
//! loader learns as each dependency stage commits. It is owned by the run
//! and passed explicitly to the validator and loader — never ambient state.

use crate::entity::{EntityKind, Snapshot};
use crate::error::Result;
use crate::target::{StoredKey, TargetStore};
use std::collections::HashMap;
use tracing::debug;

/// Outcome classification of a resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedState {
    Resolved,
    Unresolved,
}

/// Result of a resolution attempt. A `Resolved` key may still carry no id
/// when it refers to a master introduced in this run whose row has not
/// committed yet; the loader fills those in at stage boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub id: Option<i64>,
    pub state: ResolvedState,
}

impl Resolution {
    fn unresolved() -> Self {
        Self {
            id: None,
            state: ResolvedState::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ResolvedState::Resolved
    }
}

/// Key → id table for one entity kind.
#[derive(Debug, Default)]
struct KindCache {
    by_guid: HashMap<String, Option<i64>>,
    by_name: HashMap<String, Option<i64>>,
}

/// Per-run, per-entity-kind natural key → surrogate id cache.
#[derive(Debug, Default)]
pub struct ResolverCache {
    kinds: HashMap<EntityKind, KindCache>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache from the target store's existing rows, one lookup
    /// pass per entity kind.
    pub async fn seed_from_store(store: &dyn TargetStore, kinds: &[EntityKind]) -> Result<Self> {
        let mut cache = Self::new();
        for kind in kinds {
            let keys = store.fetch_key_map(*kind).await?;
            debug!("{}: seeded {} existing keys", kind, keys.len());
            for StoredKey { guid, name, id } in keys {
                cache.learn(*kind, &guid, &name, Some(id));
            }
        }
        Ok(cache)
    }

    /// Register a natural key. `id` is `None` for masters normalized in
    /// this run that have not been persisted yet; a later call with the
    /// store-assigned id overwrites the pending marker.
    pub fn learn(&mut self, kind: EntityKind, guid: &str, name: &str, id: Option<i64>) {
        let entry = self.kinds.entry(kind).or_default();
        if !guid.is_empty() {
            let slot = entry.by_guid.entry(guid.to_string()).or_insert(None);
            if id.is_some() {
                *slot = id;
            }
        }
        if !name.is_empty() {
            let slot = entry.by_name.entry(normalize_name(name)).or_insert(None);
            if id.is_some() {
                *slot = id;
            }
        }
    }

    /// Resolve a natural key for one kind: exact GUID match first, then
    /// case-insensitive whitespace-normalized name.
    pub fn resolve(&self, kind: EntityKind, guid_or_name: &str) -> Resolution {
        if guid_or_name.trim().is_empty() {
            return Resolution::unresolved();
        }
        let Some(entry) = self.kinds.get(&kind) else {
            return Resolution::unresolved();
        };

        if let Some(id) = entry.by_guid.get(guid_or_name.trim()) {
            return Resolution {
                id: *id,
                state: ResolvedState::Resolved,
            };
        }
        if let Some(id) = entry.by_name.get(&normalize_name(guid_or_name)) {
            return Resolution {
                id: *id,
                state: ResolvedState::Resolved,
            };
        }
        Resolution::unresolved()
    }

    /// Register every master normalized in this run, so that references
    /// between records of the same snapshot resolve before anything is
    /// persisted.
    pub fn learn_snapshot_masters(&mut self, snapshot: &Snapshot) {
        for master in &snapshot.masters {
            self.learn(master.kind, &master.guid, &master.name, None);
        }
        // Vouchers are resolution targets for their entries.
        for voucher in &snapshot.vouchers {
            self.learn(EntityKind::Voucher, &voucher.guid, "", None);
        }
    }

    /// Fill in foreign-key ids wherever the cache already knows them.
    /// Unresolved or pending references are left as `None`; the validator
    /// decides severity and the loader fills pending ids per stage.
    pub fn resolve_snapshot_refs(&self, snapshot: &mut Snapshot) {
        for master in &mut snapshot.masters {
            if master.parent_id.is_none() && !master.parent_name.is_empty() {
                if let Some(parent_kind) = master.kind.parent_kind() {
                    master.parent_id = self.resolve(parent_kind, &master.parent_name).id;
                }
            }
        }
        for voucher in &mut snapshot.vouchers {
            if voucher.voucher_type_id.is_none() {
                voucher.voucher_type_id =
                    self.resolve(EntityKind::VoucherType, &voucher.voucher_type).id;
            }
            if voucher.party_ledger_id.is_none() && !voucher.party_name.is_empty() {
                voucher.party_ledger_id = self.resolve(EntityKind::Ledger, &voucher.party_name).id;
            }
        }
        for entry in &mut snapshot.entries {
            if entry.voucher_id.is_none() {
                entry.voucher_id = self.resolve(EntityKind::Voucher, &entry.voucher_guid).id;
            }
            if entry.ref_id.is_none() && !entry.ref_name.is_empty() {
                if let Some(ref_kind) = entry.kind.entry_ref_kind() {
                    entry.ref_id = self.resolve(ref_kind, &entry.ref_name).id;
                }
            }
        }
    }
}

/// Normalize a name for lookup: trimmed, lowercased, inner whitespace
/// collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

//! Target store seam.
//!
//! The loader and verifier talk to the relational target through this
//! trait. The production implementation is Postgres; an in-memory store
//! backs the test suite with the same upsert semantics.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::entity::{EntityKind, EntryRecord, MasterRecord, VoucherRecord};
use crate::error::Result;
use async_trait::async_trait;

/// One existing row's natural key and surrogate id, as seeded into the
/// resolver cache.
#[derive(Debug, Clone)]
pub struct StoredKey {
    pub guid: String,
    pub name: String,
    pub id: i64,
}

/// Result of one upsert chunk. `ids` carries the store-assigned surrogate
/// id per GUID so the loader can teach the resolver cache. Unchanged rows
/// are left untouched and appear in neither the counters nor `ids`; their
/// ids are already in the cache from the key-map seed.
#[derive(Debug, Clone, Default)]
pub struct UpsertStats {
    pub inserted: u64,
    pub updated: u64,
    pub ids: Vec<(String, i64)>,
}

impl UpsertStats {
    pub fn merge(&mut self, other: UpsertStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.ids.extend(other.ids);
    }
}

/// Storage operations the migration needs, keyed by GUID throughout so a
/// re-run converges instead of duplicating.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All (guid, name, id) keys currently persisted for one kind, within
    /// the configured tenant scope.
    async fn fetch_key_map(&self, kind: EntityKind) -> Result<Vec<StoredKey>>;

    /// Insert-or-update one chunk of master records by GUID. A row whose
    /// persisted column values already match is left untouched and counted
    /// as neither insert nor update.
    async fn upsert_masters(&self, kind: EntityKind, records: &[MasterRecord])
        -> Result<UpsertStats>;

    /// Insert-or-update one chunk of vouchers by GUID.
    async fn upsert_vouchers(&self, records: &[VoucherRecord]) -> Result<UpsertStats>;

    /// Insert-or-update one chunk of voucher entries by GUID.
    async fn upsert_entries(&self, kind: EntityKind, records: &[EntryRecord])
        -> Result<UpsertStats>;

    /// Set a hierarchical row's parent id. Second pass after every row of
    /// the kind has an id.
    async fn patch_parent(&self, kind: EntityKind, child_id: i64, parent_id: i64) -> Result<()>;

    /// Row count for one kind within the tenant scope.
    async fn count_rows(&self, kind: EntityKind) -> Result<u64>;

    /// Number of persisted entries of one kind whose voucher foreign key
    /// does not point at an existing voucher row.
    async fn count_dangling_entries(&self, kind: EntityKind) -> Result<u64>;
}

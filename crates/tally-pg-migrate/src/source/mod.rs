//! Source system seam.
//!
//! The request/response client that talks to the accounting system is an
//! external collaborator. From the engine's perspective a source is just a
//! producer of flat records: field-name → string-value mappings, with absent
//! fields represented as empty strings.

use crate::entity::EntityKind;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One flat export record.
pub type RawRecord = BTreeMap<String, String>;

/// Trait for snapshot extraction.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch all raw records for one master kind.
    async fn fetch_masters(&self, kind: EntityKind) -> Result<Vec<RawRecord>>;

    /// Fetch all raw transaction records (vouchers with their entry field
    /// groups flattened in).
    async fn fetch_vouchers(&self) -> Result<Vec<RawRecord>>;
}

/// A source backed by pre-fetched records. Used in tests and for replaying
/// a snapshot captured by the extraction client.
#[derive(Debug, Default)]
pub struct StaticSource {
    masters: BTreeMap<EntityKind, Vec<RawRecord>>,
    vouchers: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_masters(mut self, kind: EntityKind, records: Vec<RawRecord>) -> Self {
        self.masters.insert(kind, records);
        self
    }

    pub fn with_vouchers(mut self, records: Vec<RawRecord>) -> Self {
        self.vouchers = records;
        self
    }
}

#[async_trait]
impl SnapshotSource for StaticSource {
    async fn fetch_masters(&self, kind: EntityKind) -> Result<Vec<RawRecord>> {
        Ok(self.masters.get(&kind).cloned().unwrap_or_default())
    }

    async fn fetch_vouchers(&self) -> Result<Vec<RawRecord>> {
        Ok(self.vouchers.clone())
    }
}

/// Build a raw record from field/value pairs. Test and fixture helper.
pub fn raw_record<const N: usize>(fields: [(&str, &str); N]) -> RawRecord {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

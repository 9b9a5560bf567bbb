//! Typed entity model for Tally snapshot records.
//!
//! Master kinds are reference data (ledgers, stock items, cost centres);
//! transaction kinds are vouchers and the entry records they own. The
//! dependency stages defined here drive the load order: a kind is only
//! persisted after every kind it references has committed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every entity kind the engine knows how to migrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    Ledger,
    StockItem,
    VoucherType,
    Godown,
    StockCategory,
    StockGroup,
    UnitOfMeasure,
    CostCategory,
    CostCentre,
    Employee,
    Voucher,
    LedgerEntry,
    InventoryEntry,
    EmployeeEntry,
    AllocationEntry,
}

/// All master kinds, in extraction order.
pub const MASTER_KINDS: [EntityKind; 11] = [
    EntityKind::Group,
    EntityKind::Ledger,
    EntityKind::StockItem,
    EntityKind::VoucherType,
    EntityKind::Godown,
    EntityKind::StockCategory,
    EntityKind::StockGroup,
    EntityKind::UnitOfMeasure,
    EntityKind::CostCategory,
    EntityKind::CostCentre,
    EntityKind::Employee,
];

/// All entry kinds owned by vouchers.
pub const ENTRY_KINDS: [EntityKind; 4] = [
    EntityKind::LedgerEntry,
    EntityKind::InventoryEntry,
    EntityKind::EmployeeEntry,
    EntityKind::AllocationEntry,
];

/// Load stages in dependency order. Kinds within a stage are mutually
/// independent and may be persisted concurrently; each stage waits for the
/// previous stage to commit.
pub const LOAD_STAGES: [&[EntityKind]; 4] = [
    &[
        EntityKind::Group,
        EntityKind::VoucherType,
        EntityKind::Godown,
        EntityKind::StockCategory,
        EntityKind::StockGroup,
        EntityKind::UnitOfMeasure,
        EntityKind::CostCategory,
        EntityKind::CostCentre,
        EntityKind::Employee,
    ],
    &[EntityKind::Ledger, EntityKind::StockItem],
    &[EntityKind::Voucher],
    &[
        EntityKind::LedgerEntry,
        EntityKind::InventoryEntry,
        EntityKind::EmployeeEntry,
        EntityKind::AllocationEntry,
    ],
];

impl EntityKind {
    /// Target table name for this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Group => "groups",
            EntityKind::Ledger => "ledgers",
            EntityKind::StockItem => "stock_items",
            EntityKind::VoucherType => "voucher_types",
            EntityKind::Godown => "godowns",
            EntityKind::StockCategory => "stock_categories",
            EntityKind::StockGroup => "stock_groups",
            EntityKind::UnitOfMeasure => "units_of_measure",
            EntityKind::CostCategory => "cost_categories",
            EntityKind::CostCentre => "cost_centres",
            EntityKind::Employee => "employees",
            EntityKind::Voucher => "vouchers",
            EntityKind::LedgerEntry => "ledger_entries",
            EntityKind::InventoryEntry => "inventory_entries",
            EntityKind::EmployeeEntry => "employee_entries",
            EntityKind::AllocationEntry => "allocation_entries",
        }
    }

    /// Source collection name in the export request, for master kinds.
    pub fn collection_name(&self) -> Option<&'static str> {
        match self {
            EntityKind::Group => Some("Group"),
            EntityKind::Ledger => Some("Ledger"),
            EntityKind::StockItem => Some("StockItem"),
            EntityKind::VoucherType => Some("VoucherType"),
            EntityKind::Godown => Some("GoDown"),
            EntityKind::StockCategory => Some("StockCategory"),
            EntityKind::StockGroup => Some("StockGroup"),
            EntityKind::UnitOfMeasure => Some("Unit"),
            EntityKind::CostCategory => Some("CostCategory"),
            EntityKind::CostCentre => Some("CostCentre"),
            EntityKind::Employee => Some("Employee"),
            _ => None,
        }
    }

    pub fn is_master(&self) -> bool {
        MASTER_KINDS.contains(self)
    }

    pub fn is_entry(&self) -> bool {
        ENTRY_KINDS.contains(self)
    }

    /// The kind a master's parent name refers to. Self-referential kinds
    /// form hierarchies and take the two-pass parent patch; cross-kind
    /// parents (a ledger sits under a group) resolve directly because the
    /// parent kind commits in an earlier stage.
    pub fn parent_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Group => Some(EntityKind::Group),
            EntityKind::StockGroup => Some(EntityKind::StockGroup),
            EntityKind::StockCategory => Some(EntityKind::StockCategory),
            EntityKind::CostCentre => Some(EntityKind::CostCentre),
            EntityKind::Ledger => Some(EntityKind::Group),
            EntityKind::StockItem => Some(EntityKind::StockGroup),
            _ => None,
        }
    }

    /// Whether the parent reference is self-referential (hierarchy).
    pub fn is_hierarchical(&self) -> bool {
        self.parent_kind() == Some(*self)
    }

    /// The master kind an entry's name field refers to.
    pub fn entry_ref_kind(&self) -> Option<EntityKind> {
        match self {
            EntityKind::LedgerEntry => Some(EntityKind::Ledger),
            EntityKind::InventoryEntry => Some(EntityKind::StockItem),
            EntityKind::EmployeeEntry => Some(EntityKind::Employee),
            EntityKind::AllocationEntry => Some(EntityKind::CostCentre),
            _ => None,
        }
    }

    /// Column pair (surrogate id, verbatim name) an entry table uses for
    /// its master reference.
    pub fn entry_ref_columns(&self) -> Option<(&'static str, &'static str)> {
        match self {
            EntityKind::LedgerEntry => Some(("ledger_id", "ledger_name")),
            EntityKind::InventoryEntry => Some(("stock_item_id", "stock_item_name")),
            EntityKind::EmployeeEntry => Some(("employee_id", "employee_name")),
            EntityKind::AllocationEntry => Some(("cost_centre_id", "cost_centre_name")),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A normalized master record. The parent is carried first as the extracted
/// name; `parent_id` is filled in once the referenced row's surrogate id is
/// known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    pub kind: EntityKind,
    pub guid: String,
    pub name: String,
    pub alias: String,
    pub parent_name: String,
    pub parent_id: Option<i64>,
    pub description: String,
}

/// A normalized voucher record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherRecord {
    pub guid: String,
    pub date: Option<NaiveDate>,
    pub voucher_type: String,
    pub voucher_type_id: Option<i64>,
    pub voucher_number: String,
    pub party_name: String,
    pub party_ledger_id: Option<i64>,
    pub narration: String,
    pub reference: String,
    pub amount: Decimal,
    pub is_invoice: bool,
    pub affects_inventory: bool,
}

/// A normalized entry record owned by a voucher. One shape serves all four
/// entry kinds; fields that a kind does not use stay at their defaults.
///
/// `ref_name` is preserved verbatim even when resolution fails — an orphan
/// reference is persisted with a null surrogate id, not dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub kind: EntityKind,
    pub guid: String,
    pub voucher_guid: String,
    pub voucher_id: Option<i64>,
    pub ref_name: String,
    pub ref_id: Option<i64>,
    pub category: String,
    pub amount: Decimal,
    pub quantity: Decimal,
    pub rate: Decimal,
    pub is_debit: bool,
    pub sort_order: i64,
}

impl EntryRecord {
    pub fn new(kind: EntityKind, guid: String, voucher_guid: String) -> Self {
        Self {
            kind,
            guid,
            voucher_guid,
            voucher_id: None,
            ref_name: String::new(),
            ref_id: None,
            category: String::new(),
            amount: Decimal::ZERO,
            quantity: Decimal::ZERO,
            rate: Decimal::ZERO,
            is_debit: false,
            sort_order: 0,
        }
    }
}

/// One extraction snapshot after normalization.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub masters: Vec<MasterRecord>,
    pub vouchers: Vec<VoucherRecord>,
    pub entries: Vec<EntryRecord>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.masters.is_empty() && self.vouchers.is_empty() && self.entries.is_empty()
    }

    /// Total record count across all kinds.
    pub fn len(&self) -> usize {
        self.masters.len() + self.vouchers.len() + self.entries.len()
    }

    pub fn masters_of(&self, kind: EntityKind) -> impl Iterator<Item = &MasterRecord> {
        self.masters.iter().filter(move |m| m.kind == kind)
    }

    pub fn entries_of(&self, kind: EntityKind) -> impl Iterator<Item = &EntryRecord> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_stages_cover_dependencies() {
        let stage_of = |kind: EntityKind| {
            LOAD_STAGES
                .iter()
                .position(|s| s.contains(&kind))
                .unwrap_or_else(|| panic!("{} missing from load stages", kind))
        };

        // Cross-kind master parents commit before their dependents.
        assert!(stage_of(EntityKind::Group) < stage_of(EntityKind::Ledger));
        assert!(stage_of(EntityKind::StockGroup) < stage_of(EntityKind::StockItem));

        // Vouchers come after their type and party ledger.
        assert!(stage_of(EntityKind::VoucherType) < stage_of(EntityKind::Voucher));
        assert!(stage_of(EntityKind::Ledger) < stage_of(EntityKind::Voucher));

        // Every entry kind comes after vouchers and its referenced master.
        for kind in ENTRY_KINDS {
            assert!(stage_of(EntityKind::Voucher) < stage_of(kind));
            let ref_kind = kind.entry_ref_kind().unwrap();
            assert!(stage_of(ref_kind) < stage_of(kind));
        }
    }

    #[test]
    fn test_all_kinds_in_exactly_one_stage() {
        for kind in MASTER_KINDS.iter().chain(ENTRY_KINDS.iter()) {
            let count = LOAD_STAGES.iter().filter(|s| s.contains(kind)).count();
            assert_eq!(count, 1, "{} appears in {} stages", kind, count);
        }
    }

    #[test]
    fn test_hierarchical_kinds() {
        assert!(EntityKind::Group.is_hierarchical());
        assert!(EntityKind::StockGroup.is_hierarchical());
        assert!(!EntityKind::Ledger.is_hierarchical());
        assert_eq!(EntityKind::Ledger.parent_kind(), Some(EntityKind::Group));
        assert_eq!(EntityKind::Voucher.parent_kind(), None);
    }
}

//! Enumerated source field configuration.
//!
//! The export is a flat record; field-group prefixes decide which target
//! entity a field contributes to. Recognized fields are enumerated here
//! rather than discovered by reflection — unknown fields are counted and
//! logged, never silently mapped.

use crate::entity::EntityKind;

/// Prefix for master-kind export fields.
pub const MASTER_PREFIX: &str = "master_";

/// Prefix for voucher-level export fields.
pub const VOUCHER_PREFIX: &str = "voucher_";

/// Canonical field suffixes recognized on master records.
pub const MASTER_FIELDS: &[&str] = &["guid", "id", "name", "alias", "parent", "description"];

/// Canonical field suffixes recognized on voucher records.
pub const VOUCHER_FIELDS: &[&str] = &[
    "guid",
    "id",
    "date",
    "type",
    "voucher_type",
    "number",
    "voucher_number",
    "amount",
    "party_name",
    "party_ledger_name",
    "narration",
    "reference",
    "is_invoice",
    "affects_inventory",
];

/// One entry field group: which prefixes select it and which suffixes it
/// recognizes.
pub struct EntryGroup {
    pub kind: EntityKind,
    pub prefixes: &'static [&'static str],
    pub fields: &'static [&'static str],
}

/// Entry groups in the order the source emits them. The short prefixes
/// cover older export builds that emit unprefixed entry fields.
pub const ENTRY_GROUPS: &[EntryGroup] = &[
    EntryGroup {
        kind: EntityKind::LedgerEntry,
        prefixes: &["trn_ledgerentries_", "ledger_"],
        fields: &["guid", "id", "name", "ledger_name", "amount", "is_debit"],
    },
    EntryGroup {
        kind: EntityKind::InventoryEntry,
        prefixes: &["trn_inventoryentries_", "inventory_"],
        fields: &[
            "guid",
            "id",
            "name",
            "stockitem_name",
            "stock_item_name",
            "quantity",
            "rate",
            "amount",
        ],
    },
    EntryGroup {
        kind: EntityKind::EmployeeEntry,
        prefixes: &["trn_employee_", "employee_"],
        fields: &["guid", "id", "name", "employee_name", "category", "amount", "sort_order"],
    },
    EntryGroup {
        kind: EntityKind::AllocationEntry,
        prefixes: &["trn_allocations_", "allocation_"],
        fields: &[
            "guid",
            "id",
            "name",
            "cost_centre_name",
            "category",
            "amount",
        ],
    },
];

/// Bare field names some export builds emit without any group prefix.
pub const BARE_ALIASES: &[(&str, EntityKind, &str)] =
    &[("amount", EntityKind::LedgerEntry, "amount")];

/// Where a raw field landed after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSlot<'a> {
    Master(&'a str),
    Voucher(&'a str),
    /// Entry group, instance index, canonical suffix.
    Entry(EntityKind, u32, &'a str),
    Unknown,
}

/// Classify one raw field name into its target slot.
///
/// Entry prefixes may carry a numeric instance segment directly after the
/// prefix (`trn_ledgerentries_2_amount`), so a source that exposes several
/// entries per voucher decomposes without code changes.
pub fn classify(key: &str) -> FieldSlot<'_> {
    for group in ENTRY_GROUPS {
        for prefix in group.prefixes {
            if let Some(rest) = key.strip_prefix(prefix) {
                let (instance, suffix) = split_instance(rest);
                if group.fields.contains(&suffix) {
                    return FieldSlot::Entry(group.kind, instance, suffix);
                }
            }
        }
    }

    if let Some(suffix) = key.strip_prefix(VOUCHER_PREFIX) {
        if VOUCHER_FIELDS.contains(&suffix) {
            return FieldSlot::Voucher(suffix);
        }
    }

    if let Some(suffix) = key.strip_prefix(MASTER_PREFIX) {
        if MASTER_FIELDS.contains(&suffix) {
            return FieldSlot::Master(suffix);
        }
    }

    // Master exports from the flat parser carry unprefixed field names.
    if MASTER_FIELDS.contains(&key) {
        return FieldSlot::Master(key);
    }

    for (name, kind, suffix) in BARE_ALIASES {
        if key == *name {
            return FieldSlot::Entry(*kind, 0, suffix);
        }
    }

    FieldSlot::Unknown
}

/// Split an optional leading numeric instance segment from a suffix.
fn split_instance(rest: &str) -> (u32, &str) {
    if let Some((head, tail)) = rest.split_once('_') {
        if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = head.parse::<u32>() {
                return (n, tail);
            }
        }
    }
    (0, rest)
}

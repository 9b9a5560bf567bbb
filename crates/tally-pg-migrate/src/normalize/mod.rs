//! Normalizer: raw flat records → typed entity records.
//!
//! Normalization is a pure function of the input record: it performs type
//! coercion with defined defaults for empty fields (numeric → 0, boolean →
//! false, string → empty, date → null) and decomposes transaction records
//! into a voucher plus its entry records, driven by the field groups in
//! [`fields`]. A field that cannot be coerced excludes its record and is
//! reported as a per-record issue; the run continues.

pub mod fields;

use crate::entity::{EntityKind, EntryRecord, MasterRecord, Snapshot, VoucherRecord};
use crate::report::RecordIssue;
use crate::source::RawRecord;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use fields::{classify, FieldSlot};

/// Output of normalizing one raw transaction record.
#[derive(Debug, Default)]
pub struct VoucherBundle {
    pub voucher: Option<VoucherRecord>,
    pub entries: Vec<EntryRecord>,
}

/// Normalize one raw master record into a typed record.
///
/// Returns `None` (plus issues) when the record had a field that failed
/// coercion — masters carry only string fields today, so in practice this
/// is always `Some` and issues are limited to unknown-field traces.
pub fn normalize_master(
    kind: EntityKind,
    raw: &RawRecord,
) -> (Option<MasterRecord>, Vec<RecordIssue>) {
    let mut record = MasterRecord {
        kind,
        guid: String::new(),
        name: String::new(),
        alias: String::new(),
        parent_name: String::new(),
        parent_id: None,
        description: String::new(),
    };
    let mut unknown = 0usize;

    for (key, value) in raw {
        match classify(key) {
            FieldSlot::Master(field) => match field {
                "guid" | "id" => record.guid = value.trim().to_string(),
                "name" => record.name = value.trim().to_string(),
                "alias" => record.alias = value.trim().to_string(),
                "parent" => record.parent_name = value.trim().to_string(),
                "description" => record.description = value.clone(),
                _ => {}
            },
            _ => {
                unknown += 1;
                debug!("{}: ignoring unrecognized field '{}'", kind, key);
            }
        }
    }

    if unknown > 0 {
        debug!("{}: {} unrecognized fields ignored", kind, unknown);
    }

    (Some(record), Vec::new())
}

/// Normalize one raw transaction record into a voucher and its entries.
///
/// Decomposition repeats per detected field group instance — a record
/// carrying `trn_ledgerentries_*` and `trn_ledgerentries_2_*` yields two
/// ledger entries. The observed cardinality of the source is one ledger
/// entry and at most one inventory entry per voucher, but nothing here
/// assumes that.
pub fn normalize_voucher_record(raw: &RawRecord) -> (VoucherBundle, Vec<RecordIssue>) {
    let mut issues = Vec::new();
    let mut voucher_fields: BTreeMap<&str, &str> = BTreeMap::new();
    let mut entry_fields: BTreeMap<(EntityKind, u32), BTreeMap<&str, &str>> = BTreeMap::new();
    let mut unknown = 0usize;

    for (key, value) in raw {
        match classify(key) {
            FieldSlot::Voucher(field) => {
                voucher_fields.insert(field, value.as_str());
            }
            FieldSlot::Entry(kind, instance, field) => {
                entry_fields
                    .entry((kind, instance))
                    .or_default()
                    .insert(field, value.as_str());
            }
            FieldSlot::Master(_) | FieldSlot::Unknown => {
                unknown += 1;
                debug!("voucher record: ignoring unrecognized field '{}'", key);
            }
        }
    }

    if unknown > 0 {
        debug!("voucher record: {} unrecognized fields ignored", unknown);
    }

    let mut bundle = VoucherBundle::default();

    let voucher_guid = voucher_fields
        .get("guid")
        .or_else(|| voucher_fields.get("id"))
        .map(|v| v.trim().to_string())
        .unwrap_or_default();

    if !voucher_fields.is_empty() {
        match build_voucher(&voucher_guid, &voucher_fields) {
            Ok(voucher) => bundle.voucher = Some(voucher),
            Err(issue) => issues.push(issue),
        }
    }

    for ((kind, instance), group) in &entry_fields {
        match build_entry(*kind, *instance, &voucher_guid, group) {
            Ok(entry) => bundle.entries.push(entry),
            Err(issue) => issues.push(issue),
        }
    }

    (bundle, issues)
}

/// Normalize a full raw snapshot. Convenience wrapper used by the
/// orchestrator's Normalize phase.
pub fn normalize_snapshot(
    masters: &BTreeMap<EntityKind, Vec<RawRecord>>,
    vouchers: &[RawRecord],
) -> (Snapshot, Vec<RecordIssue>) {
    let mut snapshot = Snapshot::default();
    let mut issues = Vec::new();

    for (kind, records) in masters {
        for raw in records {
            let (record, record_issues) = normalize_master(*kind, raw);
            issues.extend(record_issues);
            if let Some(record) = record {
                snapshot.masters.push(record);
            }
        }
    }

    for raw in vouchers {
        let (bundle, record_issues) = normalize_voucher_record(raw);
        issues.extend(record_issues);
        if let Some(voucher) = bundle.voucher {
            snapshot.vouchers.push(voucher);
        }
        snapshot.entries.extend(bundle.entries);
    }

    (snapshot, issues)
}

fn build_voucher(
    guid: &str,
    fields: &BTreeMap<&str, &str>,
) -> std::result::Result<VoucherRecord, RecordIssue> {
    let get = |names: &[&str]| -> &str {
        for name in names {
            if let Some(v) = fields.get(name) {
                return v;
            }
        }
        ""
    };

    let key = if guid.is_empty() { "<no guid>" } else { guid };

    Ok(VoucherRecord {
        guid: guid.to_string(),
        date: coerce(EntityKind::Voucher, key, "date", parse_date(get(&["date"])))?,
        voucher_type: get(&["voucher_type", "type"]).trim().to_string(),
        voucher_type_id: None,
        voucher_number: get(&["voucher_number", "number"]).trim().to_string(),
        party_name: get(&["party_name", "party_ledger_name"]).to_string(),
        party_ledger_id: None,
        narration: get(&["narration"]).to_string(),
        reference: get(&["reference"]).to_string(),
        amount: coerce(
            EntityKind::Voucher,
            key,
            "amount",
            parse_decimal(get(&["amount"])),
        )?,
        is_invoice: coerce(
            EntityKind::Voucher,
            key,
            "is_invoice",
            parse_bool(get(&["is_invoice"])),
        )?,
        affects_inventory: coerce(
            EntityKind::Voucher,
            key,
            "affects_inventory",
            parse_bool(get(&["affects_inventory"])),
        )?,
    })
}

fn build_entry(
    kind: EntityKind,
    instance: u32,
    voucher_guid: &str,
    fields: &BTreeMap<&str, &str>,
) -> std::result::Result<EntryRecord, RecordIssue> {
    let get = |names: &[&str]| -> &str {
        for name in names {
            if let Some(v) = fields.get(name) {
                return v;
            }
        }
        ""
    };

    let mut guid = get(&["guid", "id"]).trim().to_string();
    if guid.is_empty() && !voucher_guid.is_empty() {
        // Entries in older exports carry no GUID of their own; derive a
        // stable one so repeated runs upsert instead of duplicating.
        guid = format!("{}-{}-{}", voucher_guid, entry_tag(kind), instance);
    }

    let key = if guid.is_empty() {
        "<no guid>".to_string()
    } else {
        guid.clone()
    };

    let mut entry = EntryRecord::new(kind, guid, voucher_guid.to_string());
    entry.ref_name = get(&[
        "name",
        "ledger_name",
        "stockitem_name",
        "stock_item_name",
        "employee_name",
        "cost_centre_name",
    ])
    .to_string();
    entry.category = get(&["category"]).to_string();
    entry.amount = coerce(kind, &key, "amount", parse_decimal(get(&["amount"])))?;
    entry.quantity = coerce(kind, &key, "quantity", parse_quantity(get(&["quantity"])))?;
    entry.rate = coerce(kind, &key, "rate", parse_quantity(get(&["rate"])))?;
    entry.is_debit = coerce(kind, &key, "is_debit", parse_bool(get(&["is_debit"])))?;
    entry.sort_order = coerce(kind, &key, "sort_order", parse_int(get(&["sort_order"])))?;

    Ok(entry)
}

/// Wrap a coercion failure into a fatal per-record issue.
fn coerce<T>(
    kind: EntityKind,
    key: &str,
    field: &str,
    result: std::result::Result<T, String>,
) -> std::result::Result<T, RecordIssue> {
    result.map_err(|msg| RecordIssue::fatal(kind, key, format!("cannot coerce {}: {}", field, msg)))
}

fn entry_tag(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::LedgerEntry => "le",
        EntityKind::InventoryEntry => "ie",
        EntityKind::EmployeeEntry => "ee",
        EntityKind::AllocationEntry => "ae",
        _ => "entry",
    }
}

/// Parse a decimal amount. Empty → 0. Thousands separators are tolerated.
fn parse_decimal(value: &str) -> std::result::Result<Decimal, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let cleaned = trimmed.replace(',', "");
    Decimal::from_str(&cleaned).map_err(|e| e.to_string())
}

/// Parse a quantity or rate. The source suffixes these with a unit symbol
/// ("5 Nos", "12.50/Nos"); only the leading numeric token counts.
fn parse_quantity(value: &str) -> std::result::Result<Decimal, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let token = trimmed
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("");
    parse_decimal(token)
}

/// Parse an integer field. Empty → 0.
fn parse_int(value: &str) -> std::result::Result<i64, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse::<i64>().map_err(|e| e.to_string())
}

/// Parse a boolean flag. The source emits "Yes"/"No". Empty → false.
fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "no" | "false" | "0" => Ok(false),
        "yes" | "true" | "1" => Ok(true),
        other => Err(format!("'{}' is not a boolean", other)),
    }
}

/// Parse a date. Empty → None. Accepts the formats the source has been
/// observed to emit.
fn parse_date(value: &str) -> std::result::Result<Option<NaiveDate>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    for format in ["%Y-%m-%d", "%Y%m%d", "%d-%b-%Y", "%d-%b-%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(Some(date));
        }
    }
    Err(format!("'{}' is not a recognized date", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::raw_record;

    #[test]
    fn test_normalize_master_prefixed_and_bare() {
        let raw = raw_record([
            ("master_guid", "G1"),
            ("master_name", "Sundry Debtors"),
            ("master_parent", "Current Assets"),
        ]);
        let (record, issues) = normalize_master(EntityKind::Group, &raw);
        let record = record.unwrap();
        assert!(issues.is_empty());
        assert_eq!(record.guid, "G1");
        assert_eq!(record.name, "Sundry Debtors");
        assert_eq!(record.parent_name, "Current Assets");

        let raw = raw_record([("guid", "G2"), ("name", "Fixed Assets"), ("parent", "")]);
        let (record, _) = normalize_master(EntityKind::Group, &raw);
        let record = record.unwrap();
        assert_eq!(record.guid, "G2");
        assert_eq!(record.parent_name, "");
    }

    #[test]
    fn test_normalize_voucher_with_ledger_entry() {
        let raw = raw_record([
            ("voucher_guid", "V1"),
            ("voucher_date", "2025-04-01"),
            ("voucher_type", "Payment"),
            ("ledger_name", ""),
            ("amount", "100.00"),
        ]);
        let (bundle, issues) = normalize_voucher_record(&raw);
        assert!(issues.is_empty());

        let voucher = bundle.voucher.unwrap();
        assert_eq!(voucher.guid, "V1");
        assert_eq!(voucher.date, NaiveDate::from_ymd_opt(2025, 4, 1));
        assert_eq!(voucher.voucher_type, "Payment");

        assert_eq!(bundle.entries.len(), 1);
        let entry = &bundle.entries[0];
        assert_eq!(entry.kind, EntityKind::LedgerEntry);
        assert_eq!(entry.voucher_guid, "V1");
        assert_eq!(entry.ref_name, "");
        assert_eq!(entry.ref_id, None);
        assert_eq!(entry.amount, Decimal::from_str("100.00").unwrap());
        // Derived GUID keeps repeated runs idempotent
        assert_eq!(entry.guid, "V1-le-0");
    }

    #[test]
    fn test_normalize_multi_instance_entries() {
        let raw = raw_record([
            ("voucher_guid", "V2"),
            ("voucher_date", "20250402"),
            ("voucher_type", "Journal"),
            ("trn_ledgerentries_ledger_name", "Cash"),
            ("trn_ledgerentries_amount", "-250"),
            ("trn_ledgerentries_is_debit", "No"),
            ("trn_ledgerentries_2_ledger_name", "Sales"),
            ("trn_ledgerentries_2_amount", "250"),
            ("trn_ledgerentries_2_is_debit", "Yes"),
        ]);
        let (bundle, issues) = normalize_voucher_record(&raw);
        assert!(issues.is_empty());
        assert_eq!(bundle.entries.len(), 2);
        assert_eq!(bundle.entries[0].ref_name, "Cash");
        assert!(!bundle.entries[0].is_debit);
        assert_eq!(bundle.entries[1].ref_name, "Sales");
        assert!(bundle.entries[1].is_debit);
        assert_ne!(bundle.entries[0].guid, bundle.entries[1].guid);
    }

    #[test]
    fn test_coercion_failure_excludes_record_not_run() {
        let raw = raw_record([
            ("voucher_guid", "V3"),
            ("voucher_date", "not-a-date"),
            ("voucher_type", "Sales"),
            ("trn_inventoryentries_id", "IE1"),
            ("trn_inventoryentries_quantity", "5 Nos"),
        ]);
        let (bundle, issues) = normalize_voucher_record(&raw);
        // Voucher excluded, entry survives
        assert!(bundle.voucher.is_none());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, EntityKind::Voucher);
        assert_eq!(issues[0].natural_key, "V3");
        assert!(issues[0].reason.contains("date"));

        assert_eq!(bundle.entries.len(), 1);
        assert_eq!(bundle.entries[0].quantity, Decimal::from(5));
    }

    #[test]
    fn test_empty_field_defaults() {
        let raw = raw_record([
            ("voucher_guid", "V4"),
            ("voucher_date", ""),
            ("voucher_amount", ""),
            ("voucher_is_invoice", ""),
        ]);
        let (bundle, issues) = normalize_voucher_record(&raw);
        assert!(issues.is_empty());
        let voucher = bundle.voucher.unwrap();
        assert_eq!(voucher.date, None);
        assert_eq!(voucher.amount, Decimal::ZERO);
        assert!(!voucher.is_invoice);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_decimal("1,234.56").unwrap(), Decimal::from_str("1234.56").unwrap());
        assert!(parse_decimal("abc").is_err());
        assert_eq!(parse_quantity("12.50/Nos").unwrap(), Decimal::from_str("12.50").unwrap());
        assert!(parse_bool("Yes").unwrap());
        assert!(!parse_bool("No").unwrap());
        assert!(parse_bool("maybe").is_err());
        assert_eq!(
            parse_date("01-Apr-2025").unwrap(),
            NaiveDate::from_ymd_opt(2025, 4, 1)
        );
        assert!(parse_date("31-31-31").is_err());
    }
}

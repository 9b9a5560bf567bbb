//! Validator: structural and referential checks between resolution and load.
//!
//! Violations of required fields or unresolved mandatory parents are fatal
//! for that record — it is excluded from the load batch and reported.
//! Unresolved optional references are warnings; the record proceeds with a
//! null foreign key and the extracted name preserved verbatim.

use crate::entity::{EntityKind, Snapshot};
use crate::report::RecordIssue;
use crate::resolve::ResolverCache;
use std::collections::HashSet;
use tracing::debug;

/// Accepted batch plus the structured issue report.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub accepted: Snapshot,
    pub issues: Vec<RecordIssue>,
}

impl ValidationOutcome {
    pub fn has_fatal(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == crate::report::Severity::Fatal)
    }
}

/// Validate a resolved snapshot. The accepted batch may be smaller than the
/// input; every exclusion and every orphan reference is reported.
pub fn validate_snapshot(snapshot: Snapshot, cache: &ResolverCache) -> ValidationOutcome {
    let mut out = ValidationOutcome::default();
    let mut seen: HashSet<(EntityKind, String)> = HashSet::new();

    for master in snapshot.masters {
        let key = if master.guid.is_empty() {
            master.name.clone()
        } else {
            master.guid.clone()
        };

        if master.guid.is_empty() {
            out.issues
                .push(RecordIssue::fatal(master.kind, key, "missing guid"));
            continue;
        }
        if master.name.is_empty() {
            out.issues
                .push(RecordIssue::fatal(master.kind, key, "missing name"));
            continue;
        }
        if !seen.insert((master.kind, master.guid.clone())) {
            out.issues.push(RecordIssue::fatal(
                master.kind,
                key,
                "duplicate guid within batch",
            ));
            continue;
        }
        // Parent must resolve or be explicitly root (empty).
        if !master.parent_name.is_empty() {
            if let Some(parent_kind) = master.kind.parent_kind() {
                if !cache.resolve(parent_kind, &master.parent_name).is_resolved() {
                    out.issues.push(RecordIssue::fatal(
                        master.kind,
                        key,
                        format!("unresolved parent '{}'", master.parent_name),
                    ));
                    continue;
                }
            }
        }

        out.accepted.masters.push(master);
    }

    // Vouchers first: entries validate their parent against the accepted set.
    let mut accepted_vouchers: HashSet<String> = HashSet::new();

    for voucher in snapshot.vouchers {
        let kind = EntityKind::Voucher;
        let key = voucher.guid.clone();

        if voucher.guid.is_empty() {
            out.issues
                .push(RecordIssue::fatal(kind, "<no guid>", "missing guid"));
            continue;
        }
        if voucher.date.is_none() {
            out.issues
                .push(RecordIssue::fatal(kind, key, "missing date"));
            continue;
        }
        if voucher.voucher_type.is_empty() {
            out.issues
                .push(RecordIssue::fatal(kind, key, "missing voucher type"));
            continue;
        }
        if !cache
            .resolve(EntityKind::VoucherType, &voucher.voucher_type)
            .is_resolved()
        {
            out.issues.push(RecordIssue::fatal(
                kind,
                key,
                format!("unresolved voucher type '{}'", voucher.voucher_type),
            ));
            continue;
        }
        if !seen.insert((kind, voucher.guid.clone())) {
            out.issues
                .push(RecordIssue::fatal(kind, key, "duplicate guid within batch"));
            continue;
        }
        if !voucher.party_name.is_empty()
            && !cache
                .resolve(EntityKind::Ledger, &voucher.party_name)
                .is_resolved()
        {
            out.issues.push(RecordIssue::warning(
                kind,
                key,
                "unresolved party ledger reference",
            ));
        }

        accepted_vouchers.insert(voucher.guid.clone());
        out.accepted.vouchers.push(voucher);
    }

    for entry in snapshot.entries {
        let key = entry.guid.clone();

        if entry.guid.is_empty() {
            out.issues
                .push(RecordIssue::fatal(entry.kind, "<no guid>", "missing guid"));
            continue;
        }
        // Parent voucher must be in the accepted batch or already persisted.
        let parent = cache.resolve(EntityKind::Voucher, &entry.voucher_guid);
        let parent_ok = accepted_vouchers.contains(&entry.voucher_guid) || parent.id.is_some();
        if !parent_ok {
            out.issues.push(RecordIssue::fatal(
                entry.kind,
                key,
                format!("unresolved parent voucher '{}'", entry.voucher_guid),
            ));
            continue;
        }
        if !seen.insert((entry.kind, entry.guid.clone())) {
            out.issues.push(RecordIssue::fatal(
                entry.kind,
                key,
                "duplicate guid within batch",
            ));
            continue;
        }
        // Master reference is optional: an orphan proceeds with a null id.
        let resolved = entry
            .kind
            .entry_ref_kind()
            .map(|ref_kind| cache.resolve(ref_kind, &entry.ref_name).is_resolved())
            .unwrap_or(true);
        if !resolved {
            out.issues.push(RecordIssue::warning(
                entry.kind,
                key,
                format!("unresolved {} reference", ref_label(entry.kind)),
            ));
        }

        out.accepted.entries.push(entry);
    }

    debug!(
        "validation: {} accepted, {} issues",
        out.accepted.len(),
        out.issues.len()
    );

    out
}

fn ref_label(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::LedgerEntry => "ledger",
        EntityKind::InventoryEntry => "stock item",
        EntityKind::EmployeeEntry => "employee",
        EntityKind::AllocationEntry => "cost centre",
        _ => "master",
    }
}

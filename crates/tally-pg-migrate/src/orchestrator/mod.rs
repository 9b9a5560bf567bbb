//! Migration orchestrator: Extract → Normalize → Resolve → Validate →
//! Load → Verify.
//!
//! The orchestrator owns the run: it drives the phases in order, carries
//! the resolver cache between them, aggregates every per-record issue into
//! the run report, and decides the terminal state. Phase-level failures
//! (source unreachable after retries, cancellation) abort the run; record-
//! level problems never do unless the strictness policy says so.

use crate::config::{Config, Strictness};
use crate::entity::{EntityKind, ENTRY_KINDS, MASTER_KINDS};
use crate::error::{MigrateError, Result};
use crate::load::BatchLoader;
use crate::normalize::normalize_snapshot;
use crate::report::{RecordIssue, RunReport, RunState};
use crate::resolve::ResolverCache;
use crate::source::{RawRecord, SnapshotSource};
use crate::target::TargetStore;
use crate::validate::validate_snapshot;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives one migration run end to end.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SnapshotSource>,
    store: Arc<dyn TargetStore>,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        source: Arc<dyn SnapshotSource>,
        store: Arc<dyn TargetStore>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            cancel,
        }
    }

    /// Run the migration. Always yields a report; a phase-level failure or
    /// cancellation yields it in the `Aborted` state.
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let mut report = RunReport::new(run_id.clone());
        info!(
            "migration run {} starting for company '{}'",
            run_id, self.config.source.company_name
        );

        match self.execute(&mut report).await {
            Ok(()) => {}
            Err(MigrateError::Cancelled) => {
                warn!("run {} cancelled", run_id);
                report.state = RunState::Aborted;
            }
            Err(e) => {
                error!("run {} aborted: {}", run_id, e);
                report.state = RunState::Aborted;
            }
        }

        report.completed_at = Some(Utc::now());
        info!(
            "run {} finished: {:?}, {} inserted, {} updated, {} fatal, {} warnings",
            run_id,
            report.state,
            report.total_inserted(),
            report.total_updated(),
            report.fatal_count(),
            report.warning_count()
        );
        Ok(report)
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        // Extract
        let (raw_masters, raw_vouchers) = self.extract().await?;

        // Normalize
        let (mut snapshot, issues) = normalize_snapshot(&raw_masters, &raw_vouchers);
        report.extend_issues(issues);
        debug!("normalized {} records", snapshot.len());

        // Resolve: seed from existing rows, then overlay this snapshot
        let mut seed_kinds: Vec<EntityKind> = MASTER_KINDS.to_vec();
        seed_kinds.push(EntityKind::Voucher);
        let mut cache = ResolverCache::seed_from_store(self.store.as_ref(), &seed_kinds).await?;
        cache.learn_snapshot_masters(&snapshot);
        cache.resolve_snapshot_refs(&mut snapshot);

        // Validate
        let outcome = validate_snapshot(snapshot, &cache);
        report.extend_issues(outcome.issues);
        let mut snapshot = outcome.accepted;

        if self.config.migration.strictness == Strictness::AbortOnFatal
            && report.fatal_count() > 0
        {
            warn!(
                "aborting before load: {} fatal records under abort_on_fatal",
                report.fatal_count()
            );
            report.state = RunState::Aborted;
            return Ok(());
        }

        if self.config.migration.skip_load {
            info!("skip_load set; stopping after validation");
            self.finish(report);
            return Ok(());
        }

        // Load
        let loader = BatchLoader::new(
            self.store.clone(),
            &self.config.migration,
            self.cancel.clone(),
        );
        let load = loader.run(&mut snapshot, &mut cache).await?;
        for (kind, counts) in load.counts {
            report.record_counts(kind, counts);
        }
        report.extend_issues(load.issues);
        report.clean = report.counts.values().all(|c| c.failed == 0);

        // Verify
        if !self.config.migration.skip_verify {
            self.verify(report).await?;
        }

        self.finish(report);
        Ok(())
    }

    /// Pull the raw snapshot from the source, each collection under the
    /// retry policy.
    async fn extract(&self) -> Result<(BTreeMap<EntityKind, Vec<RawRecord>>, Vec<RawRecord>)> {
        let mut raw_masters = BTreeMap::new();
        for kind in MASTER_KINDS {
            let records = self
                .fetch_with_retry(kind.table_name(), || self.source.fetch_masters(kind))
                .await?;
            debug!("{}: extracted {} raw records", kind, records.len());
            raw_masters.insert(kind, records);
        }
        let raw_vouchers = self
            .fetch_with_retry("vouchers", || self.source.fetch_vouchers())
            .await?;
        debug!("vouchers: extracted {} raw records", raw_vouchers.len());
        Ok((raw_masters, raw_vouchers))
    }

    async fn fetch_with_retry<F, Fut, T>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.config.migration.get_max_retries();
        let backoff_ms = self.config.migration.get_retry_backoff_ms();
        let mut attempt = 0u32;
        loop {
            if *self.cancel.borrow() {
                return Err(MigrateError::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    let delay = backoff_ms.saturating_mul(1u64 << attempt.min(16));
                    warn!(
                        "extract {}: transient failure (attempt {}/{}): {}; retrying in {}ms",
                        what,
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

    /// Post-load verification: recount every table into the report,
    /// dangling-entry counts become warnings.
    async fn verify(&self, report: &mut RunReport) -> Result<()> {
        for kind in MASTER_KINDS
            .into_iter()
            .chain([EntityKind::Voucher])
            .chain(ENTRY_KINDS)
        {
            let rows = self.store.count_rows(kind).await?;
            debug!("verify {}: {} rows", kind, rows);
            report.verified.insert(kind.table_name().to_string(), rows);
        }
        for kind in ENTRY_KINDS {
            let dangling = self.store.count_dangling_entries(kind).await?;
            if dangling > 0 {
                warn!("verify {}: {} rows with dangling voucher reference", kind, dangling);
                report.push_issue(RecordIssue::warning(
                    kind,
                    "*",
                    format!("{} rows with dangling voucher reference", dangling),
                ));
            }
        }
        Ok(())
    }

    /// Decide the terminal state once every phase has run.
    fn finish(&self, report: &mut RunReport) {
        report.state = if report.fatal_count() > 0 || report.warning_count() > 0 || !report.clean {
            RunState::CompletedWithWarnings
        } else {
            RunState::CompletedClean
        };
    }
}

//! # tally-pg-migrate
//!
//! Migration engine that moves a Tally accounting snapshot into a
//! normalized PostgreSQL store.
//!
//! The engine runs in phases — Extract → Normalize → Resolve → Validate →
//! Load → Verify — with support for:
//!
//! - **Idempotent loads**: every row is upserted by source GUID, so a
//!   re-run of the same snapshot converges instead of duplicating
//! - **Reference resolution** from natural keys (GUIDs and names) to
//!   target surrogate ids, including references between records of the
//!   same snapshot
//! - **Fatal/warning issue classification** per record, with a
//!   configurable strictness policy
//! - **Chunked loading** with bounded retries and dependency-staged
//!   concurrency
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally_pg_migrate::{Config, Orchestrator, PgStore};
//! use tally_pg_migrate::source::SnapshotSource;
//!
//! async fn migrate(source: Arc<dyn SnapshotSource>) -> tally_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = Arc::new(PgStore::new(&config, config.migration.get_max_pg_connections()).await?);
//!     let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//!     let orchestrator = Orchestrator::new(config, source, store, cancel_rx);
//!     let report = orchestrator.run().await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod load;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod resolve;
pub mod source;
pub mod target;
pub mod validate;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, Strictness, TargetConfig};
pub use entity::{EntityKind, EntryRecord, MasterRecord, Snapshot, VoucherRecord};
pub use error::{MigrateError, Result};
pub use load::BatchLoader;
pub use orchestrator::Orchestrator;
pub use report::{LoadCounts, RecordIssue, RunReport, RunState, Severity};
pub use resolve::ResolverCache;
pub use source::{SnapshotSource, StaticSource};
pub use target::{MemoryStore, PgStore, TargetStore};
pub use validate::validate_snapshot;

//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source system (Tally export endpoint) configuration.
    pub source: SourceConfig,

    /// Target database (PostgreSQL) configuration.
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source system configuration. The extraction client itself is an external
/// collaborator; the engine only needs the tenant scope and the endpoint
/// identity it hands to that client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Tenant company identifier stamped onto every migrated row.
    pub company_id: String,

    /// Tenant division identifier stamped onto every migrated row.
    pub division_id: String,

    /// Company name as registered in the source system.
    pub company_name: String,

    /// Export endpoint URL.
    pub url: String,

    /// Request timeout in seconds. Large snapshot exports legitimately take
    /// minutes; the default matches the source system's observed worst case.
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Target schema (default: "tally").
    #[serde(default = "default_tally_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,
}

/// Migration behavior configuration. Performance fields use Option<T> to
/// distinguish "not set" (use default) from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    /// Rows per load chunk; each chunk commits as one atomic unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    /// Retry attempts for transient failures before a chunk is marked failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Base backoff between retries, doubled per attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,

    /// Concurrent load workers for mutually independent kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_workers: Option<usize>,

    /// Maximum PostgreSQL connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pg_connections: Option<usize>,

    /// Phase failure policy (default: skip_and_continue).
    #[serde(default)]
    pub strictness: Strictness,

    /// Stop after validation; nothing is written to the target.
    #[serde(default)]
    pub skip_load: bool,

    /// Skip the post-load verification pass.
    #[serde(default)]
    pub skip_verify: bool,
}

impl MigrationConfig {
    pub fn get_chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(1_000)
    }

    pub fn get_max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(3)
    }

    pub fn get_retry_backoff_ms(&self) -> u64 {
        self.retry_backoff_ms.unwrap_or(500)
    }

    pub fn get_load_workers(&self) -> usize {
        self.load_workers.unwrap_or(4)
    }

    pub fn get_max_pg_connections(&self) -> usize {
        self.max_pg_connections.unwrap_or(8)
    }
}

/// Phase-level failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Any fatal record issue aborts the run before Load.
    AbortOnFatal,

    /// Fatal records are excluded and the run proceeds with what remains.
    #[default]
    SkipAndContinue,
}

// Default value functions for serde

fn default_source_timeout() -> u64 {
    120
}

fn default_pg_port() -> u16 {
    5432
}

fn default_tally_schema() -> String {
    "tally".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

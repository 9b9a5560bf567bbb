//! PostgreSQL target store implementation.
//!
//! Every write is a GUID-keyed upsert inside a per-chunk transaction, so a
//! chunk either commits whole or leaves the target untouched. The update arm
//! carries an `IS DISTINCT FROM` guard: a row whose persisted values already
//! match the incoming record is not rewritten and counts as neither insert
//! nor update, which is what makes a re-run of the same snapshot report
//! zero changes.

use crate::config::Config;
use crate::entity::{EntityKind, EntryRecord, MasterRecord, VoucherRecord};
use crate::error::{MigrateError, Result};
use crate::target::{StoredKey, TargetStore, UpsertStats};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{types::ToSql, Config as PgConfig, NoTls};
use tracing::{debug, info};

/// PostgreSQL-backed target store, scoped to one tenant.
pub struct PgStore {
    pool: Pool,
    schema: String,
    company_id: String,
    division_id: String,
}

impl PgStore {
    /// Create a new store and verify connectivity with a probe query.
    pub async fn new(config: &Config, max_conns: usize) -> Result<Self> {
        let target = &config.target;

        let mut pg_config = PgConfig::new();
        pg_config.host(&target.host);
        pg_config.port(target.port);
        pg_config.dbname(&target.database);
        pg_config.user(&target.user);
        pg_config.password(&target.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(max_conns)
            .build()
            .map_err(|e| MigrateError::pool(format!("Failed to create pool: {}", e), "PgStore::new"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(format!("Failed to get connection: {}", e), "PgStore::new"))?;

        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            target.host, target.port, target.database
        );

        Ok(Self {
            pool,
            schema: target.schema.clone(),
            company_id: config.source.company_id.clone(),
            division_id: config.source.division_id.clone(),
        })
    }

    /// Quote a PostgreSQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Fully qualify a table for this store's schema.
    fn qualify(&self, table: &str) -> String {
        format!("{}.{}", Self::quote_ident(&self.schema), Self::quote_ident(table))
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), context))
    }

    fn master_upsert_sql(&self, kind: EntityKind) -> String {
        format!(
            "INSERT INTO {} AS t \
             (guid, company_id, division_id, name, alias, parent, parent_id, description) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (guid) DO UPDATE SET \
             name = EXCLUDED.name, alias = EXCLUDED.alias, parent = EXCLUDED.parent, \
             parent_id = EXCLUDED.parent_id, description = EXCLUDED.description \
             WHERE (t.name, t.alias, t.parent, t.parent_id, t.description) \
             IS DISTINCT FROM \
             (EXCLUDED.name, EXCLUDED.alias, EXCLUDED.parent, EXCLUDED.parent_id, EXCLUDED.description) \
             RETURNING id, (xmax = 0) AS inserted",
            self.qualify(kind.table_name())
        )
    }

    fn voucher_upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} AS t \
             (guid, company_id, division_id, date, voucher_type, voucher_type_id, \
              voucher_number, party_name, party_ledger_id, narration, reference, \
              amount, is_invoice, affects_inventory) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (guid) DO UPDATE SET \
             date = EXCLUDED.date, voucher_type = EXCLUDED.voucher_type, \
             voucher_type_id = EXCLUDED.voucher_type_id, voucher_number = EXCLUDED.voucher_number, \
             party_name = EXCLUDED.party_name, party_ledger_id = EXCLUDED.party_ledger_id, \
             narration = EXCLUDED.narration, reference = EXCLUDED.reference, \
             amount = EXCLUDED.amount, is_invoice = EXCLUDED.is_invoice, \
             affects_inventory = EXCLUDED.affects_inventory \
             WHERE (t.date, t.voucher_type, t.voucher_type_id, t.voucher_number, t.party_name, \
                    t.party_ledger_id, t.narration, t.reference, t.amount, t.is_invoice, \
                    t.affects_inventory) \
             IS DISTINCT FROM \
             (EXCLUDED.date, EXCLUDED.voucher_type, EXCLUDED.voucher_type_id, \
              EXCLUDED.voucher_number, EXCLUDED.party_name, EXCLUDED.party_ledger_id, \
              EXCLUDED.narration, EXCLUDED.reference, EXCLUDED.amount, EXCLUDED.is_invoice, \
              EXCLUDED.affects_inventory) \
             RETURNING id, (xmax = 0) AS inserted",
            self.qualify(EntityKind::Voucher.table_name())
        )
    }

    fn entry_upsert_sql(&self, kind: EntityKind) -> Option<String> {
        let (ref_id_col, ref_name_col) = kind.entry_ref_columns()?;
        Some(format!(
            "INSERT INTO {} AS t \
             (guid, company_id, division_id, voucher_id, {ref_id}, {ref_name}, \
              category, amount, quantity, rate, is_debit, sort_order) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (guid) DO UPDATE SET \
             voucher_id = EXCLUDED.voucher_id, {ref_id} = EXCLUDED.{ref_id}, \
             {ref_name} = EXCLUDED.{ref_name}, category = EXCLUDED.category, \
             amount = EXCLUDED.amount, quantity = EXCLUDED.quantity, rate = EXCLUDED.rate, \
             is_debit = EXCLUDED.is_debit, sort_order = EXCLUDED.sort_order \
             WHERE (t.voucher_id, t.{ref_id}, t.{ref_name}, t.category, t.amount, t.quantity, \
                    t.rate, t.is_debit, t.sort_order) \
             IS DISTINCT FROM \
             (EXCLUDED.voucher_id, EXCLUDED.{ref_id}, EXCLUDED.{ref_name}, EXCLUDED.category, \
              EXCLUDED.amount, EXCLUDED.quantity, EXCLUDED.rate, EXCLUDED.is_debit, \
              EXCLUDED.sort_order) \
             RETURNING id, (xmax = 0) AS inserted",
            self.qualify(kind.table_name()),
            ref_id = ref_id_col,
            ref_name = ref_name_col,
        ))
    }
}

#[async_trait]
impl TargetStore for PgStore {
    async fn fetch_key_map(&self, kind: EntityKind) -> Result<Vec<StoredKey>> {
        let client = self.client("fetch_key_map").await?;

        // Entry tables and vouchers carry no display name; only masters are
        // name-resolvable.
        let name_expr = if kind.is_master() { "name" } else { "''::text" };
        let sql = format!(
            "SELECT guid, {}, id FROM {} WHERE company_id = $1 AND division_id = $2",
            name_expr,
            self.qualify(kind.table_name())
        );

        let rows = client
            .query(&sql, &[&self.company_id, &self.division_id])
            .await?;

        Ok(rows
            .iter()
            .map(|row| StoredKey {
                guid: row.get(0),
                name: row.get(1),
                id: row.get(2),
            })
            .collect())
    }

    async fn upsert_masters(
        &self,
        kind: EntityKind,
        records: &[MasterRecord],
    ) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if records.is_empty() {
            return Ok(stats);
        }

        let mut client = self.client("upsert_masters").await?;
        let tx = client.transaction().await?;
        let stmt = tx.prepare(&self.master_upsert_sql(kind)).await?;

        for record in records {
            let params: [&(dyn ToSql + Sync); 8] = [
                &record.guid,
                &self.company_id,
                &self.division_id,
                &record.name,
                &record.alias,
                &record.parent_name,
                &record.parent_id,
                &record.description,
            ];
            // Unchanged rows return nothing
            if let Some(row) = tx.query_opt(&stmt, &params).await? {
                let id: i64 = row.get(0);
                let inserted: bool = row.get(1);
                if inserted {
                    stats.inserted += 1;
                } else {
                    stats.updated += 1;
                }
                stats.ids.push((record.guid.clone(), id));
            }
        }

        tx.commit().await?;
        debug!(
            "{}: upserted chunk of {} ({} inserted, {} updated)",
            kind,
            records.len(),
            stats.inserted,
            stats.updated
        );
        Ok(stats)
    }

    async fn upsert_vouchers(&self, records: &[VoucherRecord]) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if records.is_empty() {
            return Ok(stats);
        }

        let mut client = self.client("upsert_vouchers").await?;
        let tx = client.transaction().await?;
        let stmt = tx.prepare(&self.voucher_upsert_sql()).await?;

        for record in records {
            let params: [&(dyn ToSql + Sync); 14] = [
                &record.guid,
                &self.company_id,
                &self.division_id,
                &record.date,
                &record.voucher_type,
                &record.voucher_type_id,
                &record.voucher_number,
                &record.party_name,
                &record.party_ledger_id,
                &record.narration,
                &record.reference,
                &record.amount,
                &record.is_invoice,
                &record.affects_inventory,
            ];
            if let Some(row) = tx.query_opt(&stmt, &params).await? {
                let id: i64 = row.get(0);
                let inserted: bool = row.get(1);
                if inserted {
                    stats.inserted += 1;
                } else {
                    stats.updated += 1;
                }
                stats.ids.push((record.guid.clone(), id));
            }
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn upsert_entries(
        &self,
        kind: EntityKind,
        records: &[EntryRecord],
    ) -> Result<UpsertStats> {
        let mut stats = UpsertStats::default();
        if records.is_empty() {
            return Ok(stats);
        }

        let sql = self
            .entry_upsert_sql(kind)
            .ok_or_else(|| MigrateError::persistence(kind.to_string(), "not an entry kind"))?;

        let mut client = self.client("upsert_entries").await?;
        let tx = client.transaction().await?;
        let stmt = tx.prepare(&sql).await?;

        for record in records {
            let params: [&(dyn ToSql + Sync); 12] = [
                &record.guid,
                &self.company_id,
                &self.division_id,
                &record.voucher_id,
                &record.ref_id,
                &record.ref_name,
                &record.category,
                &record.amount,
                &record.quantity,
                &record.rate,
                &record.is_debit,
                &record.sort_order,
            ];
            if let Some(row) = tx.query_opt(&stmt, &params).await? {
                let id: i64 = row.get(0);
                let inserted: bool = row.get(1);
                if inserted {
                    stats.inserted += 1;
                } else {
                    stats.updated += 1;
                }
                stats.ids.push((record.guid.clone(), id));
            }
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn patch_parent(&self, kind: EntityKind, child_id: i64, parent_id: i64) -> Result<()> {
        let client = self.client("patch_parent").await?;
        let sql = format!(
            "UPDATE {} SET parent_id = $1 WHERE id = $2 AND parent_id IS DISTINCT FROM $1",
            self.qualify(kind.table_name())
        );
        client.execute(&sql, &[&parent_id, &child_id]).await?;
        Ok(())
    }

    async fn count_rows(&self, kind: EntityKind) -> Result<u64> {
        let client = self.client("count_rows").await?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE company_id = $1 AND division_id = $2",
            self.qualify(kind.table_name())
        );
        let row = client
            .query_one(&sql, &[&self.company_id, &self.division_id])
            .await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn count_dangling_entries(&self, kind: EntityKind) -> Result<u64> {
        let client = self.client("count_dangling_entries").await?;
        let sql = format!(
            "SELECT COUNT(*) FROM {} e \
             LEFT JOIN {} v ON e.voucher_id = v.id \
             WHERE e.company_id = $1 AND e.division_id = $2 AND v.id IS NULL",
            self.qualify(kind.table_name()),
            self.qualify(EntityKind::Voucher.table_name())
        );
        let row = client
            .query_one(&sql, &[&self.company_id, &self.division_id])
            .await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(PgStore::quote_ident("ledgers"), "\"ledgers\"");
        assert_eq!(PgStore::quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

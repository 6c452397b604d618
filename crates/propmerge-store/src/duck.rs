//! DuckDB storage: bulk read of the proposal snapshot and persistence of the
//! consolidation outcome.

use std::path::Path;

use arrow::array::{Array, Int64Array, LargeStringArray, StringArray};
use arrow::record_batch::RecordBatch;
use duckdb::{Connection, params, params_from_iter};
use propmerge_core::{ConsolidationOutcome, SourceProposal};
use serde_json::Value;
use tracing::{info, warn};

use crate::StoreError;
use crate::layout::{TableLayout, check_identifier, decode_row};

/// What [`DuckStore::apply_outcome`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub flagged_retained: usize,
    pub flagged_consumed: usize,
    pub staged_proposals: usize,
    /// `(table, rows copied)` per child table present in the source schema.
    pub staged_children: Vec<(String, usize)>,
}

/// DuckDB store holding the proposal table, its child tables and the staging
/// copy of retained proposals.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Whether `schema.table` exists.
    pub fn has_table(&self, schema: &str, table: &str) -> Result<bool, StoreError> {
        table_exists(&self.conn, schema, table)
    }

    /// Read every proposal of `schema` into memory.
    pub fn load_proposals(
        &self,
        schema: &str,
        layout: &TableLayout,
    ) -> Result<Vec<SourceProposal>, StoreError> {
        layout.validate()?;
        let table = qualified(schema, &layout.proposal_table)?;
        let batches =
            self.query_arrow(&format!("SELECT to_json(p)::VARCHAR AS row FROM {table} AS p"))?;

        let mut proposals = Vec::with_capacity(batches.iter().map(|b| b.num_rows()).sum());
        for batch in &batches {
            let col = batch.column(0);
            for i in 0..batch.num_rows() {
                let text = row_text(col.as_ref(), i)
                    .ok_or_else(|| StoreError::Other("row column is not text".into()))?;
                let row: Value = serde_json::from_str(text)?;
                proposals.push(decode_row(proposals.len(), &row, layout)?);
            }
        }
        info!(count = proposals.len(), table = %table, "loaded proposals");
        Ok(proposals)
    }

    /// Persist a consolidation outcome in one transaction.
    ///
    /// 1. Flag every source row as retained or consumed (with the absorbing id
    ///    and the reason).
    /// 2. Recreate `staging_schema.<proposal table>` with only the retained rows,
    ///    carrying their widened ranges and unioned codes.
    /// 3. Copy child rows that reference retained proposals into staging.
    ///
    /// Nothing is written if any step fails.
    pub fn apply_outcome(
        &mut self,
        schema: &str,
        staging_schema: &str,
        layout: &TableLayout,
        outcome: &ConsolidationOutcome,
    ) -> Result<ApplySummary, StoreError> {
        outcome.verify()?;
        layout.validate()?;
        check_identifier(staging_schema)?;

        let source = qualified(schema, &layout.proposal_table)?;
        let staging = qualified(staging_schema, &layout.proposal_table)?;
        let id = quote(&layout.id_column);
        let retained_flag = quote(&layout.retained_flag_column);
        let consumed_by = quote(&layout.consumed_by_column);
        let consumed_reason = quote(&layout.consumed_reason_column);

        let tx = self.conn.transaction()?;
        let mut summary = ApplySummary::default();

        // ── Flags on the source table ──

        tx.execute_batch(&format!(
            "ALTER TABLE {source} ADD COLUMN IF NOT EXISTS {retained_flag} BOOLEAN;
             ALTER TABLE {source} ADD COLUMN IF NOT EXISTS {consumed_by} VARCHAR;
             ALTER TABLE {source} ADD COLUMN IF NOT EXISTS {consumed_reason} VARCHAR;
             UPDATE {source}
                 SET {retained_flag} = NULL, {consumed_by} = NULL, {consumed_reason} = NULL;"
        ))?;
        {
            let mut keep = tx.prepare(&format!(
                "UPDATE {source} SET {retained_flag} = TRUE WHERE CAST({id} AS VARCHAR) = ?"
            ))?;
            for retained in &outcome.retained {
                summary.flagged_retained += keep.execute(params![retained.id().as_str()])?;
            }

            let mut consume = tx.prepare(&format!(
                "UPDATE {source}
                 SET {retained_flag} = FALSE, {consumed_by} = ?, {consumed_reason} = ?
                 WHERE CAST({id} AS VARCHAR) = ?"
            ))?;
            for record in outcome.consumed.values() {
                summary.flagged_consumed += consume.execute(params![
                    record.retained_id.as_str(),
                    record.reason.as_str(),
                    record.consumed_id.as_str()
                ])?;
            }
        }

        // ── Staging copy of retained proposals ──

        tx.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {staging_schema_q};
             CREATE OR REPLACE TABLE {staging} AS
                 SELECT * EXCLUDE ({retained_flag}, {consumed_by}, {consumed_reason})
                 FROM {source} WHERE {retained_flag};",
            staging_schema_q = quote(staging_schema),
        ))?;
        {
            // Tables without effective or code columns decode with fallbacks;
            // only the columns the table has are written back.
            let existing = table_columns(&tx, staging_schema, &layout.proposal_table)?;
            let widened: Vec<(&str, Widened)> = [
                (&layout.date_from_column, Widened::DateFrom),
                (&layout.date_to_column, Widened::DateTo),
                (&layout.effective_from_column, Widened::EffectiveFrom),
                (&layout.effective_to_column, Widened::EffectiveTo),
                (&layout.product_codes_column, Widened::ProductCodes),
                (&layout.plan_codes_column, Widened::PlanCodes),
            ]
            .into_iter()
            .filter(|(column, _)| existing.iter().any(|c| c == *column))
            .map(|(column, field)| (column.as_str(), field))
            .collect();

            if !widened.is_empty() {
                let assignments: Vec<String> = widened
                    .iter()
                    .map(|(column, field)| field.assignment(column))
                    .collect();
                let mut widen = tx.prepare(&format!(
                    "UPDATE {staging} SET {} WHERE CAST({id} AS VARCHAR) = ?",
                    assignments.join(", "),
                ))?;
                for retained in &outcome.retained {
                    let p = &retained.proposal;
                    let mut values: Vec<Option<String>> =
                        widened.iter().map(|(_, field)| field.value(p)).collect();
                    values.push(Some(p.id.to_string()));
                    widen.execute(params_from_iter(values))?;
                }
            }
        }
        summary.staged_proposals = count_rows(&tx, &staging)?;

        // ── Child tables ──

        for child in &layout.child_tables {
            if !table_exists(&tx, schema, &child.table)? {
                warn!(table = %child.table, schema, "child table not found, skipping");
                continue;
            }
            let child_source = qualified(schema, &child.table)?;
            let child_staging = qualified(staging_schema, &child.table)?;
            tx.execute_batch(&format!(
                "CREATE OR REPLACE TABLE {child_staging} AS
                     SELECT c.* FROM {child_source} AS c
                     JOIN {source} AS p ON CAST(c.{fk} AS VARCHAR) = CAST(p.{id} AS VARCHAR)
                     WHERE p.{retained_flag};",
                fk = quote(&child.proposal_column),
            ))?;
            let copied = count_rows(&tx, &child_staging)?;
            info!(table = %child.table, rows = copied, "staged child rows");
            summary.staged_children.push((child.table.clone(), copied));
        }

        tx.commit()?;
        info!(
            retained = summary.flagged_retained,
            consumed = summary.flagged_consumed,
            staged = summary.staged_proposals,
            "applied consolidation outcome"
        );
        Ok(summary)
    }

    /// Execute a batch of SQL statements.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    /// Number of rows in `schema.table`.
    pub fn count_table(&self, schema: &str, table: &str) -> Result<usize, StoreError> {
        count_rows(&self.conn, &qualified(schema, table)?)
    }
}

/// Staging column rewritten with the survivor's widened value.
#[derive(Debug, Clone, Copy)]
enum Widened {
    DateFrom,
    DateTo,
    EffectiveFrom,
    EffectiveTo,
    ProductCodes,
    PlanCodes,
}

impl Widened {
    fn assignment(self, column: &str) -> String {
        match self {
            Self::ProductCodes | Self::PlanCodes => format!("{} = ?", quote(column)),
            _ => format!("{} = CAST(? AS DATE)", quote(column)),
        }
    }

    fn value(self, p: &SourceProposal) -> Option<String> {
        match self {
            Self::DateFrom => Some(p.date_range.from.to_string()),
            Self::DateTo => p.date_range.to.map(|d| d.to_string()),
            Self::EffectiveFrom => Some(p.effective_date_range.from.to_string()),
            Self::EffectiveTo => p.effective_date_range.to.map(|d| d.to_string()),
            Self::ProductCodes => Some(p.product_codes.encode()),
            Self::PlanCodes => Some(p.plan_codes.encode()),
        }
    }
}

fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

fn qualified(schema: &str, table: &str) -> Result<String, StoreError> {
    check_identifier(schema)?;
    check_identifier(table)?;
    Ok(format!("{}.{}", quote(schema), quote(table)))
}

fn table_exists(conn: &Connection, schema: &str, table: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT count(*)::BIGINT AS cnt FROM information_schema.tables
         WHERE table_schema = ? AND table_name = ?",
    )?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([schema, table])?.collect();
    Ok(first_count(&batches)? > 0)
}

fn table_columns(conn: &Connection, schema: &str, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT column_name::VARCHAR AS name FROM information_schema.columns
         WHERE table_schema = ? AND table_name = ?",
    )?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([schema, table])?.collect();
    let mut columns = Vec::new();
    for batch in &batches {
        let col = batch.column(0);
        columns.extend(
            (0..batch.num_rows())
                .filter_map(|i| row_text(col.as_ref(), i))
                .map(String::from),
        );
    }
    Ok(columns)
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize, StoreError> {
    let sql = format!("SELECT count(*)::BIGINT AS cnt FROM {table}");
    let mut stmt = conn.prepare(&sql)?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
    first_count(&batches)
}

fn first_count(batches: &[RecordBatch]) -> Result<usize, StoreError> {
    let batch = batches.first().ok_or(StoreError::NoResults)?;
    let col = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
    Ok(col.value(0) as usize)
}

/// Get a string value from a column that might be Utf8 or LargeUtf8.
fn row_text(col: &dyn Array, i: usize) -> Option<&str> {
    if col.is_null(i) {
        return None;
    }
    if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
        return Some(arr.value(i));
    }
    if let Some(arr) = col.as_any().downcast_ref::<LargeStringArray>() {
        return Some(arr.value(i));
    }
    None
}

//! Insert-or-update of canonical rows keyed by `record_code`
//!
//! Rows are written in batches with `INSERT ... ON CONFLICT DO UPDATE`, so
//! applying the same chunk twice leaves the store unchanged. One transaction
//! covers a whole chunk. When a batch is rejected it is replayed row by row
//! under savepoints, which confines a bad row to a row-level error.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::coerce::CanonicalRow;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Outcome of reconciling one chunk's rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Input rows whose values are now in the store
    pub reconciled: u64,
    /// Rows that created a new record
    pub inserted: u64,
    /// Rows that overwrote an existing record
    pub updated: u64,
    pub errors: Vec<String>,
}

#[async_trait]
pub trait CanonicalStore: Send + Sync {
    async fn reconcile(&self, rows: Vec<CanonicalRow>) -> Result<ReconcileSummary, ReconcileError>;
}

pub struct PgCanonicalStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgCanonicalStore {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl CanonicalStore for PgCanonicalStore {
    #[instrument(skip_all, fields(rows = rows.len(), batch_size = self.batch_size))]
    async fn reconcile(&self, rows: Vec<CanonicalRow>) -> Result<ReconcileSummary, ReconcileError> {
        let mut summary = ReconcileSummary::default();

        let (keyed, unkeyed): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|row| row.record_code.is_some());
        for row in &unkeyed {
            summary
                .errors
                .push(format!("line {}: record_code is empty", row.line));
        }

        let mut tx = self.pool.begin().await?;

        for batch in keyed.chunks(self.batch_size) {
            let batch = collapse_duplicates(batch);

            sqlx::query("SAVEPOINT batch_savepoint").execute(&mut *tx).await?;
            match upsert(&mut tx, &batch).await {
                Ok(inserted) => {
                    sqlx::query("RELEASE SAVEPOINT batch_savepoint")
                        .execute(&mut *tx)
                        .await?;
                    for ((_, weight), was_insert) in batch.iter().zip(inserted) {
                        summary.count(*weight, was_insert);
                    }
                },
                Err(e) => {
                    sqlx::query("ROLLBACK TO SAVEPOINT batch_savepoint")
                        .execute(&mut *tx)
                        .await?;
                    warn!(
                        batch_rows = batch.len(),
                        error = %e,
                        "Batch upsert rejected; isolating rows with savepoints"
                    );
                    upsert_row_by_row(&mut tx, &batch, &mut summary).await?;
                },
            }
        }

        tx.commit().await?;

        debug!(
            reconciled = summary.reconciled,
            inserted = summary.inserted,
            updated = summary.updated,
            errors = summary.errors.len(),
            "Rows reconciled"
        );

        Ok(summary)
    }
}

impl ReconcileSummary {
    fn count(&mut self, weight: u64, was_insert: bool) {
        self.reconciled += weight;
        if was_insert {
            self.inserted += 1;
        } else {
            self.updated += 1;
        }
    }
}

/// Keep the last row per key, in first-seen key order
///
/// A single upsert statement may not touch the same row twice. The weight is
/// the number of input rows that collapsed into the survivor.
fn collapse_duplicates(batch: &[CanonicalRow]) -> Vec<(&CanonicalRow, u64)> {
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(batch.len());
    let mut survivors: Vec<(&CanonicalRow, u64)> = Vec::with_capacity(batch.len());

    for row in batch {
        let key = row.record_code.as_deref().unwrap_or_default();
        match positions.get(key) {
            Some(&at) => {
                survivors[at].0 = row;
                survivors[at].1 += 1;
            },
            None => {
                positions.insert(key, survivors.len());
                survivors.push((row, 1));
            },
        }
    }

    survivors
}

async fn upsert_row_by_row(
    tx: &mut Transaction<'_, Postgres>,
    batch: &[(&CanonicalRow, u64)],
    summary: &mut ReconcileSummary,
) -> Result<(), ReconcileError> {
    for entry in batch {
        sqlx::query("SAVEPOINT row_savepoint").execute(&mut **tx).await?;
        match upsert(tx, std::slice::from_ref(entry)).await {
            Ok(inserted) => {
                sqlx::query("RELEASE SAVEPOINT row_savepoint")
                    .execute(&mut **tx)
                    .await?;
                summary.count(entry.1, inserted.first().copied().unwrap_or(false));
            },
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT row_savepoint")
                    .execute(&mut **tx)
                    .await?;
                summary.errors.push(format!("line {}: {}", entry.0.line, database_message(&e)));
            },
        }
    }
    Ok(())
}

/// Upsert one batch; returns, per row, whether it was an insert
async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    batch: &[(&CanonicalRow, u64)],
) -> Result<Vec<bool>, sqlx::Error> {
    let mut query_builder = QueryBuilder::<Postgres>::new(
        r#"
        INSERT INTO canonical_records (
            record_code, name, name_kana, category_code, postal_code, address, phone,
            quantity, amount, registered_on, updated_on, status_code, remarks
        )
        "#,
    );

    query_builder.push_values(batch.iter(), |mut b, (row, _)| {
        b.push_bind(&row.record_code)
            .push_bind(&row.name)
            .push_bind(&row.name_kana)
            .push_bind(&row.category_code)
            .push_bind(&row.postal_code)
            .push_bind(&row.address)
            .push_bind(&row.phone)
            .push_bind(row.quantity)
            .push_bind(row.amount)
            .push_bind(row.registered_on)
            .push_bind(row.updated_on)
            .push_bind(&row.status_code)
            .push_bind(&row.remarks);
    });

    query_builder.push(
        r#"
        ON CONFLICT (record_code) DO UPDATE SET
            name = EXCLUDED.name,
            name_kana = EXCLUDED.name_kana,
            category_code = EXCLUDED.category_code,
            postal_code = EXCLUDED.postal_code,
            address = EXCLUDED.address,
            phone = EXCLUDED.phone,
            quantity = EXCLUDED.quantity,
            amount = EXCLUDED.amount,
            registered_on = EXCLUDED.registered_on,
            updated_on = EXCLUDED.updated_on,
            status_code = EXCLUDED.status_code,
            remarks = EXCLUDED.remarks,
            reconciled_at = NOW()
        RETURNING (xmax = 0) AS inserted
        "#,
    );

    query_builder
        .build_query_scalar::<bool>()
        .fetch_all(&mut **tx)
        .await
}

fn database_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(line: u64, key: &str, name: &str) -> CanonicalRow {
        CanonicalRow {
            line,
            record_code: Some(key.to_string()),
            name: Some(name.to_string()),
            name_kana: None,
            category_code: None,
            postal_code: None,
            address: None,
            phone: None,
            quantity: None,
            amount: None,
            registered_on: None,
            updated_on: None,
            status_code: None,
            remarks: None,
        }
    }

    #[test]
    fn test_collapse_duplicates_last_wins() {
        let batch = vec![row(2, "A", "first"), row(3, "B", "only"), row(4, "A", "second")];
        let survivors = collapse_duplicates(&batch);

        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].0.name.as_deref(), Some("second"));
        assert_eq!(survivors[0].1, 2);
        assert_eq!(survivors[1].0.record_code.as_deref(), Some("B"));
        assert_eq!(survivors[1].1, 1);
    }

    #[test]
    fn test_summary_counts_weight() {
        let mut summary = ReconcileSummary::default();
        summary.count(2, true);
        summary.count(1, false);
        assert_eq!(summary.reconciled, 3);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.updated, 1);
    }
}

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::models::ProbabilityRecord;
use crate::error::Result;
use crate::scanner::{ProbabilityRow, ProbabilityTable};

/// Replaces every persisted row for `symbol` with `rows` in one
/// transaction. Readers see either the old set or the new one.
pub async fn replace_symbol_rows(
    pool: &SqlitePool,
    symbol: &str,
    rows: &[ProbabilityRow],
    generated_at_ms: i64,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM probability_rows WHERE symbol = ?")
        .bind(symbol)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for row in rows {
        let direction = row.direction.to_string();
        let state_key = row.state_key.to_string();
        sqlx::query(
            r#"
            INSERT INTO probability_rows (
                symbol, trigger_label, outcome_label, direction, state_key,
                successes, total, probability, generated_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(symbol)
        .bind(&row.trigger_label)
        .bind(&row.outcome_label)
        .bind(direction)
        .bind(state_key)
        .bind(row.successes as i64)
        .bind(row.total as i64)
        .bind(row.probability)
        .bind(generated_at_ms)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(symbol, removed, inserted = rows.len(), "Probability rows replaced");
    Ok(())
}

/// Loads the whole persisted table. Rows that fail to parse are logged and
/// left out.
pub async fn load_table(pool: &SqlitePool) -> Result<ProbabilityTable> {
    let records = sqlx::query_as::<_, ProbabilityRecord>(
        r#"
        SELECT symbol, trigger_label, outcome_label, direction, state_key,
               successes, total, probability, generated_at_ms
        FROM probability_rows
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        match ProbabilityRow::try_from(record) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping stored probability row: {e}"),
        }
    }
    Ok(ProbabilityTable::new(rows))
}

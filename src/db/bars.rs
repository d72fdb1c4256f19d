use sqlx::SqlitePool;

use crate::db::models::BarRecord;
use crate::error::Result;
use crate::types::Bar;

/// Every symbol with at least one bar, sorted.
pub async fn load_symbols(pool: &SqlitePool) -> Result<Vec<String>> {
    let symbols = sqlx::query_scalar::<_, String>("SELECT DISTINCT symbol FROM bars ORDER BY symbol")
        .fetch_all(pool)
        .await?;
    Ok(symbols)
}

/// Bars for one symbol in time order. Validation is left to the scanner,
/// which reports the first malformed index.
pub async fn load_bars(pool: &SqlitePool, symbol: &str) -> Result<Vec<Bar>> {
    let rows = sqlx::query_as::<_, BarRecord>(
        r#"
        SELECT ts_ms, open, high, low, close
        FROM bars
        WHERE symbol = ?
        ORDER BY ts_ms ASC
        "#,
    )
    .bind(symbol)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Bar::from).collect())
}

/// Upserts bars keyed on (symbol, ts_ms) in one transaction.
pub async fn insert_bars(pool: &SqlitePool, symbol: &str, bars: &[Bar]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for bar in bars {
        written += sqlx::query(
            r#"
            INSERT INTO bars (symbol, ts_ms, open, high, low, close)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, ts_ms) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close
            "#,
        )
        .bind(symbol)
        .bind(bar.ts_ms)
        .bind(bar.open)
        .bind(bar.high)
        .bind(bar.low)
        .bind(bar.close)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

//! Offline scan: historical bars in, probability table out.
//!
//! Each symbol is scanned on its own and persisted only when its scan
//! completes; aborted or cancelled symbols keep their previous rows.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fx_edge::config::Config;
use fx_edge::db;
use fx_edge::error::Result;
use fx_edge::scanner::scan::scan_parallel;
use fx_edge::scanner::{CancelFlag, ConditionalProbabilityScanner, ScanConfig, ScanJob};
use fx_edge::types::now_ms;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    match run(cfg).await {
        Ok(0) => {}
        Ok(failed) => {
            warn!("{failed} symbol(s) not persisted");
            std::process::exit(2);
        }
        Err(e) => {
            error!("Fatal error: {e}");
            std::process::exit(1);
        }
    }
}

/// Returns how many symbols failed or were cancelled.
async fn run(cfg: Config) -> Result<usize> {
    let pool = db::connect(&cfg.db_path).await?;

    let symbols = if cfg.scan_symbols.is_empty() {
        db::load_symbols(&pool).await?
    } else {
        cfg.scan_symbols.clone()
    };
    if symbols.is_empty() {
        warn!("No symbols to scan: the bars table is empty and SCAN_SYMBOLS is unset");
        return Ok(0);
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling scan");
                cancel.cancel();
            }
        });
    }

    let mut jobs = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let bars = db::load_bars(&pool, &symbol).await?;
        if bars.is_empty() {
            warn!(symbol = %symbol, "No bars, skipping");
            continue;
        }
        info!(symbol = %symbol, bars = bars.len(), "Queued for scan");
        jobs.push(ScanJob {
            pip: cfg.pip_sizes.pip_size(&symbol),
            symbol,
            bars,
        });
    }

    let scan_cfg = ScanConfig::from_config(&cfg);
    info!(
        instruments = jobs.len(),
        triggers = scan_cfg.triggers.len(),
        outcomes = scan_cfg.outcomes.len(),
        "Scan starting"
    );
    let scanner = Arc::new(ConditionalProbabilityScanner::new(scan_cfg));
    let results = scan_parallel(scanner, jobs, cancel).await;

    let generated_at_ms = now_ms();
    let mut persisted = 0;
    let mut failed = 0;
    for (symbol, result) in results {
        let scan = match result {
            Ok(scan) => scan,
            Err(_) => {
                // already logged by scan_parallel
                failed += 1;
                continue;
            }
        };
        let rows = scan.into_rows(cfg.laplace_alpha);
        match db::replace_symbol_rows(&pool, &symbol, &rows, generated_at_ms).await {
            Ok(()) => persisted += 1,
            Err(e) => {
                error!(symbol = %symbol, "Persisting rows failed: {e}");
                failed += 1;
            }
        }
    }

    info!(persisted, failed, "Scan finished");
    Ok(failed)
}

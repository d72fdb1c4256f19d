use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fx_edge::api::{router, ApiState};
use fx_edge::config::{Config, CHANNEL_CAPACITY};
use fx_edge::db;
use fx_edge::engine::tasks::{run_ingest, run_refresh, run_table_reload};
use fx_edge::engine::Engine;
use fx_edge::error::Result;
use fx_edge::feed::forward_stdin;

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

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    let table = db::load_table(&pool).await?;
    info!(rows = table.len(), "Probability table loaded");
    if table.is_empty() {
        warn!("Probability table is empty; run the scan binary to populate it. Edge lookups will report no rows.");
    }

    info!(
        currencies = cfg.currencies.len(),
        windows = cfg.windows.len(),
        triggers = cfg.triggers.len(),
        retention_ms = cfg.retention_ms(),
        n_min = cfg.n_min,
        "Engine configured"
    );
    let engine = Engine::new(&cfg, table)?;

    // --- Tick feed -> ingestion ---
    let (tick_tx, tick_rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run_ingest(Arc::clone(&engine), tick_rx));
    tokio::spawn(async move {
        match forward_stdin(tick_tx).await {
            Ok(stats) => info!(
                lines = stats.lines,
                forwarded = stats.forwarded,
                malformed = stats.malformed,
                "Feed reached end of input"
            ),
            Err(e) => error!("Feed error: {e}"),
        }
    });

    // --- Periodic compute and table reload ---
    tokio::spawn(run_refresh(Arc::clone(&engine), cfg.refresh_interval_ms));
    tokio::spawn(run_table_reload(Arc::clone(&engine), pool.clone(), cfg.table_reload_secs));

    // --- HTTP API server ---
    let app = router(ApiState { engine });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

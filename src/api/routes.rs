use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthSnapshot;
use crate::api::latency::LatencySummary;
use crate::edge::EdgeMatch;
use crate::engine::{Engine, OscillatorSnapshot};
use crate::error::AppError;
use crate::scanner::table::ConfidenceTier;
use crate::scanner::ProbabilityRow;
use crate::types::PercentChangeResult;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/instruments", get(get_instruments))
        .route("/percent-change/:symbol", get(get_percent_change))
        .route("/strength", get(get_strength))
        .route("/oscillators", get(get_oscillators))
        .route("/edges", get(get_edges))
        .route("/edge/:symbol", get(get_edge))
        .route("/table/:symbol", get(get_table))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TableQuery {
    pub min_total: Option<u64>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub instruments: usize,
    #[serde(flatten)]
    pub counters: HealthSnapshot,
}

#[derive(Serialize)]
pub struct InstrumentResponse {
    pub instrument: String,
    pub ts_ms: i64,
    pub mid: f64,
}

/// Windows without enough history are listed as unavailable, not as 0.
#[derive(Serialize)]
pub struct PercentChangeResponse {
    pub instrument: String,
    pub changes: PercentChangeResult,
    pub unavailable: Vec<String>,
}

#[derive(Serialize)]
pub struct TableRowResponse {
    #[serde(flatten)]
    pub row: ProbabilityRow,
    pub wilson_lower: f64,
    pub confidence: ConfidenceTier,
}

impl From<&ProbabilityRow> for TableRowResponse {
    fn from(row: &ProbabilityRow) -> Self {
        Self {
            row: row.clone(),
            wilson_lower: row.wilson_lower(),
            confidence: row.confidence(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        instruments: state.engine.store().instrument_count(),
        counters: state.engine.health().snapshot(),
    })
}

async fn get_instruments(State(state): State<ApiState>) -> Json<Vec<InstrumentResponse>> {
    let store = state.engine.store();
    let instruments = store
        .known_instruments()
        .into_iter()
        .filter_map(|id| {
            let p = store.latest(&id).ok()?;
            Some(InstrumentResponse { instrument: id, ts_ms: p.ts_ms, mid: p.value })
        })
        .collect();
    Json(instruments)
}

async fn get_percent_change(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<PercentChangeResponse>, AppError> {
    let changes = state.engine.percent_change(&symbol)?;
    let unavailable = configured_windows(&state)
        .into_iter()
        .filter(|label| changes.get(label).is_none())
        .collect();
    Ok(Json(PercentChangeResponse { instrument: symbol, changes, unavailable }))
}

async fn get_strength(State(state): State<ApiState>) -> Json<BTreeMap<String, PercentChangeResult>> {
    Json(state.engine.strength())
}

async fn get_oscillators(State(state): State<ApiState>) -> Json<Vec<OscillatorSnapshot>> {
    Json(state.engine.oscillators())
}

/// Results of the last refresh pass, keyed by instrument.
async fn get_edges(State(state): State<ApiState>) -> Json<BTreeMap<String, EdgeMatch>> {
    Json(state.engine.latest_edges().into_iter().collect())
}

async fn get_edge(State(state): State<ApiState>, Path(symbol): Path<String>) -> Json<EdgeMatch> {
    Json(state.engine.edge(&symbol).await)
}

async fn get_table(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
    Query(params): Query<TableQuery>,
) -> Result<Json<Vec<TableRowResponse>>, AppError> {
    let table = state.engine.table().await;
    let min_total = params.min_total.unwrap_or(0);
    let rows: Vec<TableRowResponse> = table
        .ranked()
        .into_iter()
        .filter(|r| r.symbol == symbol && r.total >= min_total)
        .take(params.limit.unwrap_or(100))
        .map(TableRowResponse::from)
        .collect();
    if rows.is_empty() && table.for_symbol(&symbol).next().is_none() {
        return Err(AppError::NotAvailable(format!("no probability rows for {symbol}")));
    }
    Ok(Json(rows))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.engine.latency().summary())
}

fn configured_windows(state: &ApiState) -> Vec<String> {
    state.engine.windows().iter().map(|w| w.label.clone()).collect()
}

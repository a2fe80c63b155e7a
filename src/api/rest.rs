// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.
//
//   GET  /health                      liveness + counters
//   GET  /indicators/catalog          codes, names, families, default params
//   POST /indicators/compute          {type, params, bars}        -> chart array
//   POST /indicators/calculate        saved IndicatorConfig       -> chart array
//   POST /indicators/smart/:family    {ticker, target, ...}       -> optimum
//
// A chart request that cannot produce data answers 200 with `[]` so the
// dashboard draws an empty overlay.  Unknown indicators and bad parameters
// are 400; an optimizer without enough history is 422.
//
// CORS is configured permissively for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::error::EngineError;
use crate::indicators::{self, ChartSeries, IndicatorKind};
use crate::market_data::RawTable;
use crate::optimizer::{self, OptimizationResult, OptimizerFamily, SweepRequest};
use crate::types::ParamSet;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/indicators/catalog", get(indicator_catalog))
        .route("/api/v1/indicators/compute", post(compute_bars))
        .route("/api/v1/indicators/calculate", post(calculate_saved))
        .route("/api/v1/indicators/smart/:family", post(smart_optimize))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

/// `EngineError` rendered as an HTTP response.
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            // No usable data is an empty overlay, not a failure.
            EngineError::MalformedInput(_) => {
                return (StatusCode::OK, Json(ChartSeries::empty())).into_response();
            }
            EngineError::UnknownIndicator(_) | EngineError::InvalidParams(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::DataUnavailable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Computation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if self.0.is_surfaced() {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        } else {
            debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
    uptime_secs: i64,
    indicators_computed: u64,
    optimizations_run: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.uptime_secs(),
        indicators_computed: state.indicators_computed(),
        optimizations_run: state.optimizations_run(),
    };
    Json(resp)
}

// =============================================================================
// Indicators
// =============================================================================

async fn indicator_catalog() -> impl IntoResponse {
    Json(indicators::catalog())
}

#[derive(Deserialize)]
struct ComputeRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: ParamSet,
    #[serde(default)]
    bars: Vec<Map<String, Value>>,
}

async fn compute_bars(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ComputeRequest>,
) -> Result<Json<ChartSeries>, ApiError> {
    let table = RawTable::from_records(&req.bars);
    let chart = indicators::compute_from_table(&req.kind, &table, &req.params)?;
    state.record_indicator();
    Ok(Json(chart))
}

/// A saved indicator configuration as the dashboard persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    pub ticker: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: ParamSet,
    #[serde(default = "default_granularity")]
    pub granularity: String,
}

fn default_granularity() -> String {
    "days".to_string()
}

async fn calculate_saved(
    State(state): State<Arc<AppState>>,
    Json(cfg): Json<IndicatorConfig>,
) -> Result<Json<ChartSeries>, ApiError> {
    // Reject unknown codes before spending a provider round-trip.
    let kind: IndicatorKind = cfg.kind.parse()?;
    let window = state.config().history.for_granularity(&cfg.granularity).clone();

    let Some(table) = state
        .provider
        .fetch_history(&cfg.ticker, &window.period, &window.interval)
        .await
    else {
        warn!(ticker = %cfg.ticker, indicator = %kind, "no history, returning empty overlay");
        return Ok(Json(ChartSeries::empty()));
    };

    let chart = indicators::compute_from_table(kind.code(), &table, &cfg.params)?;
    state.record_indicator();
    if chart.is_empty() {
        warn!(ticker = %cfg.ticker, indicator = %kind, "indicator produced no points");
    }
    info!(
        ticker = %cfg.ticker,
        indicator = %kind,
        granularity = %cfg.granularity,
        points = chart.len(),
        "indicator calculated"
    );
    Ok(Json(chart))
}

// =============================================================================
// Smart optimizer
// =============================================================================

fn default_lookback_days() -> u32 {
    365
}

#[derive(Deserialize)]
struct SmartRequest {
    ticker: String,
    #[serde(default, alias = "target_up_percent", alias = "target_inside_percent")]
    target: Option<f64>,
    #[serde(default = "default_lookback_days")]
    lookback_days: u32,
    #[serde(default)]
    params: ParamSet,
}

async fn smart_optimize(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
    Json(req): Json<SmartRequest>,
) -> Result<Json<OptimizationResult>, ApiError> {
    let family: OptimizerFamily = family.parse()?;
    let target = req.target.unwrap_or_else(|| family.default_target());
    if !(0.0..=1.0).contains(&target) {
        return Err(EngineError::invalid_params(format!(
            "target must be within [0, 1], got {target}"
        ))
        .into());
    }

    let cfg = state.config();
    let sweep = SweepRequest {
        family,
        target,
        lookback_days: req.lookback_days,
        params: req.params,
    };
    let result = optimizer::optimize(state.provider.as_ref(), &req.ticker, sweep, &cfg).await?;
    state.record_optimization();
    Ok(Json(result))
}

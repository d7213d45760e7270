//! HTTP actions for the host scheduler
//!
//! A thin axum router exposing the batch operations: state poll, downtime
//! and alarm aggregation, report listing, and METRICA ingestion. These are
//! internal endpoints driven by a cron-style scheduler, not a public API.
//! Failures map to `503 Service Unavailable` with a short message; the
//! detailed error chain stays in the log.
//!
//! Date parameters (`date`, `startDate`, `endDate`) are `YYYY-MM-DD`; a
//! value in any other format reads as absent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use tokio::time::Instant;

use crate::client::metrica::{MetricaApi, DATE_FORMAT};
use crate::error::Result;
use crate::ingest::Ingester;
use crate::orchestrator::Orchestrator;

/// Shared handler context.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub ingester: Arc<Ingester>,
    pub metrica: Arc<dyn MetricaApi>,
    /// Deadline applied to each batch operation; `None` means unbounded.
    pub batch_timeout: Option<Duration>,
}

impl AppState {
    fn deadline(&self) -> Option<Instant> {
        self.batch_timeout.map(|t| Instant::now() + t)
    }
}

/// Builds the action router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(state_action))
        .route("/downtime", get(downtime_action))
        .route("/alarmed", get(alarmed_action))
        .route("/reports", get(reports_action))
        .route("/ingest", post(ingest_action))
        .with_state(Arc::new(state))
}

/// Binds and serves the action router until the task is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("serving MoSAPI actions on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

type ActionResult = std::result::Result<Json<serde_json::Value>, (StatusCode, String)>;

/// Typed query-parameter extraction: `YYYY-MM-DD` or absent.
fn date_param(params: &HashMap<String, String>, name: &str) -> Option<NaiveDate> {
    params
        .get(name)
        .and_then(|v| NaiveDate::parse_from_str(v, DATE_FORMAT).ok())
}

/// Logs the full chain and answers with a short 503.
fn unavailable(what: &str, err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("{} failed: {:#}", what, err);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        format!("{} temporarily unavailable", what),
    )
}

async fn state_action(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ActionResult {
    let mut summaries = state
        .orchestrator
        .poll_service_states(state.deadline())
        .await;
    if let Some(tld) = params.get("tld") {
        summaries.retain(|s| &s.tld == tld);
    }
    Ok(Json(serde_json::json!({ "tlds": summaries })))
}

async fn downtime_action(State(state): State<Arc<AppState>>) -> ActionResult {
    let aggregate = state.orchestrator.collect_downtime(state.deadline()).await;
    Ok(Json(serde_json::json!({ "downtime": aggregate })))
}

async fn alarmed_action(State(state): State<Arc<AppState>>) -> ActionResult {
    let aggregate = state.orchestrator.collect_alarms(state.deadline()).await;
    Ok(Json(serde_json::json!({ "alarmed": aggregate })))
}

async fn reports_action(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ActionResult {
    let Some(tld) = params.get("tld") else {
        return Err((StatusCode::BAD_REQUEST, "missing tld parameter".to_string()));
    };
    let start = date_param(&params, "startDate");
    let end = date_param(&params, "endDate");
    let entries = state
        .metrica
        .list_available(tld, start, end)
        .await
        .map_err(|e| unavailable("report listing", e))?;
    Ok(Json(serde_json::json!({ "domainLists": entries })))
}

async fn ingest_action(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ActionResult {
    match (params.get("tld"), date_param(&params, "date")) {
        (Some(tld), Some(day)) => {
            let rows = state
                .ingester
                .run_date(tld, day)
                .await
                .map_err(|e| unavailable("ingestion", e))?;
            Ok(Json(serde_json::json!({
                "tld": tld,
                "date": day.format(DATE_FORMAT).to_string(),
                "threatMatches": rows,
            })))
        }
        (Some(tld), None) => {
            let reports = state
                .ingester
                .run_tld(tld)
                .await
                .map_err(|e| unavailable("ingestion", e))?;
            Ok(Json(serde_json::json!({
                "tld": tld,
                "reports": reports,
            })))
        }
        (None, _) => {
            let tlds = state.orchestrator.tlds().to_vec();
            let outcomes = state.ingester.run_all(&tlds).await;
            let body: Vec<serde_json::Value> = outcomes
                .into_iter()
                .map(|o| match o.result {
                    Ok(reports) => serde_json::json!({ "tld": o.tld, "reports": reports }),
                    Err(message) => serde_json::json!({ "tld": o.tld, "error": message }),
                })
                .collect();
            Ok(Json(serde_json::json!({ "tlds": body })))
        }
    }
}

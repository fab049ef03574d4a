use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::logic::{RefreshLog, RefreshPipeline};
use crate::store::{AnalyticStore, OperationalStore};

pub type AppState<O, A> = Arc<RefreshPipeline<O, A>>;

/// Simple health check endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Body of both ETL endpoints. Failures are reported in the log, never as an
/// HTTP error status.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogResponse {
    pub logs: Vec<String>,
}

impl From<RefreshLog> for LogResponse {
    fn from(log: RefreshLog) -> Self {
        Self {
            logs: log.into_lines(),
        }
    }
}

pub async fn run_etl<O, A>(State(pipeline): State<AppState<O, A>>) -> Json<LogResponse>
where
    O: OperationalStore + 'static,
    A: AnalyticStore + 'static,
{
    let mut log = RefreshLog::new();
    log.info("Starting ETL...");

    match pipeline.refresh(&mut log).await {
        Ok(()) => log.info("ETL job completed successfully!"),
        Err(e) => log.error(format!("ETL failed: {}", e)),
    }

    Json(log.into())
}

pub async fn purge_etl<O, A>(State(pipeline): State<AppState<O, A>>) -> Json<LogResponse>
where
    O: OperationalStore + 'static,
    A: AnalyticStore + 'static,
{
    let mut log = RefreshLog::new();
    log.info("Clearing OLAP tables...");

    match pipeline.clear(&mut log).await {
        Ok(()) => log.info("Clear completed successfully!"),
        Err(e) => log.error(format!("Clear failed: {}", e)),
    }

    Json(log.into())
}

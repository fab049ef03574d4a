use axum::{routing::get, Router};

use crate::api::handlers::{self, AppState};
use crate::store::{AnalyticStore, OperationalStore};

pub fn create_router<O, A>() -> Router<AppState<O, A>>
where
    O: OperationalStore + 'static,
    A: AnalyticStore + 'static,
{
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // ETL
        .route("/api/etl/run", get(handlers::run_etl::<O, A>))
        .route("/api/etl/purge", get(handlers::purge_etl::<O, A>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::LogResponse;
    use crate::logic::RefreshPipeline;
    use crate::model::{AnalyticTable, OperationalSnapshot};
    use crate::store::{InMemoryAnalyticStore, InMemoryOperationalStore};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, InMemoryAnalyticStore) {
        let operational = InMemoryOperationalStore::new(OperationalSnapshot {
            prerequisites: Some(Vec::new()),
            ..Default::default()
        });
        let analytic = InMemoryAnalyticStore::new();
        let pipeline = RefreshPipeline::new(Arc::new(operational), Arc::new(analytic.clone()));
        (create_router().with_state(Arc::new(pipeline)), analytic)
    }

    async fn get_logs(router: Router, uri: &str) -> (StatusCode, Vec<String>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: LogResponse = serde_json::from_slice(&bytes).unwrap();
        (status, body.logs)
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (router, _) = app();
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: handlers::HealthResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "healthy");
    }

    #[tokio::test]
    async fn run_wraps_the_refresh_log() {
        let (router, _) = app();

        let (status, logs) = get_logs(router, "/api/etl/run").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.first().map(String::as_str), Some("Starting ETL..."));
        assert_eq!(logs[1], "ETL process started.");
        assert_eq!(
            &logs[logs.len() - 2..],
            ["ETL process finished.", "ETL job completed successfully!"]
        );
    }

    #[tokio::test]
    async fn failed_run_still_answers_ok() {
        let (router, analytic) = app();
        analytic.set_unreachable(true);

        let (status, logs) = get_logs(router, "/api/etl/run").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            logs.last().map(String::as_str),
            Some("ETL failed: cannot open the analytic store: connection refused")
        );
        assert!(!logs.iter().any(|line| line == "ETL job completed successfully!"));
    }

    #[tokio::test]
    async fn purge_clears_and_reports() {
        let (router, analytic) = app();

        let (status, logs) = get_logs(router, "/api/etl/purge").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs[0], "Clearing OLAP tables...");
        assert_eq!(logs[1], "Clearing table FACTDEPARTMENTSUMMARY...");
        assert_eq!(logs.last().map(String::as_str), Some("Clear completed successfully!"));
        assert_eq!(analytic.count(AnalyticTable::DimTerm), 0);
    }

    #[tokio::test]
    async fn failed_purge_reports_the_table() {
        let (router, analytic) = app();
        analytic.fail_deletes_from(AnalyticTable::FactClass);

        let (status, logs) = get_logs(router, "/api/etl/purge").await;

        assert_eq!(status, StatusCode::OK);
        assert!(logs.iter().any(|line| line.starts_with("Error clearing FACTCLASS:")));
        assert!(logs
            .last()
            .is_some_and(|line| line.starts_with("Clear failed: clearing FACTCLASS failed:")));
    }
}

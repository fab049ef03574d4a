pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{EtlError, EtlResult};

// Export logic types
pub use logic::{RefreshFailure, RefreshLog, RefreshPipeline};

// Export all model types
pub use model::*;

// Export store types
pub use store::{
    AnalyticStore, InMemoryAnalyticStore, InMemoryOperationalStore, OperationalStore,
    PgAnalyticStore, PgOperationalStore,
};

pub type PgRefreshPipeline = RefreshPipeline<PgOperationalStore, PgAnalyticStore>;

/// Connect both Postgres stores and bring the analytic schema up to date.
pub async fn connect_pipeline(config: &config::AppConfig) -> anyhow::Result<PgRefreshPipeline> {
    use std::sync::Arc;

    let schema = config.operational_schema()?;
    log::info!("Connecting to the operational store (schema {})...", schema);
    let operational = PgOperationalStore::connect(
        &config.operational_url(),
        config.operational.max_connections(),
        schema,
    )
    .await?;

    log::info!("Connecting to the analytic store...");
    let analytic =
        PgAnalyticStore::connect(&config.analytic_url(), config.analytic.max_connections()).await?;

    log::info!("Running analytic schema migrations...");
    analytic.migrate().await?;

    Ok(RefreshPipeline::new(Arc::new(operational), Arc::new(analytic)))
}

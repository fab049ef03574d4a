use axum::{serve, Router};
use school_etl::api::routes::create_router;
use school_etl::config::AppConfig;
use school_etl::{connect_pipeline, PgRefreshPipeline};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info) // Default to Info for everything
        .filter_module("sqlx", LevelFilter::Warn) // Suppress sqlx Debug logs
        .init();

    println!("School ETL: OLTP to OLAP refresh service");

    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    let pipeline = Arc::new(connect_pipeline(&config).await?);
    println!("Both stores ready");

    if config.refresh_on_startup {
        println!("Running startup refresh...");
        // the log lines are already mirrored through the logger
        if let Err(failure) = pipeline.run_refresh().await {
            anyhow::bail!("startup refresh failed: {}", failure);
        }
    }

    run_server(pipeline, &config).await?;

    Ok(())
}

async fn run_server(pipeline: Arc<PgRefreshPipeline>, config: &AppConfig) -> anyhow::Result<()> {
    let app: Router = create_router().with_state(pipeline);
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("School ETL server running on http://{}", bind_address);
    println!("Trigger a refresh with GET http://{}/api/etl/run", bind_address);

    serve(listener, app).await?;

    Ok(())
}

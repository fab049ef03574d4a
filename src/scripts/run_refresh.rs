//! One-shot refresh: `etl-refresh` rebuilds the analytic store, `etl-refresh --purge` only empties it.
//! Prints the refresh log to stdout and exits non-zero on failure.

use anyhow::{bail, Result};
use env_logger::Builder;
use log::LevelFilter;
use school_etl::config::AppConfig;
use school_etl::{connect_pipeline, RefreshLog};

fn print_log(log: &RefreshLog) {
    for line in log.lines() {
        println!("{}", line);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    let purge = match std::env::args().nth(1).as_deref() {
        None => false,
        Some("--purge") => true,
        Some(other) => bail!("unknown argument {} (expected --purge or nothing)", other),
    };

    let config = AppConfig::load()?;
    let pipeline = connect_pipeline(&config).await?;

    let outcome = if purge {
        pipeline.clear_analytic_store().await
    } else {
        pipeline.run_refresh().await
    };

    match outcome {
        Ok(log) => {
            print_log(&log);
            Ok(())
        }
        Err(failure) => {
            print_log(&failure.log);
            Err(failure.into())
        }
    }
}

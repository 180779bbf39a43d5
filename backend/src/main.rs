//! Worker entry-point: runs the token refresh and athlete update jobs until
//! interrupted.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::sync::Arc;

use color_eyre::eyre::{Context, Result};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use heatmap::bootstrap::{Services, build_services, init_tracing};
use heatmap::config::{HeatmapConfig, HeatmapSettings};
use heatmap::domain::{
    ATHLETE_UPDATE_JOB, ATHLETE_UPDATE_LOCK, AthleteUpdateJob, PeriodicJob, TOKEN_REFRESH_JOB,
    TOKEN_REFRESH_LOCK, TokenRefreshJob,
};
use heatmap::outbound::persistence::run_migrations;

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let config = HeatmapSettings::load_from(std::env::args_os())?.validate()?;
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: HeatmapConfig) -> Result<()> {
    let applied = run_migrations(&config.database.url)
        .await
        .wrap_err("apply database migrations")?;
    info!(applied, "database schema is current");

    let Services {
        lock,
        tokens,
        auth,
        updater,
    } = build_services(&config).await?;

    let shutdown = CancellationToken::new();
    let runners = [
        PeriodicJob::new(
            TOKEN_REFRESH_JOB,
            config.token_refresh_interval,
            Arc::new(TokenRefreshJob::new(auth)),
        )
        .with_lock(Arc::clone(&lock), TOKEN_REFRESH_LOCK)
        .spawn(shutdown.clone()),
        PeriodicJob::new(
            ATHLETE_UPDATE_JOB,
            config.athlete_update_interval,
            Arc::new(AthleteUpdateJob::new(tokens, updater)),
        )
        .with_lock(lock, ATHLETE_UPDATE_LOCK)
        .spawn(shutdown.clone()),
    ];
    info!("background jobs started");

    tokio::signal::ctrl_c()
        .await
        .wrap_err("listen for shutdown signal")?;
    info!("shutdown requested; stopping background jobs");
    shutdown.cancel();

    for runner in runners {
        if let Err(err) = runner.await {
            error!(error = %err, "job runner terminated abnormally");
        }
    }
    info!("worker stopped");
    Ok(())
}

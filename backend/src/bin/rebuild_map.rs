//! Run the athlete update pipeline once, for one athlete.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;

use clap::{ArgGroup, Parser};
use color_eyre::eyre::{Context, Result, eyre};
use tokio::runtime::Builder;

use heatmap::bootstrap::{build_services, init_tracing};
use heatmap::config::HeatmapSettings;
use heatmap::domain::AthleteId;
use heatmap::outbound::persistence::run_migrations;

/// `rebuild-map` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rebuild-map",
    about = "Import, download, and re-queue heatmap tiles for a single athlete",
    version
)]
#[command(group(ArgGroup::new("athlete").required(true).args(["athlete_id", "auth_code"])))]
struct CliArgs {
    /// Athlete whose stored credentials should be refreshed and used.
    #[arg(long = "athlete-id", value_name = "id")]
    athlete_id: Option<i64>,
    /// OAuth authorisation code to exchange for a new athlete's credentials.
    #[arg(long = "auth-code", value_name = "code")]
    auth_code: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let args = CliArgs::parse();
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: CliArgs) -> Result<()> {
    // CLI flags belong to this binary; settings come from the environment.
    let config = HeatmapSettings::load_from([OsString::from("rebuild-map")])?.validate()?;
    run_migrations(&config.database.url)
        .await
        .wrap_err("apply database migrations")?;
    let services = build_services(&config).await?;

    let token = match (args.auth_code, args.athlete_id) {
        (Some(code), _) => services
            .auth
            .exchange_code(&code)
            .await
            .wrap_err("exchange authorisation code")?,
        (None, Some(id)) => services
            .auth
            .refresh(AthleteId::new(id))
            .await
            .wrap_err("refresh athlete credentials")?,
        (None, None) => return Err(eyre!("either --athlete-id or --auth-code is required")),
    };

    let report = services.updater.update_athlete(&token).await;
    println!("athlete_id={}", report.athlete_id);
    println!("new_activities={}", report.new_activities);
    println!("downloaded_streams={}", report.downloaded_streams);
    if let Some(rebuild) = &report.rebuild {
        println!("map_id={}", rebuild.map_id);
        println!("tiles={}", rebuild.tiles);
        println!("queued_messages={}", rebuild.message_ids.len());
    }
    println!("final_state={}", report.final_state);

    if report.is_success() {
        return Ok(());
    }
    for err in &report.errors {
        eprintln!("error={err}");
    }
    Err(eyre!(
        "update for athlete {} finished with {} error(s)",
        report.athlete_id,
        report.errors.len()
    ))
}

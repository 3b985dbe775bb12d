//! Offline sweep that completes match rows with missing result, timeline,
//! version or history fields.
use std::path::PathBuf;

use clap::Parser;
use envconfig::Envconfig;
use eyre::Result;

use stalker_common::client::RiotApi;
use stalker_common::context::GatherContext;
use stalker_common::ledger::RequestLedger;
use stalker_common::ratelimits::ApiKeyConfig;
use stalker_common::store::Store;

mod config;
mod repair;

use config::Config;
use repair::Repairer;

#[derive(Parser)]
#[command(about = "Repair missing result/timeline/history in games with known tier")]
struct Args {
    /// Region name of target games
    #[arg(long)]
    region: String,

    /// Optionally limit repairs to a specific game version
    #[arg(long)]
    semver: Option<String>,

    /// Ratelimit logfile location
    #[arg(long)]
    logfile: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let region_name = args.region.to_uppercase();
    let config = Config::init_from_env().expect("failed to load configuration from env");

    let ledger = RequestLedger::connect(&config.ledger_db.url(), args.logfile.as_deref()).await?;
    let api = RiotApi::new(
        ApiKeyConfig::new(config.riot_api_key.clone(), config.riot_app_rate_limits.clone()),
        ledger,
        config.request_timeout.0,
    );
    let store = Store::connect(&config.main_db.url()).await?;
    let ctx = GatherContext::new(api, store);

    let repairer = Repairer::new(&ctx, region_name);
    let report = repairer.run(args.semver.as_deref()).await?;
    tracing::info!(
        rows = report.rows_seen,
        timelines = report.timelines_recovered,
        results = report.results_recovered,
        histories = report.histories_recovered,
        versions = report.versions_recovered,
        "repair sweep finished"
    );

    Ok(())
}

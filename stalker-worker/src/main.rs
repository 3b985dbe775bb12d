//! Observe live matches region by region and persist their lifecycle.
use std::future::ready;
use std::path::PathBuf;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use envconfig::Envconfig;
use metrics_exporter_prometheus::PrometheusBuilder;

use health::HealthRegistry;
use stalker_common::client::RiotApi;
use stalker_common::context::GatherContext;
use stalker_common::ledger::RequestLedger;
use stalker_common::ratelimits::ApiKeyConfig;
use stalker_common::store::Store;

mod config;
mod error;
mod pipeline;
mod stalker;

use config::Config;
use error::WorkerError;
use stalker::Stalker;

#[derive(Parser)]
#[command(about = "Observe live matches of target summoners and persist them")]
struct Args {
    /// Region the gathering run is scoped to, e.g. EUW
    region: String,

    /// Append one CSV row per quota admission decision to this file
    #[arg(long)]
    ratelimit_logfile: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let region_name = args.region.to_uppercase();
    let config = Config::init_from_env().expect("Invalid configuration:");

    let liveness = HealthRegistry::new("liveness");
    // A full pipeline run (wait state plus ten quota-bound history
    // extractions) sits between two reports.
    let stalker_liveness = liveness
        .register("stalker".to_string(), time::Duration::hours(12))
        .await;

    let ledger = RequestLedger::connect(
        &config.ledger_db.url(),
        args.ratelimit_logfile.as_deref(),
    )
    .await
    .expect("failed to initialize the request ledger");
    let api = RiotApi::new(
        ApiKeyConfig::new(config.riot_api_key.clone(), config.riot_app_rate_limits.clone()),
        ledger,
        config.request_timeout.0,
    );
    let store = Store::connect(&config.main_db.url())
        .await
        .expect("failed to connect to the main store");
    let ctx = GatherContext::new(api, store);

    let recorder_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install the prometheus recorder");
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route(
            "/metrics",
            get(move || ready(recorder_handle.render())),
        );
    let bind = config.bind();
    tokio::task::spawn(async move {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .expect("failed to bind the metrics listener");
        axum::serve(listener, router)
            .await
            .expect("failed to start serving metrics");
    });

    let stalker = Stalker::new(&ctx, region_name, stalker_liveness);
    stalker.run().await
}

pub async fn index() -> &'static str {
    "match-stalker worker"
}

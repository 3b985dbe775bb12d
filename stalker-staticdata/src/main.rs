//! Refresh the static game data: append unseen game versions and fetch
//! the per-version data bundles the analysis passes read (items above
//! all). A version's bundle is stored only when every document fetched,
//! so no partial bundles exist.
use anyhow::Context as _;
use envconfig::Envconfig;
use tracing::info;

use stalker_common::client::RiotApi;
use stalker_common::endpoints;
use stalker_common::ledger::RequestLedger;
use stalker_common::ratelimits::ApiKeyConfig;
use stalker_common::store::{StaticBundle, Store};

mod config;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let ledger = RequestLedger::connect(&config.ledger_db.url(), None).await?;
    let api = RiotApi::new(
        ApiKeyConfig::new(config.riot_api_key.clone(), config.riot_app_rate_limits.clone()),
        ledger,
        config.request_timeout.0,
    );
    let store = Store::connect(&config.main_db.url()).await?;

    let fresh_versions = api.get_versions().await?;
    let known_versions = store.known_versions().await?;
    for semver in &fresh_versions {
        if !known_versions.iter().any(|known| known == semver) {
            info!(semver, "saving new game version");
            store.insert_version_if_absent(semver).await?;
        }
    }

    for semver in store.versions_missing_static_data().await? {
        info!(semver, "found no static data set, fetching bundle");
        let bundle = fetch_bundle(&api, &semver)
            .await
            .with_context(|| format!("fetching static data bundle for {semver}"))?;
        store.put_static_bundle(&bundle).await?;
        info!(semver, "stored static data bundle");
    }

    Ok(())
}

/// All five CDN documents of one version; any failure drops the bundle.
async fn fetch_bundle(api: &RiotApi, semver: &str) -> anyhow::Result<StaticBundle> {
    let profile_icons = api.get_static(&endpoints::profile_icons(semver)).await?;
    let champions = api.get_static(&endpoints::champions_list(semver)).await?;
    let items = api.get_static(&endpoints::items(semver)).await?;
    let summonerspells = api.get_static(&endpoints::summonerspells(semver)).await?;
    let runes = api.get_static(&endpoints::runes(semver)).await?;

    Ok(StaticBundle {
        game_version: semver.to_owned(),
        profile_icons_json: profile_icons.to_string(),
        champions_json: champions.to_string(),
        items_json: items.to_string(),
        summonerspells_json: summonerspells.to_string(),
        runes_json: runes.to_string(),
    })
}

//! The shared state a gathering run carries: the API client, the store,
//! and the in-memory items-catalogue cache. Passed down explicitly; there
//! is no process-global state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::client::RiotApi;
use crate::error::GatherError;
use crate::items::ItemsCatalog;
use crate::store::Store;
use crate::tiers::Tiers;
use crate::versions;

pub struct GatherContext {
    pub api: RiotApi,
    pub store: Store,
    pub tiers: Tiers,
    items: Mutex<HashMap<String, Arc<ItemsCatalog>>>,
}

impl GatherContext {
    pub fn new(api: RiotApi, store: Store) -> Self {
        Self {
            api,
            store,
            tiers: Tiers,
            items: Mutex::new(HashMap::new()),
        }
    }

    /// The items catalogue for one game version, loaded from the static
    /// bundle table once per process and memoised per semver.
    pub async fn items_catalog(&self, semver: &str) -> Result<Arc<ItemsCatalog>, GatherError> {
        let mut cached = self.items.lock().await;
        if let Some(catalog) = cached.get(semver) {
            return Ok(catalog.clone());
        }
        let items_json = self.store.items_json(semver).await?.ok_or_else(|| {
            GatherError::MissingStaticData {
                semver: semver.to_owned(),
            }
        })?;
        let catalog =
            Arc::new(
                ItemsCatalog::from_json(&items_json).map_err(|error| {
                    GatherError::Config(format!(
                        "stored items data for {semver} is not valid JSON: {error}"
                    ))
                })?,
            );
        cached.insert(semver.to_owned(), catalog.clone());
        Ok(catalog)
    }

    /// Resolve a match result's build string to a known game version,
    /// refreshing the version list from the CDN when the patch is unseen.
    pub async fn resolve_game_version(
        &self,
        raw_game_version: &str,
    ) -> Result<Option<String>, GatherError> {
        let known = self.store.known_versions().await?;
        if let Some(found) = versions::find_matching(&known, raw_game_version) {
            return Ok(Some(found.to_owned()));
        }

        // Unseen patch: pull the current version list and append what we
        // were missing, tolerating concurrent writers.
        let fresh = self.api.get_versions().await?;
        for semver in &fresh {
            if !known.iter().any(|existing| existing == semver) {
                info!(semver, "saving new game version");
                self.store.insert_version_if_absent(semver).await?;
            }
        }
        let refreshed = self.store.known_versions().await?;
        Ok(versions::find_matching(&refreshed, raw_game_version).map(str::to_owned))
    }
}

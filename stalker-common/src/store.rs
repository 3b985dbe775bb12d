//! Repositories over the main PostgreSQL store.
//!
//! All of the conflict handling lives here: callers get
//! get/upsert/create-if-absent semantics and never branch on storage
//! errors. Concurrent writers are expected — another gathering process may
//! create the same region, version, summoner or match at any moment — so
//! every insert either tolerates the duplicate and re-reads, or reports
//! `MatchTaken` where exclusive ownership is the point.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::GatherError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Summoner {
    pub id: i64,
    pub region_name: String,
    pub account_id: i64,
    pub summoner_id: i64,
    pub latest_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HistoricalMatch {
    pub match_id: i64,
    pub region_name: String,
    pub game_version: Option<String>,
    pub regional_tier_avg: Option<String>,
    pub regional_tier_meta_json: Option<String>,
    pub game_duration: Option<i64>,
    pub match_result_json: Option<String>,
    pub match_timeline_json: Option<String>,
    pub match_participants_histories_json: Option<String>,
}

/// One row of the repair worklist: which fields still need recovering.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IncompleteMatch {
    pub match_id: i64,
    pub version_missing: bool,
    pub result_missing: bool,
    pub timeline_missing: bool,
    pub history_missing: bool,
}

/// The per-version static-data bundle, stored verbatim.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StaticBundle {
    pub game_version: String,
    pub profile_icons_json: String,
    pub champions_json: String,
    pub items_json: String,
    pub summonerspells_json: String,
    pub runes_json: String,
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(url: &str) -> Result<Self, GatherError> {
        let pool = PgPoolOptions::new().connect(url).await?;
        Ok(Self { pool })
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_or_create_region(&self, region_name: &str) -> Result<(), GatherError> {
        sqlx::query("INSERT INTO region (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(region_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn known_versions(&self) -> Result<Vec<String>, GatherError> {
        let versions: Vec<(String,)> = sqlx::query_as("SELECT semver FROM game_version")
            .fetch_all(&self.pool)
            .await?;
        Ok(versions.into_iter().map(|(semver,)| semver).collect())
    }

    pub async fn insert_version_if_absent(&self, semver: &str) -> Result<(), GatherError> {
        sqlx::query("INSERT INTO game_version (semver) VALUES ($1) ON CONFLICT (semver) DO NOTHING")
            .bind(semver)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update-else-insert on `(region, account_id)`; a concurrent insert
    /// loses the race gracefully by updating the winner's row.
    pub async fn upsert_summoner(
        &self,
        region_name: &str,
        account_id: i64,
        summoner_id: i64,
        latest_name: &str,
    ) -> Result<Summoner, GatherError> {
        if let Some(updated) = self
            .update_summoner_name(region_name, account_id, latest_name)
            .await?
        {
            return Ok(updated);
        }

        let inserted = sqlx::query_as::<_, Summoner>(
            "INSERT INTO summoner (region_name, account_id, summoner_id, latest_name) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, region_name, account_id, summoner_id, latest_name",
        )
        .bind(region_name)
        .bind(account_id)
        .bind(summoner_id)
        .bind(latest_name)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(summoner) => Ok(summoner),
            Err(error) if is_unique_violation(&error) => self
                .update_summoner_name(region_name, account_id, latest_name)
                .await?
                .ok_or(GatherError::Database(sqlx::Error::RowNotFound)),
            Err(error) => Err(error.into()),
        }
    }

    async fn update_summoner_name(
        &self,
        region_name: &str,
        account_id: i64,
        latest_name: &str,
    ) -> Result<Option<Summoner>, GatherError> {
        let updated = sqlx::query_as::<_, Summoner>(
            "UPDATE summoner SET latest_name = $3 \
             WHERE region_name = $1 AND account_id = $2 \
             RETURNING id, region_name, account_id, summoner_id, latest_name",
        )
        .bind(region_name)
        .bind(account_id)
        .bind(latest_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    /// Append-only snapshot of a summoner's tiers at observation time.
    pub async fn insert_tier_snapshot(
        &self,
        summoner_row_id: i64,
        tier: &str,
        tiers_json: &str,
    ) -> Result<(), GatherError> {
        sqlx::query(
            "INSERT INTO summoner_tier_history (summoner_row_id, tier, tiers_json) \
             VALUES ($1, $2, $3)",
        )
        .bind(summoner_row_id)
        .bind(tier)
        .bind(tiers_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// CLAIM: pre-check read plus conditional insert of the preliminary
    /// row. Losing either race means another process owns the match.
    pub async fn claim_match(&self, match_id: i64, region_name: &str) -> Result<(), GatherError> {
        if self.get_match(match_id, region_name).await?.is_some() {
            return Err(GatherError::MatchTaken { match_id });
        }
        let inserted = sqlx::query(
            "INSERT INTO historical_match (match_id, region_name) VALUES ($1, $2)",
        )
        .bind(match_id)
        .bind(region_name)
        .execute(&self.pool)
        .await;
        match inserted {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => {
                Err(GatherError::MatchTaken { match_id })
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Create-if-absent for the history walk: either way the caller gets
    /// the current row.
    pub async fn ensure_match(
        &self,
        match_id: i64,
        region_name: &str,
    ) -> Result<HistoricalMatch, GatherError> {
        if let Some(existing) = self.get_match(match_id, region_name).await? {
            return Ok(existing);
        }
        let inserted = sqlx::query(
            "INSERT INTO historical_match (match_id, region_name) VALUES ($1, $2)",
        )
        .bind(match_id)
        .bind(region_name)
        .execute(&self.pool)
        .await;
        match inserted {
            Ok(_) => {}
            Err(error) if is_unique_violation(&error) => {
                info!(match_id, "match row created concurrently, re-reading");
            }
            Err(error) => return Err(error.into()),
        }
        self.get_match(match_id, region_name)
            .await?
            .ok_or(GatherError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn get_match(
        &self,
        match_id: i64,
        region_name: &str,
    ) -> Result<Option<HistoricalMatch>, GatherError> {
        let row = sqlx::query_as::<_, HistoricalMatch>(
            "SELECT match_id, region_name, game_version, regional_tier_avg, \
                    regional_tier_meta_json, game_duration, match_result_json, \
                    match_timeline_json, match_participants_histories_json \
             FROM historical_match WHERE match_id = $1 AND region_name = $2",
        )
        .bind(match_id)
        .bind(region_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // The attach_* updates go through COALESCE so a populated field is
    // never overwritten: row fields only ever move from null to non-null.

    pub async fn attach_tier_average(
        &self,
        match_id: i64,
        region_name: &str,
        regional_tier_avg: &str,
        regional_tier_meta_json: &str,
    ) -> Result<(), GatherError> {
        sqlx::query(
            "UPDATE historical_match SET \
                regional_tier_avg = COALESCE(regional_tier_avg, $3), \
                regional_tier_meta_json = COALESCE(regional_tier_meta_json, $4) \
             WHERE match_id = $1 AND region_name = $2",
        )
        .bind(match_id)
        .bind(region_name)
        .bind(regional_tier_avg)
        .bind(regional_tier_meta_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn attach_result(
        &self,
        match_id: i64,
        region_name: &str,
        game_version: Option<&str>,
        game_duration: i64,
        match_result_json: &str,
    ) -> Result<(), GatherError> {
        sqlx::query(
            "UPDATE historical_match SET \
                game_version = COALESCE(game_version, $3), \
                game_duration = COALESCE(game_duration, $4), \
                match_result_json = COALESCE(match_result_json, $5) \
             WHERE match_id = $1 AND region_name = $2",
        )
        .bind(match_id)
        .bind(region_name)
        .bind(game_version)
        .bind(game_duration)
        .bind(match_result_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn attach_timeline(
        &self,
        match_id: i64,
        region_name: &str,
        match_timeline_json: &str,
    ) -> Result<(), GatherError> {
        sqlx::query(
            "UPDATE historical_match SET \
                match_timeline_json = COALESCE(match_timeline_json, $3) \
             WHERE match_id = $1 AND region_name = $2",
        )
        .bind(match_id)
        .bind(region_name)
        .bind(match_timeline_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn attach_histories(
        &self,
        match_id: i64,
        region_name: &str,
        match_participants_histories_json: &str,
    ) -> Result<(), GatherError> {
        sqlx::query(
            "UPDATE historical_match SET \
                match_participants_histories_json = \
                    COALESCE(match_participants_histories_json, $3) \
             WHERE match_id = $1 AND region_name = $2",
        )
        .bind(match_id)
        .bind(region_name)
        .bind(match_participants_histories_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn attach_version(
        &self,
        match_id: i64,
        region_name: &str,
        game_version: &str,
    ) -> Result<(), GatherError> {
        sqlx::query(
            "UPDATE historical_match SET \
                game_version = COALESCE(game_version, $3) \
             WHERE match_id = $1 AND region_name = $2",
        )
        .bind(match_id)
        .bind(region_name)
        .bind(game_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The repair worklist: observed matches (tier average present, not a
    /// known remake) still missing result, timeline, histories or version.
    pub async fn incomplete_matches(
        &self,
        region_name: &str,
        semver: Option<&str>,
    ) -> Result<Vec<IncompleteMatch>, GatherError> {
        let base = "SELECT match_id, \
                (game_version IS NULL) AS version_missing, \
                (match_result_json IS NULL) AS result_missing, \
                (match_timeline_json IS NULL) AS timeline_missing, \
                (match_participants_histories_json IS NULL) AS history_missing \
             FROM historical_match \
             WHERE (match_result_json IS NULL \
                    OR match_timeline_json IS NULL \
                    OR match_participants_histories_json IS NULL \
                    OR game_version IS NULL) \
               AND regional_tier_avg IS NOT NULL \
               AND (game_duration IS NULL OR game_duration >= 300) \
               AND region_name = $1";
        let rows = if let Some(semver) = semver {
            sqlx::query_as::<_, IncompleteMatch>(&format!("{base} AND game_version = $2"))
                .bind(region_name)
                .bind(semver)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, IncompleteMatch>(base)
                .bind(region_name)
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }

    pub async fn items_json(&self, semver: &str) -> Result<Option<String>, GatherError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT items_json FROM static_game_data WHERE game_version = $1")
                .bind(semver)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(items,)| items))
    }

    pub async fn versions_missing_static_data(&self) -> Result<Vec<String>, GatherError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT semver FROM game_version \
             WHERE semver NOT IN (SELECT game_version FROM static_game_data)",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(semver,)| semver).collect())
    }

    /// Store a complete bundle for one version; partial bundles are never
    /// written (the caller only builds this once every fetch succeeded).
    pub async fn put_static_bundle(&self, bundle: &StaticBundle) -> Result<(), GatherError> {
        sqlx::query(
            "INSERT INTO static_game_data \
                (game_version, profile_icons_json, champions_json, items_json, \
                 summonerspells_json, runes_json) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (game_version) DO NOTHING",
        )
        .bind(&bundle.game_version)
        .bind(&bundle.profile_icons_json)
        .bind(&bundle.champions_json)
        .bind(&bundle.items_json)
        .bind(&bundle.summonerspells_json)
        .bind(&bundle.runes_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "needs a running PostgreSQL with DATABASE_URL set"]
    async fn upsert_summoner_is_idempotent(db: PgPool) {
        let store = Store::new_from_pool(db);
        store.get_or_create_region("EUW").await.unwrap();

        let first = store.upsert_summoner("EUW", 11, 22, "OldName").await.unwrap();
        let second = store.upsert_summoner("EUW", 11, 22, "NewName").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.latest_name, "NewName");
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "needs a running PostgreSQL with DATABASE_URL set"]
    async fn second_claim_is_match_taken(db: PgPool) {
        let store = Store::new_from_pool(db);
        store.get_or_create_region("EUW").await.unwrap();

        store.claim_match(4242, "EUW").await.unwrap();
        let err = store.claim_match(4242, "EUW").await.unwrap_err();
        assert!(matches!(err, GatherError::MatchTaken { match_id: 4242 }));
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "needs a running PostgreSQL with DATABASE_URL set"]
    async fn attach_never_erases(db: PgPool) {
        let store = Store::new_from_pool(db);
        store.get_or_create_region("EUW").await.unwrap();
        store.insert_version_if_absent("8.24.1").await.unwrap();

        store.claim_match(7, "EUW").await.unwrap();
        store
            .attach_result(7, "EUW", Some("8.24.1"), 1800, "{\"first\":true}")
            .await
            .unwrap();
        // A later attach must not overwrite the populated fields.
        store
            .attach_result(7, "EUW", Some("8.24.1"), 9999, "{\"second\":true}")
            .await
            .unwrap();

        let row = store.get_match(7, "EUW").await.unwrap().unwrap();
        assert_eq!(row.game_duration, Some(1800));
        assert_eq!(row.match_result_json.as_deref(), Some("{\"first\":true}"));
    }
}

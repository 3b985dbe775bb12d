//! The per-match ingestion pipeline.
//!
//! One observed ongoing match moves through claim, tier snapshotting,
//! waiting for the game to finish, and finalization with result, timeline
//! and participant histories. The row is owned by whichever process
//! claimed it; everything attached later is monotonic, so a crash leaves
//! a partial row the repair job can complete.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use stalker_common::context::GatherContext;
use stalker_common::error::GatherError;
use stalker_common::history::attach_match_histories;
use stalker_common::retry::RetryEnvelope;
use stalker_common::store::Summoner;
use stalker_common::tiers::UNRANKED;
use stalker_common::types::{
    parse_league_positions, parse_match_result, parse_match_timeline, CurrentGameInfo,
};

/// How long a match minimally runs; no point polling for a result before.
const MIN_GAME_MINUTES: i64 = 20;

/// One participant's entry in the per-team tier metadata.
#[derive(Debug, Clone, Serialize)]
struct TierEntry {
    champion_id: i64,
    tier: String,
}

/// Observe one ongoing match to completion. Returns the ten participant
/// summoners, the stalker loop's next targets.
pub async fn observe_match(
    ctx: &GatherContext,
    region_name: &str,
    ongoing: &CurrentGameInfo,
) -> Result<Vec<Summoner>, GatherError> {
    // CLAIM: the preliminary row marks the match as ours; a concurrent
    // claimant surfaces as MatchTaken and the caller moves on.
    ctx.store.claim_match(ongoing.game_id, region_name).await?;
    metrics::counter!("pipeline_matches_claimed_total").increment(1);
    info!(match_id = ongoing.game_id, "claimed ongoing match");

    // TIERS: identities and tier snapshots of all ten participants; the
    // average tier is only obtainable while the game is running.
    let mut participant_summoners = Vec::with_capacity(ongoing.participants.len());
    let mut teams_tiers: BTreeMap<i64, Vec<TierEntry>> = BTreeMap::new();
    for participant in &ongoing.participants {
        let summoner_dto = RetryEnvelope::required(2)
            .run(|| ctx.api.get_summoner(region_name, &participant.summoner_name))
            .await?
            .expect("required envelope yields a value on success");
        let summoner = ctx
            .store
            .upsert_summoner(
                region_name,
                summoner_dto.account_id,
                summoner_dto.id,
                &summoner_dto.name,
            )
            .await?;

        let tiers_value = RetryEnvelope::required(2)
            .run(|| ctx.api.get_tiers(region_name, summoner.summoner_id))
            .await?
            .expect("required envelope yields a value on success");
        let tier = solo_queue_tier(&tiers_value);
        ctx.store
            .insert_tier_snapshot(summoner.id, &tier, &tiers_value.to_string())
            .await?;

        teams_tiers
            .entry(participant.team_id)
            .or_default()
            .push(TierEntry {
                champion_id: participant.champion_id,
                tier,
            });
        participant_summoners.push(summoner);
    }

    let mut team_averages = Vec::with_capacity(teams_tiers.len());
    for (team_id, entries) in &teams_tiers {
        let average = ctx
            .tiers
            .average(entries.iter().map(|entry| entry.tier.as_str()))?;
        info!(team_id, average, "team tier average");
        team_averages.push(average);
    }
    let match_average = ctx.tiers.average(team_averages.iter().copied())?;
    info!(match_average, "match tier average");
    ctx.store
        .attach_tier_average(
            ongoing.game_id,
            region_name,
            match_average,
            &serde_json::to_string(&teams_tiers)?,
        )
        .await?;

    // WAIT: nothing to fetch before the match can possibly be over.
    let now_ms = chrono::Utc::now().timestamp_millis();
    let started_ms = if ongoing.game_start_time == 0 {
        // The vendor reports zero on just-started games.
        now_ms
    } else {
        ongoing.game_start_time
    };
    let running_minutes = (now_ms - started_ms) / 1000 / 60;
    if running_minutes < MIN_GAME_MINUTES {
        info!(
            match_id = ongoing.game_id,
            running_minutes,
            "waiting {} minutes before polling for the result",
            MIN_GAME_MINUTES - running_minutes
        );
        tokio::time::sleep(Duration::from_secs(
            ((MIN_GAME_MINUTES - running_minutes) * 60) as u64,
        ))
        .await;
    }
    let result_value = RetryEnvelope::poll_until_present(2)
        .run(|| ctx.api.get_match_result(&ongoing.platform_id, ongoing.game_id))
        .await?
        .expect("polling envelope yields a value on success");

    // RESULT
    let result = parse_match_result(&result_value)?;
    let game_version = ctx.resolve_game_version(&result.game_version).await?;
    ctx.store
        .attach_result(
            ongoing.game_id,
            region_name,
            game_version.as_deref(),
            result.game_duration,
            &result_value.to_string(),
        )
        .await?;
    info!(match_id = ongoing.game_id, "attached match result");

    // TIMELINE: best-effort; exhaustion leaves the column null for the
    // repair job.
    let timeline_value = match RetryEnvelope::required(2)
        .run(|| ctx.api.get_match_timeline(&result.platform_id, ongoing.game_id))
        .await
    {
        Ok(value) => {
            let value = value.expect("required envelope yields a value on success");
            ctx.store
                .attach_timeline(ongoing.game_id, region_name, &value.to_string())
                .await?;
            Some(value)
        }
        Err(error) if error.is_fatal() => return Err(error),
        Err(error) => {
            warn!(
                match_id = ongoing.game_id,
                "timeline unobtainable, leaving it for the repair job: {}", error
            );
            None
        }
    };

    // HISTORIES: ten extractor runs; missing static data skips them for
    // this match only.
    if let Some(timeline_value) = timeline_value {
        let timeline = parse_match_timeline(&timeline_value)?;
        match attach_match_histories(ctx, region_name, &result, &timeline).await {
            Ok(()) => info!(match_id = ongoing.game_id, "attached participant histories"),
            Err(GatherError::MissingStaticData { semver }) => {
                warn!(
                    match_id = ongoing.game_id,
                    semver, "static data missing, skipping histories for this match"
                );
            }
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(
                    match_id = ongoing.game_id,
                    "histories unobtainable, leaving them for the repair job: {}", error
                );
            }
        }
    }

    metrics::counter!("pipeline_matches_completed_total").increment(1);
    Ok(participant_summoners)
}

/// The solo-queue tier of one tier-positions payload, `"TIER RANK"`, or
/// `UNRANKED` when the player has no solo-queue entry.
pub fn solo_queue_tier(tiers_value: &Value) -> String {
    parse_league_positions(tiers_value)
        .ok()
        .and_then(|positions| {
            positions
                .into_iter()
                .find(|position| position.queue_type == "RANKED_SOLO_5x5")
        })
        .map(|position| format!("{} {}", position.tier, position.rank))
        .unwrap_or_else(|| UNRANKED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn solo_queue_tier_prefers_the_solo_entry() {
        let tiers = json!([
            {"queueType": "RANKED_FLEX_SR", "tier": "GOLD", "rank": "II"},
            {"queueType": "RANKED_SOLO_5x5", "tier": "PLATINUM", "rank": "III"},
        ]);
        assert_eq!(solo_queue_tier(&tiers), "PLATINUM III");
    }

    #[test]
    fn missing_solo_entry_is_unranked() {
        let tiers = json!([
            {"queueType": "RANKED_FLEX_SR", "tier": "GOLD", "rank": "II"},
        ]);
        assert_eq!(solo_queue_tier(&tiers), UNRANKED);
        assert_eq!(solo_queue_tier(&json!([])), UNRANKED);
    }

    #[test]
    fn tier_meta_serializes_per_team() {
        let mut teams: BTreeMap<i64, Vec<TierEntry>> = BTreeMap::new();
        teams.entry(100).or_default().push(TierEntry {
            champion_id: 64,
            tier: "PLATINUM III".to_string(),
        });
        teams.entry(200).or_default().push(TierEntry {
            champion_id: 10,
            tier: "UNRANKED".to_string(),
        });
        let json = serde_json::to_string(&teams).unwrap();
        assert_eq!(
            json,
            "{\"100\":[{\"champion_id\":64,\"tier\":\"PLATINUM III\"}],\
             \"200\":[{\"champion_id\":10,\"tier\":\"UNRANKED\"}]}"
        );
    }
}

//! Historical behaviour extraction for one participant.
//!
//! Walks the player's matchlist week by week over a bounded window,
//! reuses stored results and timelines where previous runs already paid
//! for them, and folds the per-game observations into one immutable
//! record of flags and averages.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::context::GatherContext;
use crate::error::GatherError;
use crate::fights::{participant_fights, FightRecord};
use crate::lanes::{champion_lane_mapping, Lane, MapGeometry};
use crate::retry::RetryEnvelope;
use crate::types::{
    parse_match_result, parse_match_timeline, MatchReference, MatchResult, MatchTimeline,
    Participant, ParticipantTimeline,
};

/// Matches shorter than this were aborted and never played out.
pub const REMAKE_SECONDS: i64 = 300;

const WEEK_MS: i64 = 7 * 24 * 60 * 60 * 1000;

pub const HISTORY_MAX_WEEKS: u32 = 3;
pub const HISTORY_MAX_GAMES: u32 = 40;

/// What to look for in a player's past.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub account_id: i64,
    pub champion_id: i64,
    pub lane: Lane,
    pub summoner_spells: BTreeSet<i64>,
    pub runes: BTreeSet<i64>,
    /// Epoch-ms upper bound; the walk looks backwards from here.
    pub reference_time_ms: i64,
    pub max_weeks: u32,
    pub max_games: u32,
}

type StatFn = fn(&Participant) -> f64;

macro_rules! delta_stat {
    ($field:ident, $window:literal) => {
        |p| ParticipantTimeline::delta(&p.timeline.$field, $window)
    };
}

/// The fixed postgame extraction schema. Every entry becomes a `total_*`
/// and a `lane_*` average in the history record; flags average into the
/// fraction of games they were true in.
static POSTGAME_SCHEMA: &[(&str, StatFn)] = &[
    ("gold_earned", |p| p.stats.gold_earned as f64),
    ("gold_spent", |p| p.stats.gold_spent as f64),
    ("gold_per_min_0_to_10", delta_stat!(gold_per_min_deltas, "0-10")),
    ("gold_per_min_10_to_20", delta_stat!(gold_per_min_deltas, "10-20")),
    ("gold_per_min_20_to_30", delta_stat!(gold_per_min_deltas, "20-30")),
    ("gold_per_min_30_to_40", delta_stat!(gold_per_min_deltas, "30-40")),
    ("damage_to_champions_total", |p| p.stats.total_damage_dealt_to_champions as f64),
    ("damage_to_champions_truetype", |p| p.stats.true_damage_dealt_to_champions as f64),
    ("damage_to_champions_physical", |p| p.stats.physical_damage_dealt_to_champions as f64),
    ("damage_to_champions_magical", |p| p.stats.magic_damage_dealt_to_champions as f64),
    ("kills", |p| p.stats.kills as f64),
    ("assists", |p| p.stats.assists as f64),
    ("double_kills", |p| p.stats.double_kills as f64),
    ("triple_kills", |p| p.stats.triple_kills as f64),
    ("quadra_kills", |p| p.stats.quadra_kills as f64),
    ("penta_kills", |p| p.stats.penta_kills as f64),
    ("hexa_kills", |p| p.stats.unreal_kills as f64),
    ("max_kill_num_multikill", |p| p.stats.largest_multi_kill as f64),
    ("killing_sprees", |p| p.stats.killing_sprees as f64),
    ("max_kill_num_killingspree", |p| p.stats.largest_killing_spree as f64),
    ("damage_taken_total", |p| p.stats.total_damage_taken as f64),
    ("damage_taken_truetype", |p| p.stats.true_damage_taken as f64),
    ("damage_taken_physical", |p| p.stats.physical_damage_taken as f64),
    ("damage_taken_magical", |p| p.stats.magical_damage_taken as f64),
    ("damage_taken_mitigated", |p| p.stats.damage_self_mitigated as f64),
    ("damage_taken_per_min_0_to_10", delta_stat!(damage_taken_per_min_deltas, "0-10")),
    ("damage_taken_per_min_10_to_20", delta_stat!(damage_taken_per_min_deltas, "10-20")),
    ("damage_taken_per_min_20_to_30", delta_stat!(damage_taken_per_min_deltas, "20-30")),
    ("damage_taken_per_min_30_to_40", delta_stat!(damage_taken_per_min_deltas, "30-40")),
    ("longest_time_living", |p| p.stats.longest_time_spent_living as f64),
    ("damage_healed", |p| p.stats.total_heal as f64),
    ("targets_healed", |p| p.stats.total_units_healed as f64),
    ("deaths", |p| p.stats.deaths as f64),
    ("wards_placed", |p| p.stats.wards_placed as f64),
    ("wards_killed", |p| p.stats.wards_killed as f64),
    ("normal_wards_bought", |p| p.stats.sight_wards_bought_in_game as f64),
    ("control_wards_bought", |p| p.stats.vision_wards_bought_in_game as f64),
    ("player_score_rank", |p| p.stats.total_score_rank as f64),
    ("player_score_total", |p| p.stats.total_player_score as f64),
    ("player_score_objective", |p| p.stats.objective_player_score as f64),
    ("player_score_combat", |p| p.stats.combat_player_score as f64),
    ("player_score_vision", |p| p.stats.vision_score as f64),
    ("damage_to_turrets_total", |p| p.stats.damage_dealt_to_turrets as f64),
    ("damage_to_pit_monsters_total", |p| {
        (p.stats.damage_dealt_to_objectives - p.stats.damage_dealt_to_turrets) as f64
    }),
    ("damage_to_creeps_and_wards_total", |p| {
        (p.stats.total_damage_dealt
            - p.stats.total_damage_dealt_to_champions
            - p.stats.damage_dealt_to_objectives) as f64
    }),
    ("turrets_killed", |p| p.stats.turret_kills as f64),
    ("inhibitors_killed", |p| p.stats.inhibitor_kills as f64),
    ("damage_largest_criticalstrike", |p| p.stats.largest_critical_strike as f64),
    ("minions_killed_total", |p| p.stats.total_minions_killed as f64),
    ("minions_killed_jungle", |p| p.stats.neutral_minions_killed as f64),
    ("minions_killed_jungle_allyside", |p| p.stats.neutral_minions_killed_team_jungle as f64),
    ("minions_killed_jungle_enemyside", |p| p.stats.neutral_minions_killed_enemy_jungle as f64),
    ("minions_killed_per_min_0_to_10", delta_stat!(creeps_per_min_deltas, "0-10")),
    ("minions_killed_per_min_10_to_20", delta_stat!(creeps_per_min_deltas, "10-20")),
    ("minions_killed_per_min_20_to_30", delta_stat!(creeps_per_min_deltas, "20-30")),
    ("minions_killed_per_min_30_to_40", delta_stat!(creeps_per_min_deltas, "30-40")),
    ("xp_gained_per_min_0_to_10", delta_stat!(xp_per_min_deltas, "0-10")),
    ("xp_gained_per_min_10_to_20", delta_stat!(xp_per_min_deltas, "10-20")),
    ("xp_gained_per_min_20_to_30", delta_stat!(xp_per_min_deltas, "20-30")),
    ("xp_gained_per_min_30_to_40", delta_stat!(xp_per_min_deltas, "30-40")),
    ("cc_score_applied_pre_mitigation", |p| p.stats.total_time_crowd_control_dealt as f64),
    ("cc_score_applied_post_mitigation", |p| p.stats.time_c_cing_others as f64),
    ("scored_first_blood_kill", |p| p.stats.first_blood_kill as u8 as f64),
    ("scored_first_blood_assist", |p| p.stats.first_blood_assist as u8 as f64),
    ("scored_first_tower_kill", |p| p.stats.first_tower_kill as u8 as f64),
    ("scored_first_tower_assist", |p| p.stats.first_tower_assist as u8 as f64),
    ("scored_first_inhibitor_kill", |p| p.stats.first_inhibitor_kill as u8 as f64),
    ("scored_first_inhibitor_assist", |p| p.stats.first_inhibitor_assist as u8 as f64),
    ("damage_taken_diff_per_min_0_to_10", delta_stat!(damage_taken_diff_per_min_deltas, "0-10")),
    ("damage_taken_diff_per_min_10_to_20", delta_stat!(damage_taken_diff_per_min_deltas, "10-20")),
    ("damage_taken_diff_per_min_20_to_30", delta_stat!(damage_taken_diff_per_min_deltas, "20-30")),
    ("damage_taken_diff_per_min_30_to_40", delta_stat!(damage_taken_diff_per_min_deltas, "30-40")),
    ("minions_killed_diff_per_min_0_to_10", delta_stat!(cs_diff_per_min_deltas, "0-10")),
    ("minions_killed_diff_per_min_10_to_20", delta_stat!(cs_diff_per_min_deltas, "10-20")),
    ("minions_killed_diff_per_min_20_to_30", delta_stat!(cs_diff_per_min_deltas, "20-30")),
    ("minions_killed_diff_per_min_30_to_40", delta_stat!(cs_diff_per_min_deltas, "30-40")),
    ("xp_gained_diff_per_min_0_to_10", delta_stat!(xp_diff_per_min_deltas, "0-10")),
    ("xp_gained_diff_per_min_10_to_20", delta_stat!(xp_diff_per_min_deltas, "10-20")),
    ("xp_gained_diff_per_min_20_to_30", delta_stat!(xp_diff_per_min_deltas, "20-30")),
    ("xp_gained_diff_per_min_30_to_40", delta_stat!(xp_diff_per_min_deltas, "30-40")),
    ("champion_level", |p| p.stats.champ_level as f64),
];

/// Extract the full schema for one participant of one game.
pub fn postgame_stats(participant: &Participant) -> Vec<f64> {
    POSTGAME_SCHEMA
        .iter()
        .map(|(_, extract)| extract(participant))
        .collect()
}

/// The aggregated history of one participant, persisted as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct StatsHistory {
    pub lane_priority: &'static str,
    pub solo_ratio: f64,
    pub solo_aggro: f64,
    pub skirmish_ratio: f64,
    pub skirmish_aggro: f64,
    pub team_ratio: f64,
    pub team_aggro: f64,
    pub num_games: u32,
    pub num_games_in_current_lane: u32,
    pub previous_game_won: i32,
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    #[serde(flatten)]
    pub averages: BTreeMap<String, f64>,
}

/// The cheap variant: how much history exists, by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AvailabilityCounts {
    pub num_matches: u32,
    pub num_matches_in_role: u32,
    pub num_matches_as_champion: u32,
    pub num_matches_with_summonerspells: u32,
    pub num_matches_with_runes: u32,
}

/// One observed non-remake game, ready to fold.
pub struct GameObservation {
    pub lane: Lane,
    pub won: bool,
    pub stats: Vec<f64>,
    pub fights: Vec<FightRecord>,
}

/// Streaming fold of per-game observations into a `StatsHistory`.
///
/// Games arrive most-recent first (the order the matchlist walk yields
/// them), which the streak logic depends on.
pub struct HistoryAccumulator {
    query_lane: Lane,
    lane_counts: HashMap<Lane, u32>,
    num_games: u32,
    num_games_in_current_lane: u32,
    consecutive_wins: u32,
    consecutive_losses: u32,
    winning: Option<bool>,
    previous_game_won: i32,
    total_sums: Vec<f64>,
    total_count: u32,
    lane_sums: Vec<f64>,
    lane_count: u32,
    fight_games: Vec<Vec<FightRecord>>,
}

impl HistoryAccumulator {
    pub fn new(query_lane: Lane) -> Self {
        Self {
            query_lane,
            lane_counts: HashMap::new(),
            num_games: 0,
            num_games_in_current_lane: 0,
            consecutive_wins: 0,
            consecutive_losses: 0,
            winning: None,
            previous_game_won: 0,
            total_sums: vec![0.0; POSTGAME_SCHEMA.len()],
            total_count: 0,
            lane_sums: vec![0.0; POSTGAME_SCHEMA.len()],
            lane_count: 0,
            fight_games: Vec::new(),
        }
    }

    /// A game whose lane was inferred but which contributes no statistics
    /// (outside the per-game budget or not on the target champion).
    pub fn observe_lane_only(&mut self, lane: Lane) {
        self.num_games += 1;
        if lane == self.query_lane {
            self.num_games_in_current_lane += 1;
        }
        *self.lane_counts.entry(lane).or_insert(0) += 1;
    }

    pub fn observe_game(&mut self, game: GameObservation) {
        self.observe_lane_only(game.lane);

        for (sum, value) in self.total_sums.iter_mut().zip(&game.stats) {
            *sum += value;
        }
        self.total_count += 1;
        if game.lane == self.query_lane {
            for (sum, value) in self.lane_sums.iter_mut().zip(&game.stats) {
                *sum += value;
            }
            self.lane_count += 1;
        }
        self.fight_games.push(game.fights);

        if self.previous_game_won == 0 {
            self.previous_game_won = if game.won { 1 } else { -1 };
        }
        match self.winning {
            None => self.winning = Some(game.won),
            Some(true) => {
                if game.won {
                    self.consecutive_wins += 1;
                } else {
                    self.winning = Some(false);
                    self.consecutive_wins = 0;
                }
            }
            Some(false) => {
                if !game.won {
                    self.consecutive_losses += 1;
                } else {
                    self.winning = Some(true);
                    self.consecutive_losses = 0;
                }
            }
        }
    }

    pub fn finish(self) -> StatsHistory {
        // Primary and secondary lanes, ties resolved in canonical order.
        let count_of = |lane: Lane| self.lane_counts.get(&lane).copied().unwrap_or(0);
        let primary = Lane::ALL
            .into_iter()
            .max_by_key(|lane| (count_of(*lane), std::cmp::Reverse(position(*lane))))
            .expect("lane list is not empty");
        let secondary = Lane::ALL
            .into_iter()
            .filter(|lane| *lane != primary)
            .max_by_key(|lane| (count_of(*lane), std::cmp::Reverse(position(*lane))))
            .expect("lane list is not empty");
        let lane_priority = if self.query_lane == primary {
            "primary"
        } else if self.query_lane == secondary {
            "secondary"
        } else {
            "autofill"
        };

        let fight_classes = classify_fights(&self.fight_games);

        let mut averages = BTreeMap::new();
        for (idx, (name, _)) in POSTGAME_SCHEMA.iter().enumerate() {
            let total = if self.total_count > 0 {
                self.total_sums[idx] / f64::from(self.total_count)
            } else {
                0.0
            };
            let lane = if self.lane_count > 0 {
                self.lane_sums[idx] / f64::from(self.lane_count)
            } else {
                0.0
            };
            averages.insert(format!("total_{name}"), total);
            averages.insert(format!("lane_{name}"), lane);
        }

        StatsHistory {
            lane_priority,
            solo_ratio: fight_classes.solo.ratio,
            solo_aggro: fight_classes.solo.aggro,
            skirmish_ratio: fight_classes.skirmish.ratio,
            skirmish_aggro: fight_classes.skirmish.aggro,
            team_ratio: fight_classes.team.ratio,
            team_aggro: fight_classes.team.aggro,
            num_games: self.num_games,
            num_games_in_current_lane: self.num_games_in_current_lane,
            previous_game_won: self.previous_game_won,
            consecutive_wins: self.consecutive_wins,
            consecutive_losses: self.consecutive_losses,
            averages,
        }
    }
}

fn position(lane: Lane) -> usize {
    Lane::ALL.iter().position(|l| *l == lane).unwrap_or(0)
}

#[derive(Debug, Default, Clone, Copy)]
struct FightClassScores {
    ratio: f64,
    aggro: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct FightScores {
    solo: FightClassScores,
    skirmish: FightClassScores,
    team: FightClassScores,
}

/// Per fight-size class: `ratio` is net fight wins per game, `aggro` the
/// number of fights taken per game. A fight is won when more victims fell
/// on the enemy side than ours.
fn classify_fights(fight_games: &[Vec<FightRecord>]) -> FightScores {
    if fight_games.is_empty() {
        return FightScores::default();
    }
    // wins / neutral / losses per class
    let mut solo = [0u32; 3];
    let mut skirmish = [0u32; 3];
    let mut team = [0u32; 3];

    for game in fight_games {
        for fight in game {
            let enemy_victims = fight
                .victims
                .iter()
                .filter(|v| fight.enemies.contains(v))
                .count() as i64;
            let ally_victims = fight
                .victims
                .iter()
                .filter(|v| fight.allies.contains(v))
                .count() as i64;
            let outcome = enemy_victims - ally_victims;
            let bucket = if outcome > 0 { 0 } else if outcome == 0 { 1 } else { 2 };
            match fight.allies.len() {
                1 => solo[bucket] += 1,
                2..=3 => skirmish[bucket] += 1,
                _ => team[bucket] += 1,
            }
        }
    }

    let games = fight_games.len() as f64;
    let scores = |counts: [u32; 3]| FightClassScores {
        ratio: (f64::from(counts[0]) - f64::from(counts[2])) / games,
        aggro: (f64::from(counts[0]) + f64::from(counts[1]) + f64::from(counts[2])) / games,
    };
    FightScores {
        solo: scores(solo),
        skirmish: scores(skirmish),
        team: scores(team),
    }
}

/// A historical match loaded for analysis; `None` when its timeline could
/// not be obtained (best-effort data, the game is skipped).
struct LoadedMatch {
    result: MatchResult,
    timeline: MatchTimeline,
}

/// Fetch-or-reuse one historical match through the store. Concurrent
/// writers are handled inside `ensure_match`; the attach operations are
/// monotonic so double-writing is harmless.
async fn load_match(
    ctx: &GatherContext,
    region_name: &str,
    reference: &MatchReference,
) -> Result<Option<LoadedMatch>, GatherError> {
    let row = ctx.store.ensure_match(reference.game_id, region_name).await?;

    let result_value = match &row.match_result_json {
        Some(raw) => serde_json::from_str(raw).map_err(|error| {
            GatherError::Config(format!(
                "stored result for match {} is not valid JSON: {error}",
                reference.game_id
            ))
        })?,
        None => {
            let fetched = RetryEnvelope::required(2)
                .run(|| ctx.api.get_match_result(&reference.platform_id, reference.game_id))
                .await?
                .expect("required envelope always yields a value on Ok");
            let result = parse_match_result(&fetched)?;
            let version = ctx.resolve_game_version(&result.game_version).await?;
            ctx.store
                .attach_result(
                    reference.game_id,
                    region_name,
                    version.as_deref(),
                    result.game_duration,
                    &fetched.to_string(),
                )
                .await?;
            fetched
        }
    };
    let result = parse_match_result(&result_value)?;

    let timeline_value = match &row.match_timeline_json {
        Some(raw) => serde_json::from_str(raw).map_err(|error| {
            GatherError::Config(format!(
                "stored timeline for match {} is not valid JSON: {error}",
                reference.game_id
            ))
        })?,
        None => {
            let fetched = RetryEnvelope::required(2)
                .run(|| ctx.api.get_match_timeline(&reference.platform_id, reference.game_id))
                .await;
            match fetched {
                Ok(value) => {
                    let value = value.expect("required envelope always yields a value on Ok");
                    ctx.store
                        .attach_timeline(reference.game_id, region_name, &value.to_string())
                        .await?;
                    value
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(
                        match_id = reference.game_id,
                        "timeline unobtainable, skipping match in history: {}", error
                    );
                    return Ok(None);
                }
            }
        }
    };
    let timeline = parse_match_timeline(&timeline_value)?;

    Ok(Some(LoadedMatch { result, timeline }))
}

/// Walk one week-slice of the matchlist. `Ok(None)` means the slice held
/// no matches; transient exhaustion is reported as an empty slice too,
/// since the window is explicit and later slices still apply.
async fn week_matchlist(
    ctx: &GatherContext,
    region_name: &str,
    account_id: i64,
    week_index: u32,
    reference_time_ms: i64,
) -> Result<Vec<MatchReference>, GatherError> {
    let end_time = reference_time_ms - 1000 - i64::from(week_index) * WEEK_MS;
    let begin_time = end_time - WEEK_MS;
    let fetched = RetryEnvelope::absence_is_empty(2)
        .run(|| ctx.api.get_matchlist(region_name, account_id, end_time, begin_time))
        .await;
    match fetched {
        Ok(Some(matchlist)) => Ok(matchlist.matches),
        Ok(None) => Ok(Vec::new()),
        Err(error) if error.is_fatal() => Err(error),
        Err(error) => {
            warn!(
                account_id,
                week_index, "matchlist slice unobtainable, skipping: {}", error
            );
            Ok(Vec::new())
        }
    }
}

/// The full behavioural-feature extraction over a player's recent past.
pub async fn stats_history(
    ctx: &GatherContext,
    region_name: &str,
    query: &HistoryQuery,
) -> Result<StatsHistory, GatherError> {
    let reference_time_ms = effective_reference_time(query.reference_time_ms);
    let mut accumulator = HistoryAccumulator::new(query.lane);
    let geometry = MapGeometry::default();
    let mut games_seen = 0u32;

    for week_index in 0..query.max_weeks {
        let references =
            week_matchlist(ctx, region_name, query.account_id, week_index, reference_time_ms)
                .await?;
        for reference in references {
            let Some(loaded) = load_match(ctx, region_name, &reference).await? else {
                continue;
            };
            if loaded.result.game_duration < REMAKE_SECONDS {
                continue;
            }

            // The account id may differ historically; the champion from
            // the matchlist reference identifies the participant.
            let lane_map = champion_lane_mapping(&loaded.result, &loaded.timeline, &geometry);
            let Some(lane) = lane_map.get(&reference.champion).copied() else {
                warn!(
                    match_id = reference.game_id,
                    champion = reference.champion,
                    "champion absent from lane mapping, skipping match"
                );
                continue;
            };

            games_seen += 1;
            let in_budget = games_seen <= query.max_games;
            if !(in_budget && reference.champion == query.champion_id) {
                accumulator.observe_lane_only(lane);
                continue;
            }

            let Some(participant) = loaded
                .result
                .participants
                .iter()
                .find(|p| p.champion_id == reference.champion)
            else {
                accumulator.observe_lane_only(lane);
                continue;
            };

            // Fight parsing needs that version's item values.
            let semver = ctx
                .resolve_game_version(&loaded.result.game_version)
                .await?
                .ok_or_else(|| GatherError::MissingStaticData {
                    semver: loaded.result.game_version.clone(),
                })?;
            let items = ctx.items_catalog(&semver).await?;
            let fights = participant_fights(
                &loaded.result,
                &loaded.timeline,
                &items,
                participant.participant_id,
            );

            accumulator.observe_game(GameObservation {
                lane,
                won: participant.stats.win,
                stats: postgame_stats(participant),
                fights,
            });
        }
    }

    Ok(accumulator.finish())
}

/// The cheap availability variant: counts only, no fight or stat parsing.
pub async fn stats_availability(
    ctx: &GatherContext,
    region_name: &str,
    query: &HistoryQuery,
) -> Result<AvailabilityCounts, GatherError> {
    let reference_time_ms = effective_reference_time(query.reference_time_ms);
    let geometry = MapGeometry::default();
    let mut counts = AvailabilityCounts::default();

    for week_index in 0..query.max_weeks {
        let references =
            week_matchlist(ctx, region_name, query.account_id, week_index, reference_time_ms)
                .await?;
        for reference in references {
            counts.num_matches += 1;
            if reference.champion == query.champion_id {
                counts.num_matches_as_champion += 1;
            }
            let Some(loaded) = load_match(ctx, region_name, &reference).await? else {
                continue;
            };
            if loaded.result.game_duration < REMAKE_SECONDS {
                continue;
            }
            let lane_map = champion_lane_mapping(&loaded.result, &loaded.timeline, &geometry);
            if lane_map.get(&reference.champion) == Some(&query.lane) {
                counts.num_matches_in_role += 1;
            }
            let Some(participant) = loaded
                .result
                .participants
                .iter()
                .find(|p| p.champion_id == reference.champion)
            else {
                continue;
            };
            let spells = BTreeSet::from([participant.spell1_id, participant.spell2_id]);
            if spells == query.summoner_spells {
                counts.num_matches_with_summonerspells += 1;
            }
            let runes = BTreeSet::from([
                participant.stats.perk0,
                participant.stats.perk1,
                participant.stats.perk2,
                participant.stats.perk3,
                participant.stats.perk4,
                participant.stats.perk5,
            ]);
            if runes == query.runes {
                counts.num_matches_with_runes += 1;
            }
        }
    }

    Ok(counts)
}

/// Run the extractor for every participant of a finished match and attach
/// the result as a champion-id keyed JSON map. The reference time is the
/// match's creation, so reruns see the same window.
pub async fn attach_match_histories(
    ctx: &GatherContext,
    region_name: &str,
    result: &MatchResult,
    timeline: &MatchTimeline,
) -> Result<(), GatherError> {
    let lane_map = champion_lane_mapping(result, timeline, &MapGeometry::default());

    let mut histories: BTreeMap<String, StatsHistory> = BTreeMap::new();
    for (index, identity) in result.participant_identities.iter().enumerate() {
        tracing::info!(
            "requesting history {} / {}",
            index + 1,
            result.participant_identities.len()
        );
        let Some(participant) = result
            .participants
            .iter()
            .find(|p| p.participant_id == identity.participant_id)
        else {
            continue;
        };
        let Some(lane) = lane_map.get(&participant.champion_id).copied() else {
            continue;
        };
        let query = HistoryQuery {
            account_id: identity.player.current_account_id,
            champion_id: participant.champion_id,
            lane,
            summoner_spells: BTreeSet::from([participant.spell1_id, participant.spell2_id]),
            runes: BTreeSet::from([
                participant.stats.perk0,
                participant.stats.perk1,
                participant.stats.perk2,
                participant.stats.perk3,
                participant.stats.perk4,
                participant.stats.perk5,
            ]),
            reference_time_ms: result.game_creation,
            max_weeks: HISTORY_MAX_WEEKS,
            max_games: HISTORY_MAX_GAMES,
        };
        let history = stats_history(ctx, region_name, &query).await?;
        histories.insert(participant.champion_id.to_string(), history);
    }

    ctx.store
        .attach_histories(
            result.game_id,
            region_name,
            &serde_json::to_string(&histories)?,
        )
        .await?;
    Ok(())
}

fn effective_reference_time(reference_time_ms: i64) -> i64 {
    if reference_time_ms == 0 {
        // The vendor reports zero on just-started games.
        chrono::Utc::now().timestamp_millis()
    } else {
        reference_time_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;

    fn observation(lane: Lane, won: bool, kills: f64) -> GameObservation {
        let mut stats = vec![0.0; POSTGAME_SCHEMA.len()];
        let kills_idx = POSTGAME_SCHEMA
            .iter()
            .position(|(name, _)| *name == "kills")
            .unwrap();
        stats[kills_idx] = kills;
        GameObservation {
            lane,
            won,
            stats,
            fights: Vec::new(),
        }
    }

    fn fight(allies: Vec<i64>, enemies: Vec<i64>, victims: Vec<i64>) -> FightRecord {
        FightRecord {
            timestamp: 60_000,
            position: Some(Position { x: 0, y: 0 }),
            effective_gold: 1000,
            allies,
            enemies,
            victims,
        }
    }

    #[test]
    fn empty_history_is_all_zeroes() {
        let history = HistoryAccumulator::new(Lane::Mid).finish();
        assert_eq!(history.num_games, 0);
        assert_eq!(history.previous_game_won, 0);
        assert_eq!(history.solo_ratio, 0.0);
        assert_eq!(history.averages["total_kills"], 0.0);
        assert_eq!(history.averages["lane_gold_earned"], 0.0);
    }

    #[test]
    fn lane_priority_primary_secondary_autofill() {
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        for _ in 0..5 {
            acc.observe_lane_only(Lane::Mid);
        }
        for _ in 0..3 {
            acc.observe_lane_only(Lane::Top);
        }
        acc.observe_lane_only(Lane::Support);
        assert_eq!(acc.finish().lane_priority, "primary");

        let mut acc = HistoryAccumulator::new(Lane::Top);
        for _ in 0..5 {
            acc.observe_lane_only(Lane::Mid);
        }
        for _ in 0..3 {
            acc.observe_lane_only(Lane::Top);
        }
        assert_eq!(acc.finish().lane_priority, "secondary");

        let mut acc = HistoryAccumulator::new(Lane::Jungle);
        for _ in 0..5 {
            acc.observe_lane_only(Lane::Mid);
        }
        for _ in 0..3 {
            acc.observe_lane_only(Lane::Top);
        }
        assert_eq!(acc.finish().lane_priority, "autofill");
    }

    #[test]
    fn averages_split_total_and_lane() {
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        acc.observe_game(observation(Lane::Mid, true, 10.0));
        acc.observe_game(observation(Lane::Top, true, 2.0));
        let history = acc.finish();
        assert_eq!(history.averages["total_kills"], 6.0);
        assert_eq!(history.averages["lane_kills"], 10.0);
        assert_eq!(history.num_games, 2);
        assert_eq!(history.num_games_in_current_lane, 1);
    }

    #[test]
    fn streaks_follow_most_recent_first_order() {
        // An unbroken run of wins counts its continuations.
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        for won in [true, true, true] {
            acc.observe_game(observation(Lane::Mid, won, 0.0));
        }
        let history = acc.finish();
        assert_eq!(history.previous_game_won, 1);
        assert_eq!(history.consecutive_wins, 2);
        assert_eq!(history.consecutive_losses, 0);

        // A broken streak resets; the tail of losses is what remains.
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        for won in [true, true, true, false, false] {
            acc.observe_game(observation(Lane::Mid, won, 0.0));
        }
        let history = acc.finish();
        assert_eq!(history.previous_game_won, 1);
        assert_eq!(history.consecutive_wins, 0);
        assert_eq!(history.consecutive_losses, 1);

        // Most recent game lost.
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        acc.observe_game(observation(Lane::Mid, false, 0.0));
        assert_eq!(acc.finish().previous_game_won, -1);
    }

    #[test]
    fn fight_classes_score_ratio_and_aggro() {
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        let mut game = observation(Lane::Mid, true, 0.0);
        game.fights = vec![
            // Solo win: lone ally, enemy victim.
            fight(vec![10], vec![60], vec![60]),
            // Solo loss: we were the victim.
            fight(vec![10], vec![70], vec![10]),
            // Solo win again.
            fight(vec![10], vec![80], vec![80]),
            // Skirmish (two allies), neutral: one victim each side.
            fight(vec![10, 20], vec![60, 70], vec![20, 60]),
            // Team fight (four allies), win.
            fight(vec![10, 20, 30, 40], vec![60, 70], vec![60, 70]),
        ];
        acc.observe_game(game);
        acc.observe_game(observation(Lane::Mid, false, 0.0));
        let history = acc.finish();

        // Two games: solo (2 wins - 1 loss) / 2, 3 solo fights / 2.
        assert_eq!(history.solo_ratio, 0.5);
        assert_eq!(history.solo_aggro, 1.5);
        assert_eq!(history.skirmish_ratio, 0.0);
        assert_eq!(history.skirmish_aggro, 0.5);
        assert_eq!(history.team_ratio, 0.5);
        assert_eq!(history.team_aggro, 0.5);
    }

    #[test]
    fn schema_covers_the_extraction_surface() {
        // The fixed schema drives both the totals and the lane averages;
        // its size is part of the persisted format.
        assert_eq!(POSTGAME_SCHEMA.len(), 81);
        let mut names: Vec<&str> = POSTGAME_SCHEMA.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), POSTGAME_SCHEMA.len(), "duplicate stat name");
    }

    #[test]
    fn flags_average_into_fractions() {
        let first_blood_idx = POSTGAME_SCHEMA
            .iter()
            .position(|(name, _)| *name == "scored_first_blood_kill")
            .unwrap();
        let mut acc = HistoryAccumulator::new(Lane::Mid);
        for scored in [1.0, 0.0, 0.0, 1.0] {
            let mut game = observation(Lane::Mid, true, 0.0);
            game.stats[first_blood_idx] = scored;
            acc.observe_game(game);
        }
        let history = acc.finish();
        assert_eq!(history.averages["total_scored_first_blood_kill"], 0.5);
    }
}

//! Typed views over the vendor's JSON payloads.
//!
//! The raw bodies of match results and timelines are persisted verbatim;
//! these structs are the lens the analysis code reads them through, so
//! every field the vendor may omit carries a default instead of failing
//! deserialization.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummonerDto {
    pub account_id: i64,
    /// The summoner id; the vendor calls this plain `id`.
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaguePosition {
    pub queue_type: String,
    pub tier: String,
    pub rank: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGameInfo {
    pub game_id: i64,
    #[serde(default)]
    pub game_start_time: i64,
    pub platform_id: String,
    #[serde(default)]
    pub game_queue_config_id: Option<u32>,
    pub participants: Vec<CurrentGameParticipant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGameParticipant {
    pub team_id: i64,
    pub champion_id: i64,
    pub summoner_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Matchlist {
    #[serde(default)]
    pub matches: Vec<MatchReference>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReference {
    pub game_id: i64,
    pub platform_id: String,
    pub champion: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub game_id: i64,
    pub game_version: String,
    pub game_duration: i64,
    #[serde(default)]
    pub game_creation: i64,
    pub platform_id: String,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub participant_identities: Vec<ParticipantIdentity>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: i64,
    pub team_id: i64,
    pub champion_id: i64,
    #[serde(default)]
    pub spell1_id: i64,
    #[serde(default)]
    pub spell2_id: i64,
    #[serde(default)]
    pub stats: ParticipantStats,
    #[serde(default)]
    pub timeline: ParticipantTimeline,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantStats {
    pub win: bool,
    pub gold_earned: i64,
    pub gold_spent: i64,
    pub total_damage_dealt_to_champions: i64,
    pub true_damage_dealt_to_champions: i64,
    pub physical_damage_dealt_to_champions: i64,
    pub magic_damage_dealt_to_champions: i64,
    pub kills: i64,
    pub assists: i64,
    pub double_kills: i64,
    pub triple_kills: i64,
    pub quadra_kills: i64,
    pub penta_kills: i64,
    pub unreal_kills: i64,
    pub largest_multi_kill: i64,
    pub killing_sprees: i64,
    pub largest_killing_spree: i64,
    pub total_damage_taken: i64,
    pub true_damage_taken: i64,
    pub physical_damage_taken: i64,
    pub magical_damage_taken: i64,
    pub damage_self_mitigated: i64,
    pub longest_time_spent_living: i64,
    pub total_heal: i64,
    pub total_units_healed: i64,
    pub deaths: i64,
    pub wards_placed: i64,
    pub wards_killed: i64,
    pub sight_wards_bought_in_game: i64,
    pub vision_wards_bought_in_game: i64,
    pub total_score_rank: i64,
    pub total_player_score: i64,
    pub objective_player_score: i64,
    pub combat_player_score: i64,
    pub vision_score: i64,
    pub damage_dealt_to_turrets: i64,
    pub damage_dealt_to_objectives: i64,
    pub total_damage_dealt: i64,
    pub turret_kills: i64,
    pub inhibitor_kills: i64,
    pub largest_critical_strike: i64,
    pub total_minions_killed: i64,
    pub neutral_minions_killed: i64,
    pub neutral_minions_killed_team_jungle: i64,
    pub neutral_minions_killed_enemy_jungle: i64,
    pub total_time_crowd_control_dealt: i64,
    pub time_c_cing_others: i64,
    pub first_blood_kill: bool,
    pub first_blood_assist: bool,
    pub first_tower_kill: bool,
    pub first_tower_assist: bool,
    pub first_inhibitor_kill: bool,
    pub first_inhibitor_assist: bool,
    pub champ_level: i64,
    pub perk0: i64,
    pub perk1: i64,
    pub perk2: i64,
    pub perk3: i64,
    pub perk4: i64,
    pub perk5: i64,
}

/// Per-minute delta windows ("0-10", "10-20", ...); absent windows count
/// as zero everywhere downstream.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantTimeline {
    pub gold_per_min_deltas: HashMap<String, f64>,
    pub creeps_per_min_deltas: HashMap<String, f64>,
    pub xp_per_min_deltas: HashMap<String, f64>,
    pub damage_taken_per_min_deltas: HashMap<String, f64>,
    pub damage_taken_diff_per_min_deltas: HashMap<String, f64>,
    pub cs_diff_per_min_deltas: HashMap<String, f64>,
    pub xp_diff_per_min_deltas: HashMap<String, f64>,
}

impl ParticipantTimeline {
    pub fn delta(deltas: &HashMap<String, f64>, window: &str) -> f64 {
        deltas.get(window).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantIdentity {
    pub participant_id: i64,
    pub player: PlayerIdentity,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub current_account_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchTimeline {
    pub frames: Vec<TimelineFrame>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineFrame {
    pub participant_frames: HashMap<String, ParticipantFrame>,
    pub events: Vec<TimelineEvent>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantFrame {
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: i64,
    pub participant_id: Option<i64>,
    pub item_id: Option<i64>,
    pub before_id: Option<i64>,
    pub after_id: Option<i64>,
    pub killer_id: Option<i64>,
    pub victim_id: Option<i64>,
    pub assisting_participant_ids: Vec<i64>,
    pub position: Option<Position>,
}

fn parse<T: for<'de> Deserialize<'de>>(value: &Value, uri: &str) -> Result<T, ApiError> {
    T::deserialize(value).map_err(|error| ApiError::Decode {
        uri: uri.to_owned(),
        error,
    })
}

/// Parse a verbatim match-result body (fresh from the API or re-read from
/// the `match_result_json` column).
pub fn parse_match_result(value: &Value) -> Result<MatchResult, ApiError> {
    parse(value, "match result body")
}

/// Parse a verbatim timeline body.
pub fn parse_match_timeline(value: &Value) -> Result<MatchTimeline, ApiError> {
    parse(value, "match timeline body")
}

/// Parse a verbatim tier-positions body.
pub fn parse_league_positions(value: &Value) -> Result<Vec<LeaguePosition>, ApiError> {
    parse(value, "league positions body")
}

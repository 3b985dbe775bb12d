//! Lane inference from a completed match's result and timeline.
//!
//! The vendor does not report which lane a participant actually played;
//! it is reconstructed per team from smite possession, minion counts and
//! the minute-1 through minute-6 frame positions.

use std::collections::HashMap;

use serde::Serialize;

use crate::types::{MatchResult, MatchTimeline, Participant};

/// The summoner spell only junglers take.
pub const SMITE_SPELL_ID: i64 = 11;

/// Substitute for a participant missing from a frame.
const OFF_MAP: (i64, i64) = (-120, -120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lane {
    Top,
    Jungle,
    Mid,
    Bottom,
    Support,
}

impl Lane {
    pub const ALL: [Lane; 5] = [Lane::Top, Lane::Jungle, Lane::Mid, Lane::Bottom, Lane::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Top => "TOP",
            Lane::Jungle => "JUNGLE",
            Lane::Mid => "MID",
            Lane::Bottom => "BOTTOM",
            Lane::Support => "SUPPORT",
        }
    }
}

/// The half-plane boundaries of the map the matches are played on.
/// Fixed inputs to the inference, not tunables.
#[derive(Debug, Clone, Copy)]
pub struct MapGeometry {
    pub lane_band_min: i64,
    pub lane_band_max: i64,
    pub top_diagonal_offset: i64,
    pub bottom_diagonal_offset: i64,
}

impl Default for MapGeometry {
    fn default() -> Self {
        Self {
            lane_band_min: 4880,
            lane_band_max: 9880,
            top_diagonal_offset: 3000,
            bottom_diagonal_offset: -5000,
        }
    }
}

impl MapGeometry {
    fn is_topside(&self, x: i64, y: i64) -> bool {
        y >= self.lane_band_min && x <= self.lane_band_max && y >= x + self.top_diagonal_offset
    }

    fn is_bottomside(&self, x: i64, y: i64) -> bool {
        y <= self.lane_band_max && x >= self.lane_band_min && y <= x + self.bottom_diagonal_offset
    }
}

/// First element attaining the maximum, so equal scores resolve to the
/// earlier participant in team order.
fn first_max_by<'a, K: PartialOrd, F: Fn(&Participant) -> K>(
    candidates: &[&'a Participant],
    key: F,
) -> &'a Participant {
    let mut best = candidates[0];
    let mut best_key = key(best);
    for candidate in &candidates[1..] {
        let candidate_key = key(candidate);
        if candidate_key > best_key {
            best = candidate;
            best_key = candidate_key;
        }
    }
    best
}

fn first_min_by<'a, K: PartialOrd, F: Fn(&Participant) -> K>(
    candidates: &[&'a Participant],
    key: F,
) -> &'a Participant {
    let mut best = candidates[0];
    let mut best_key = key(best);
    for candidate in &candidates[1..] {
        let candidate_key = key(candidate);
        if candidate_key < best_key {
            best = candidate;
            best_key = candidate_key;
        }
    }
    best
}

/// Assign each of the ten participants a lane; the returned map is keyed
/// by champion id. Both teams get all five lanes exactly once.
pub fn champion_lane_mapping(
    result: &MatchResult,
    timeline: &MatchTimeline,
    geometry: &MapGeometry,
) -> HashMap<i64, Lane> {
    let mut mapping = HashMap::with_capacity(10);

    for team_id in [100, 200] {
        let mut remaining: Vec<&Participant> = result
            .participants
            .iter()
            .filter(|p| p.team_id == team_id)
            .collect();
        if remaining.len() < 5 {
            // Malformed result; a team short of players cannot be laned.
            continue;
        }

        // Minute-1 through minute-6 positions per participant.
        let mut positions: HashMap<i64, Vec<(i64, i64)>> = HashMap::new();
        let upper = timeline.frames.len().min(7);
        for frame in timeline.frames.iter().take(upper).skip(1) {
            for (participant_key, participant_frame) in &frame.participant_frames {
                let Ok(participant_id) = participant_key.parse::<i64>() else {
                    continue;
                };
                if !remaining.iter().any(|p| p.participant_id == participant_id) {
                    continue;
                }
                let at = participant_frame
                    .position
                    .map_or(OFF_MAP, |pos| (pos.x, pos.y));
                positions.entry(participant_id).or_default().push(at);
            }
        }
        let frames_in = |participant: &Participant, test: &dyn Fn(i64, i64) -> bool| {
            positions
                .get(&participant.participant_id)
                .map_or(0, |spots| spots.iter().filter(|(x, y)| test(*x, *y)).count())
        };

        // Jungle: smite carriers first, the whole team as fallback, most
        // jungle minions wins.
        let with_smite: Vec<&Participant> = remaining
            .iter()
            .copied()
            .filter(|p| p.spell1_id == SMITE_SPELL_ID || p.spell2_id == SMITE_SPELL_ID)
            .collect();
        let jungle_candidates = if with_smite.is_empty() {
            remaining.clone()
        } else {
            with_smite
        };
        let jungle = first_max_by(&jungle_candidates, |p| p.stats.neutral_minions_killed);
        remaining.retain(|p| p.participant_id != jungle.participant_id);

        // Support: fewest lane minions of the remaining four.
        let support = first_min_by(&remaining, |p| p.stats.total_minions_killed);
        let support_id = support.participant_id;
        let support_champion = support.champion_id;
        remaining.retain(|p| p.participant_id != support_id);

        // Top: most early frames on the top side of the map.
        let top = first_max_by(&remaining, |p| frames_in(p, &|x, y| geometry.is_topside(x, y)));
        let top_id = top.participant_id;
        let top_champion = top.champion_id;
        remaining.retain(|p| p.participant_id != top_id);

        // Bottom: most early frames on the bottom side; mid is whoever is left.
        let bottom = first_max_by(&remaining, |p| {
            frames_in(p, &|x, y| geometry.is_bottomside(x, y))
        });
        let bottom_id = bottom.participant_id;
        let bottom_champion = bottom.champion_id;
        let mid = remaining
            .iter()
            .find(|p| p.participant_id != bottom_id)
            .expect("two candidates remain when picking bottom");

        mapping.insert(top_champion, Lane::Top);
        mapping.insert(jungle.champion_id, Lane::Jungle);
        mapping.insert(mid.champion_id, Lane::Mid);
        mapping.insert(bottom_champion, Lane::Bottom);
        mapping.insert(support_champion, Lane::Support);
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Build a ten-participant match; `f` tweaks each participant value.
    fn result_with(f: impl Fn(i64, &mut serde_json::Value)) -> MatchResult {
        let participants: Vec<_> = (1..=10)
            .map(|id| {
                let mut p = json!({
                    "participantId": id,
                    "teamId": if id <= 5 { 100 } else { 200 },
                    "championId": id * 10,
                    "spell1Id": 4,
                    "spell2Id": 12,
                    "stats": {"neutralMinionsKilled": 5, "totalMinionsKilled": 100},
                });
                f(id, &mut p);
                p
            })
            .collect();
        serde_json::from_value(json!({
            "gameId": 1,
            "gameVersion": "8.24.1",
            "gameDuration": 1900,
            "platformId": "EUW1",
            "participants": participants,
        }))
        .unwrap()
    }

    /// Frames 1..=6 with fixed positions per participant.
    fn timeline_with(position_of: impl Fn(i64) -> (i64, i64)) -> MatchTimeline {
        let frames: Vec<_> = (0..7)
            .map(|minute| {
                let frames: serde_json::Map<String, serde_json::Value> = (1..=10)
                    .map(|id: i64| {
                        let (x, y) = position_of(id);
                        (id.to_string(), json!({"position": {"x": x, "y": y}}))
                    })
                    .collect();
                json!({
                    "participantFrames": frames,
                    "events": [],
                    "timestamp": minute * 60_000,
                })
            })
            .collect();
        serde_json::from_value(json!({ "frames": frames })).unwrap()
    }

    /// Positions that make participant ids 1..5 map to top, jungle, mid,
    /// bottom, support per team (and 6..10 likewise).
    fn standard_positions(id: i64) -> (i64, i64) {
        match (id - 1) % 5 {
            0 => (2000, 10_000), // top side
            1 => (7000, 7200),   // jungle, neither half-plane
            2 => (7000, 7400),   // mid, neither half-plane
            3 => (10_000, 2000), // bottom side
            _ => (10_100, 2100), // support roams bottom too
        }
    }

    fn standard_result() -> MatchResult {
        result_with(|id, p| {
            match (id - 1) % 5 {
                1 => {
                    // Jungler carries smite and the jungle farm.
                    p["spell2Id"] = json!(SMITE_SPELL_ID);
                    p["stats"]["neutralMinionsKilled"] = json!(120);
                }
                4 => {
                    p["stats"]["totalMinionsKilled"] = json!(20);
                }
                _ => {}
            }
        })
    }

    #[test]
    fn assigns_five_distinct_lanes_per_team() {
        let mapping = champion_lane_mapping(
            &standard_result(),
            &timeline_with(standard_positions),
            &MapGeometry::default(),
        );

        assert_eq!(mapping.len(), 10);
        for team_champions in [[10, 20, 30, 40, 50], [60, 70, 80, 90, 100]] {
            let mut lanes: Vec<Lane> = team_champions
                .iter()
                .map(|champion| mapping[champion])
                .collect();
            lanes.sort_by_key(|lane| lane.as_str());
            let mut expected = Lane::ALL.to_vec();
            expected.sort_by_key(|lane| lane.as_str());
            assert_eq!(lanes, expected);
        }
        assert_eq!(mapping[&10], Lane::Top);
        assert_eq!(mapping[&20], Lane::Jungle);
        assert_eq!(mapping[&30], Lane::Mid);
        assert_eq!(mapping[&40], Lane::Bottom);
        assert_eq!(mapping[&50], Lane::Support);
    }

    #[test]
    fn smite_wins_jungle_regardless_of_position() {
        // Exactly one participant per team carries smite and the jungle
        // farm, but stands in the top lane all game.
        let result = result_with(|id, p| {
            if (id - 1) % 5 == 0 {
                p["spell1Id"] = json!(4);
                p["spell2Id"] = json!(SMITE_SPELL_ID);
                p["stats"]["neutralMinionsKilled"] = json!(75);
            } else {
                p["stats"]["neutralMinionsKilled"] = json!(8);
            }
        });
        let mapping = champion_lane_mapping(
            &result,
            &timeline_with(|_| (2000, 10_000)),
            &MapGeometry::default(),
        );
        assert_eq!(mapping[&10], Lane::Jungle);
        assert_eq!(mapping[&60], Lane::Jungle);
    }

    #[test]
    fn no_smite_falls_back_to_jungle_farm() {
        let result = result_with(|id, p| {
            if (id - 1) % 5 == 2 {
                p["stats"]["neutralMinionsKilled"] = json!(90);
            }
        });
        let mapping = champion_lane_mapping(
            &result,
            &timeline_with(standard_positions),
            &MapGeometry::default(),
        );
        assert_eq!(mapping[&30], Lane::Jungle);
    }

    #[test]
    fn missing_positions_default_off_map() {
        // A timeline with no position data at all still yields a full,
        // distinct assignment.
        let frames: Vec<_> = (0..7)
            .map(|minute| {
                let frames: serde_json::Map<String, serde_json::Value> =
                    (1..=10).map(|id: i64| (id.to_string(), json!({}))).collect();
                json!({"participantFrames": frames, "events": [], "timestamp": minute * 60_000})
            })
            .collect();
        let timeline: MatchTimeline = serde_json::from_value(json!({ "frames": frames })).unwrap();

        let mapping =
            champion_lane_mapping(&standard_result(), &timeline, &MapGeometry::default());
        assert_eq!(mapping.len(), 10);
    }

    #[test]
    fn geometry_matches_the_map_halves() {
        let geometry = MapGeometry::default();
        assert!(geometry.is_topside(1000, 10_000));
        assert!(!geometry.is_topside(9000, 9000));
        assert!(geometry.is_bottomside(10_000, 2000));
        assert!(!geometry.is_bottomside(7000, 7000));
    }
}

//! Fight-event clustering around one participant of one match.
//!
//! A raw timeline reports every champion kill separately; a team fight
//! shows up as a burst of overlapping kill events. This module walks the
//! timeline once, emits a record per kill/death the focal participant was
//! part of, widens each record with the surrounding 15 seconds of combat,
//! and then folds records whose victims subsume each other within a
//! 30-second window into single fights.

use serde::Serialize;

use crate::items::ItemsCatalog;
use crate::types::{MatchResult, MatchTimeline, Position, TimelineEvent};

const AUGMENT_WINDOW_MS: i64 = 15_000;
const DEDUP_WINDOW_MS: i64 = 30_000;

/// One clustered fight, champion-id based. `allies` always contains the
/// focal participant's champion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FightRecord {
    pub timestamp: i64,
    pub position: Option<Position>,
    /// Gold the focal participant had spent into their build at the time.
    pub effective_gold: i64,
    pub allies: Vec<i64>,
    pub enemies: Vec<i64>,
    pub victims: Vec<i64>,
}

fn push_unique(list: &mut Vec<i64>, value: i64) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn contributors(event: &TimelineEvent) -> Vec<i64> {
    // Killer 0 is a tower.
    let mut all = vec![event.killer_id.unwrap_or(0)];
    all.extend(&event.assisting_participant_ids);
    all
}

/// All fights the given participant took part in, in timestamp order.
pub fn participant_fights(
    result: &MatchResult,
    timeline: &MatchTimeline,
    items: &ItemsCatalog,
    participant_id: i64,
) -> Vec<FightRecord> {
    let champion_of = |p_id: i64| -> i64 {
        result
            .participants
            .iter()
            .find(|p| p.participant_id == p_id)
            .map_or(0, |p| p.champion_id)
    };

    let mut effective_gold_spent = 0i64;
    let mut kills: Vec<FightRecord> = Vec::new();
    let mut deaths: Vec<FightRecord> = Vec::new();
    let mut kill_events: Vec<TimelineEvent> = Vec::new();

    for frame in &timeline.frames {
        for event in &frame.events {
            // Events are chronological, so the running gold figure is
            // correct at the moment each kill happens.
            let for_us = event.participant_id == Some(participant_id);
            match event.kind.as_str() {
                "ITEM_PURCHASED" if for_us => {
                    effective_gold_spent += items.gold_value(event.item_id.unwrap_or(0));
                }
                "ITEM_DESTROYED" | "ITEM_SOLD" if for_us => {
                    effective_gold_spent -= items.gold_value(event.item_id.unwrap_or(0));
                }
                "ITEM_UNDO" if for_us => {
                    effective_gold_spent -= items.gold_value(event.before_id.unwrap_or(0));
                    effective_gold_spent += items.gold_value(event.after_id.unwrap_or(0));
                }
                "CHAMPION_KILL" => {
                    let involved = contributors(event);
                    let victim = event.victim_id.unwrap_or(0);
                    if involved.contains(&participant_id) {
                        kills.push(FightRecord {
                            timestamp: event.timestamp,
                            position: event.position,
                            effective_gold: effective_gold_spent,
                            allies: involved,
                            enemies: vec![victim],
                            victims: vec![victim],
                        });
                    } else if victim == participant_id {
                        deaths.push(FightRecord {
                            timestamp: event.timestamp,
                            position: event.position,
                            effective_gold: effective_gold_spent,
                            allies: vec![victim],
                            enemies: involved,
                            victims: vec![victim],
                        });
                    }
                    kill_events.push(event.clone());
                }
                _ => {}
            }
        }
    }

    // Pull the surrounding combat into each record. For a kill: victims of
    // our allies join the enemy side; allies dying means the other team
    // scored too, so their killers join the enemy side as well.
    for record in &mut kills {
        let window = kill_events
            .iter()
            .filter(|e| (record.timestamp - AUGMENT_WINDOW_MS) <= e.timestamp
                && e.timestamp <= (record.timestamp + AUGMENT_WINDOW_MS));
        for event in window {
            let involved = contributors(event);
            let victim = event.victim_id.unwrap_or(0);
            for ally in record.allies.clone() {
                if involved.contains(&ally) {
                    push_unique(&mut record.enemies, victim);
                    push_unique(&mut record.victims, victim);
                } else if ally == victim {
                    for enemy in &involved {
                        push_unique(&mut record.enemies, *enemy);
                        push_unique(&mut record.victims, victim);
                    }
                }
            }
        }
    }
    // Reversed orientation for deaths.
    for record in &mut deaths {
        let window = kill_events
            .iter()
            .filter(|e| (record.timestamp - AUGMENT_WINDOW_MS) <= e.timestamp
                && e.timestamp <= (record.timestamp + AUGMENT_WINDOW_MS));
        for event in window {
            let involved = contributors(event);
            let victim = event.victim_id.unwrap_or(0);
            for enemy in record.enemies.clone() {
                if involved.contains(&enemy) {
                    push_unique(&mut record.allies, victim);
                    push_unique(&mut record.victims, victim);
                } else if enemy == victim {
                    for ally in &involved {
                        push_unique(&mut record.allies, *ally);
                        push_unique(&mut record.victims, victim);
                    }
                }
            }
        }
    }

    let mut records: Vec<FightRecord> = kills.into_iter().chain(deaths).collect();
    records.sort_by_key(|record| record.timestamp);

    // From here on participants are champions (and tower kills champion 0).
    for record in &mut records {
        for side in [&mut record.allies, &mut record.enemies, &mut record.victims] {
            let mapped: Vec<i64> = side.iter().map(|p_id| champion_of(*p_id)).collect();
            *side = mapped;
        }
    }

    dedup_fights(&mut records);
    records.retain(|record| !record.victims.is_empty());
    records
}

/// Merge records whose victim sets subsume each other within the forward
/// 30-second window; partial overlaps keep only their off-spin victims.
/// Cleared victim lists mark redundant records for removal.
fn dedup_fights(records: &mut [FightRecord]) {
    for current_idx in 0..records.len() {
        if records[current_idx].victims.is_empty() {
            continue;
        }
        let deadline = records[current_idx].timestamp + DEDUP_WINDOW_MS;
        for later_idx in (current_idx + 1)..records.len() {
            if records[later_idx].timestamp > deadline {
                break;
            }
            if records[later_idx].victims.is_empty() {
                continue;
            }
            let current_victims = records[current_idx].victims.clone();
            let later_victims = records[later_idx].victims.clone();

            if later_victims.iter().all(|v| current_victims.contains(v)) {
                // The later record is contained in this fight.
                let (allies, enemies) = (
                    records[later_idx].allies.clone(),
                    records[later_idx].enemies.clone(),
                );
                for ally in allies {
                    push_unique(&mut records[current_idx].allies, ally);
                }
                for enemy in enemies {
                    push_unique(&mut records[current_idx].enemies, enemy);
                }
                records[later_idx].victims.clear();
            } else if current_victims.iter().all(|v| later_victims.contains(v)) {
                // This record is contained in the later fight.
                let (allies, enemies) = (
                    records[current_idx].allies.clone(),
                    records[current_idx].enemies.clone(),
                );
                for ally in allies {
                    push_unique(&mut records[later_idx].allies, ally);
                }
                for enemy in enemies {
                    push_unique(&mut records[later_idx].enemies, enemy);
                }
                records[current_idx].victims.clear();
                // Current is gone; its window scan is over.
                break;
            } else if later_victims.iter().any(|v| current_victims.contains(v)) {
                // Partially the same fight: leave the later record its
                // off-spin victims only.
                records[later_idx]
                    .victims
                    .retain(|v| !current_victims.contains(v));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items() -> ItemsCatalog {
        ItemsCatalog::from_json(
            &json!({
                "data": {
                    "1001": {"gold": {"total": 300}},
                    "1029": {"gold": {"total": 400}},
                    "3078": {"gold": {"total": 3733}},
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    /// Participant n plays champion n*10; two teams of five.
    fn result() -> MatchResult {
        let participants: Vec<_> = (1..=10)
            .map(|id| {
                json!({
                    "participantId": id,
                    "teamId": if id <= 5 { 100 } else { 200 },
                    "championId": id * 10,
                })
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

    fn timeline_of(events: Vec<serde_json::Value>) -> MatchTimeline {
        serde_json::from_value(json!({
            "frames": [{"participantFrames": {}, "events": events, "timestamp": 0}],
        }))
        .unwrap()
    }

    fn kill(timestamp: i64, killer: i64, assists: Vec<i64>, victim: i64) -> serde_json::Value {
        json!({
            "type": "CHAMPION_KILL",
            "timestamp": timestamp,
            "killerId": killer,
            "assistingParticipantIds": assists,
            "victimId": victim,
            "position": {"x": 1000, "y": 1000},
        })
    }

    #[test]
    fn tracks_effective_gold_through_item_events() {
        let timeline = timeline_of(vec![
            json!({"type": "ITEM_PURCHASED", "timestamp": 1000, "participantId": 1, "itemId": 1001}),
            json!({"type": "ITEM_PURCHASED", "timestamp": 2000, "participantId": 1, "itemId": 3078}),
            json!({"type": "ITEM_SOLD", "timestamp": 3000, "participantId": 1, "itemId": 1001}),
            json!({"type": "ITEM_UNDO", "timestamp": 4000, "participantId": 1, "beforeId": 3078, "afterId": 1029}),
            // Purchases by other participants are not ours.
            json!({"type": "ITEM_PURCHASED", "timestamp": 5000, "participantId": 2, "itemId": 3078}),
            kill(6000, 1, vec![], 6),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights.len(), 1);
        // 300 + 3733 - 300 - 3733 + 400 = 400
        assert_eq!(fights[0].effective_gold, 400);
    }

    #[test]
    fn phantom_item_uses_override_value() {
        let timeline = timeline_of(vec![
            json!({"type": "ITEM_PURCHASED", "timestamp": 1000, "participantId": 1, "itemId": 1018}),
            kill(2000, 1, vec![], 6),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights[0].effective_gold, 2200);
    }

    #[test]
    fn kill_and_death_orientation() {
        let timeline = timeline_of(vec![
            kill(10_000, 1, vec![2], 6),
            kill(120_000, 7, vec![], 1),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights.len(), 2);

        // Our kill: we and the assist are allies, the victim is the enemy.
        assert_eq!(fights[0].allies, vec![10, 20]);
        assert_eq!(fights[0].enemies, vec![60]);
        assert_eq!(fights[0].victims, vec![60]);

        // Our death: we are the ally and the victim, the killer the enemy.
        assert_eq!(fights[1].allies, vec![10]);
        assert_eq!(fights[1].enemies, vec![70]);
        assert_eq!(fights[1].victims, vec![10]);
    }

    #[test]
    fn tower_kill_maps_to_champion_zero() {
        let timeline = timeline_of(vec![json!({
            "type": "CHAMPION_KILL",
            "timestamp": 10_000,
            "killerId": 0,
            "assistingParticipantIds": [],
            "victimId": 1,
        })]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights.len(), 1);
        assert_eq!(fights[0].enemies, vec![0]);
    }

    #[test]
    fn nearby_ally_kills_widen_the_fight() {
        // Our kill at 10s; our assister scores another kill 5s later.
        // The second victim belongs to our fight's enemies and victims.
        let timeline = timeline_of(vec![
            kill(10_000, 1, vec![2], 6),
            kill(15_000, 2, vec![], 7),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights.len(), 1);
        assert_eq!(fights[0].allies, vec![10, 20]);
        assert_eq!(fights[0].enemies, vec![60, 70]);
        assert_eq!(fights[0].victims, vec![60, 70]);
    }

    #[test]
    fn trade_pulls_enemy_killers_in() {
        // We score at 10s, an ally of ours dies at 12s: both sides scored,
        // so the enemy killers join our record's enemies.
        let timeline = timeline_of(vec![
            kill(10_000, 1, vec![2], 6),
            kill(12_000, 7, vec![8], 2),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights.len(), 1);
        let fight = &fights[0];
        assert!(fight.enemies.contains(&70));
        assert!(fight.enemies.contains(&80));
        assert!(fight.victims.contains(&20));
    }

    #[test]
    fn subset_fights_merge() {
        // Two overlapping kill events 5s apart; the first fight's victims
        // are a subset of the combined one. One record must survive with
        // the union of participants.
        let timeline = timeline_of(vec![
            kill(10_000, 1, vec![2], 6),
            kill(15_000, 1, vec![3], 7),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert_eq!(fights.len(), 1);
        let fight = &fights[0];
        let mut victims = fight.victims.clone();
        victims.sort();
        assert_eq!(victims, vec![60, 70]);
        for champion in [10, 20, 30] {
            assert!(fight.allies.contains(&champion), "missing ally {champion}");
        }
        for champion in [60, 70] {
            assert!(fight.enemies.contains(&champion), "missing enemy {champion}");
        }
    }

    #[test]
    fn no_surviving_record_subsumes_another() {
        // A messy brawl with repeated and overlapping kills.
        let timeline = timeline_of(vec![
            kill(10_000, 1, vec![2], 6),
            kill(12_000, 1, vec![], 7),
            kill(35_000, 1, vec![2], 6),
            kill(36_000, 7, vec![], 1),
            kill(80_000, 1, vec![], 8),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        assert!(!fights.is_empty());
        for (i, a) in fights.iter().enumerate() {
            for (j, b) in fights.iter().enumerate() {
                if i == j || (b.timestamp - a.timestamp) > DEDUP_WINDOW_MS {
                    continue;
                }
                if b.timestamp >= a.timestamp {
                    let subsumed = b.victims.iter().all(|v| a.victims.contains(v))
                        || a.victims.iter().all(|v| b.victims.contains(v));
                    assert!(!subsumed, "records {i} and {j} subsume each other");
                }
            }
        }
        // Output stays in timestamp order.
        let timestamps: Vec<i64> = fights.iter().map(|f| f.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn partial_overlap_keeps_the_off_spin() {
        // Fight one kills champions 60 and 70 (merged); a later event
        // within 30s kills 70 and 80: only 80 remains its victim.
        let timeline = timeline_of(vec![
            kill(10_000, 1, vec![2], 6),
            kill(11_000, 1, vec![2], 7),
            kill(30_000, 3, vec![1], 7),
            kill(31_000, 3, vec![1], 8),
        ]);
        let fights = participant_fights(&result(), &timeline, &items(), 1);
        // All four events collapse into windows; check no victim is
        // counted by two surviving records.
        let mut all_victims: Vec<i64> = fights.iter().flat_map(|f| f.victims.clone()).collect();
        let total = all_victims.len();
        all_victims.sort();
        all_victims.dedup();
        assert_eq!(total, all_victims.len(), "a victim appears in two fights");
    }
}

//! The stalker loop: keep a list of target summoners, wait for one of
//! them to enter a ranked solo-queue match, run the pipeline on it, and
//! adopt the match's participants as the next targets. When the trail
//! goes cold, fall back to the operator prompt.

use std::time::Duration;

use health::HealthHandle;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use stalker_common::context::GatherContext;
use stalker_common::endpoints::RANKED_SOLO_QUEUE;
use stalker_common::error::GatherError;
use stalker_common::retry::RetryEnvelope;
use stalker_common::store::Summoner;
use stalker_common::types::CurrentGameInfo;

use crate::error::WorkerError;
use crate::pipeline::observe_match;

/// Rounds of polling all targets before giving up on the current list.
const STALK_ROUNDS: u32 = 5;
/// Pause between rounds; roughly the queue-and-lobby time between two
/// consecutive solo-queue games. Five rounds make the 30-minute budget.
const ROUND_PAUSE: Duration = Duration::from_secs(360);

pub struct Stalker<'c> {
    ctx: &'c GatherContext,
    region_name: String,
    liveness: HealthHandle,
}

impl<'c> Stalker<'c> {
    pub fn new(ctx: &'c GatherContext, region_name: String, liveness: HealthHandle) -> Self {
        Self {
            ctx,
            region_name,
            liveness,
        }
    }

    /// Run forever (or until a fatal error or closed stdin).
    pub async fn run(&self) -> Result<(), WorkerError> {
        self.ctx.store.get_or_create_region(&self.region_name).await?;
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let mut targets: Vec<Summoner> = Vec::new();

        loop {
            if targets.is_empty() {
                targets = self.prompt_for_targets(&mut input).await?;
            }

            let Some((watched_summoner_id, ongoing)) = self.watch_targets(&targets).await? else {
                info!(
                    "none of the targets ({}) entered a game in the last 30 minutes, \
                     switching to manual control",
                    names(&targets)
                );
                targets.clear();
                continue;
            };

            match observe_match(self.ctx, &self.region_name, &ongoing).await {
                Ok(new_targets) => {
                    info!("new targets: {}", names(&new_targets));
                    targets = new_targets;
                }
                Err(GatherError::MatchTaken { match_id }) => {
                    info!(
                        match_id,
                        "match already claimed by another process, dropping that target"
                    );
                    targets.retain(|s| s.summoner_id != watched_summoner_id);
                }
                Err(error) if error.is_fatal() => {
                    // Our quota accounting (or configuration) is wrong;
                    // carrying on would only repeat the offence.
                    return Err(error.into());
                }
                Err(error) => {
                    warn!("pipeline failed, dropping that target: {}", error);
                    targets.retain(|s| s.summoner_id != watched_summoner_id);
                }
            }
        }
    }

    /// Poll every target for an ongoing ranked solo-queue match, up to
    /// `STALK_ROUNDS` rounds. First hit wins.
    async fn watch_targets(
        &self,
        targets: &[Summoner],
    ) -> Result<Option<(i64, CurrentGameInfo)>, GatherError> {
        for round in 0..STALK_ROUNDS {
            if round > 0 {
                info!(
                    "no target in an ongoing match, waiting {} minutes before re-checking",
                    ROUND_PAUSE.as_secs() / 60
                );
                tokio::time::sleep(ROUND_PAUSE).await;
            }
            self.liveness.report_healthy().await;

            for target in targets {
                let found = RetryEnvelope::absence_is_empty(0)
                    .run(|| {
                        self.ctx
                            .api
                            .get_active_match(&self.region_name, target.summoner_id)
                    })
                    .await;
                match found {
                    Ok(Some(game))
                        if game.game_queue_config_id == Some(RANKED_SOLO_QUEUE) =>
                    {
                        info!(
                            match_id = game.game_id,
                            "summoner '{}' is in an ongoing match", target.latest_name
                        );
                        return Ok(Some((target.summoner_id, game)));
                    }
                    Ok(Some(_)) => {
                        info!("summoner '{}' is in a different game/queue mode", target.latest_name);
                    }
                    Ok(None) => {
                        info!("summoner '{}' is not in an active match", target.latest_name);
                    }
                    Err(error) if error.is_fatal() => return Err(error),
                    Err(error) => {
                        warn!(
                            "active-match poll for '{}' failed, skipping for now: {}",
                            target.latest_name, error
                        );
                    }
                }
            }
        }
        Ok(None)
    }

    /// Operator prompt: collect target summoners by name until confirmed.
    async fn prompt_for_targets(
        &self,
        input: &mut Lines<BufReader<Stdin>>,
    ) -> Result<Vec<Summoner>, WorkerError> {
        let mut targets: Vec<Summoner> = Vec::new();
        loop {
            println!(
                "\nPlease input a summoner on {} to definitely-not-stalk:",
                self.region_name
            );
            let Some(line) = input.next_line().await? else {
                return Err(WorkerError::InputClosed);
            };
            let target_name = line.trim();
            if target_name.is_empty() {
                continue;
            }

            match self.lookup_summoner(target_name).await? {
                Some(summoner) => targets.push(summoner),
                None => {
                    println!("Summoner with name '{target_name}' was not found, try another.");
                    continue;
                }
            }

            println!("Current targets: {}", names(&targets));
            println!("Type 'Yes'/'OK' to start; anything else adds another summoner:");
            let Some(confirmation) = input.next_line().await? else {
                return Err(WorkerError::InputClosed);
            };
            let confirmation = confirmation.to_lowercase();
            if confirmation.contains("yes") || confirmation.contains("ok") {
                return Ok(targets);
            }
        }
    }

    async fn lookup_summoner(&self, name: &str) -> Result<Option<Summoner>, GatherError> {
        let found = RetryEnvelope::absence_is_empty(0)
            .run(|| self.ctx.api.get_summoner(&self.region_name, name))
            .await?;
        match found {
            Some(dto) => {
                let summoner = self
                    .ctx
                    .store
                    .upsert_summoner(&self.region_name, dto.account_id, dto.id, &dto.name)
                    .await?;
                Ok(Some(summoner))
            }
            None => Ok(None),
        }
    }
}

fn names(targets: &[Summoner]) -> String {
    targets
        .iter()
        .map(|s| s.latest_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summoner(summoner_id: i64, name: &str) -> Summoner {
        Summoner {
            id: summoner_id,
            region_name: "EUW".to_string(),
            account_id: summoner_id * 100,
            summoner_id,
            latest_name: name.to_string(),
        }
    }

    #[test]
    fn names_join_for_display() {
        let targets = vec![summoner(1, "alpha"), summoner(2, "beta")];
        assert_eq!(names(&targets), "alpha, beta");
        assert_eq!(names(&[]), "");
    }

    #[test]
    fn dropping_a_target_keeps_the_rest() {
        let mut targets = vec![summoner(1, "alpha"), summoner(2, "beta"), summoner(3, "gamma")];
        let watched = 2;
        targets.retain(|s| s.summoner_id != watched);
        assert_eq!(names(&targets), "alpha, gamma");
    }
}

//! The repair sweep: complete partial match rows left behind by
//! interrupted pipelines and best-effort fetches.
//!
//! Recovery order per row matters: the timeline is standalone, the result
//! carries duration and version, and histories need both. A field that
//! stays unrecoverable is skipped and picked up by the next sweep.

use tracing::{info, warn};

use stalker_common::context::GatherContext;
use stalker_common::error::GatherError;
use stalker_common::history::{attach_match_histories, REMAKE_SECONDS};
use stalker_common::retry::RetryEnvelope;
use stalker_common::store::IncompleteMatch;
use stalker_common::types::{parse_match_result, parse_match_timeline};
use stalker_common::versions;

#[derive(Debug, Default)]
pub struct RepairReport {
    pub rows_seen: u32,
    pub timelines_recovered: u32,
    pub results_recovered: u32,
    pub histories_recovered: u32,
    pub versions_recovered: u32,
}

pub struct Repairer<'c> {
    ctx: &'c GatherContext,
    region_name: String,
}

impl<'c> Repairer<'c> {
    pub fn new(ctx: &'c GatherContext, region_name: String) -> Self {
        Self { ctx, region_name }
    }

    /// One sweep over the incomplete rows of the region.
    pub async fn run(&self, semver: Option<&str>) -> Result<RepairReport, GatherError> {
        // Known versions up front; the version backfill matches against
        // these.
        let fresh = self.ctx.api.get_versions().await?;
        for version in &fresh {
            self.ctx.store.insert_version_if_absent(version).await?;
        }
        let known_versions = self.ctx.store.known_versions().await?;

        let worklist = self
            .ctx
            .store
            .incomplete_matches(&self.region_name, semver)
            .await?;
        info!(
            rows = worklist.len(),
            region = self.region_name,
            "starting repair sweep"
        );

        let mut report = RepairReport::default();
        for row in worklist {
            report.rows_seen += 1;
            if let Err(error) = self.repair_row(&row, &known_versions, &mut report).await {
                if error.is_fatal() {
                    return Err(error);
                }
                warn!(match_id = row.match_id, "row left incomplete: {}", error);
            }
        }
        Ok(report)
    }

    async fn repair_row(
        &self,
        row: &IncompleteMatch,
        known_versions: &[String],
        report: &mut RepairReport,
    ) -> Result<(), GatherError> {
        let platform = self
            .ctx
            .api
            .hosts()
            .platform_by_region(&self.region_name)?
            .to_owned();

        if row.timeline_missing {
            match RetryEnvelope::required(1)
                .run(|| self.ctx.api.get_match_timeline(&platform, row.match_id))
                .await
            {
                Ok(value) => {
                    let value = value.expect("required envelope yields a value on success");
                    self.ctx
                        .store
                        .attach_timeline(row.match_id, &self.region_name, &value.to_string())
                        .await?;
                    report.timelines_recovered += 1;
                    metrics::counter!("repair_timelines_recovered_total").increment(1);
                    info!(match_id = row.match_id, "recovered timeline");
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(match_id = row.match_id, "timeline not recoverable: {}", error);
                }
            }
        }

        if row.result_missing {
            match RetryEnvelope::required(1)
                .run(|| self.ctx.api.get_match_result(&platform, row.match_id))
                .await
            {
                Ok(value) => {
                    let value = value.expect("required envelope yields a value on success");
                    let result = parse_match_result(&value)?;
                    let version = self.ctx.resolve_game_version(&result.game_version).await?;
                    self.ctx
                        .store
                        .attach_result(
                            row.match_id,
                            &self.region_name,
                            version.as_deref(),
                            result.game_duration,
                            &value.to_string(),
                        )
                        .await?;
                    report.results_recovered += 1;
                    metrics::counter!("repair_results_recovered_total").increment(1);
                    info!(match_id = row.match_id, "recovered result");
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    // Without the result neither histories nor version
                    // can follow; move to the next row.
                    warn!(match_id = row.match_id, "result not recoverable: {}", error);
                    return Ok(());
                }
            }
        }

        if row.history_missing {
            self.repair_histories(row, report).await?;
        }

        if row.version_missing {
            self.backfill_version(row, known_versions, report).await?;
        }

        Ok(())
    }

    /// Histories need the stored result and timeline; both may have just
    /// been recovered above.
    async fn repair_histories(
        &self,
        row: &IncompleteMatch,
        report: &mut RepairReport,
    ) -> Result<(), GatherError> {
        let Some(current) = self
            .ctx
            .store
            .get_match(row.match_id, &self.region_name)
            .await?
        else {
            return Ok(());
        };
        let (Some(result_raw), Some(timeline_raw)) =
            (&current.match_result_json, &current.match_timeline_json)
        else {
            info!(
                match_id = row.match_id,
                "result or timeline still missing, histories stay open"
            );
            return Ok(());
        };
        let result_value: serde_json::Value = serde_json::from_str(result_raw)?;
        let timeline_value: serde_json::Value = serde_json::from_str(timeline_raw)?;
        let result = parse_match_result(&result_value)?;
        let timeline = parse_match_timeline(&timeline_value)?;

        // A stored remake carries no histories.
        if current
            .game_duration
            .is_some_and(|duration| duration < REMAKE_SECONDS)
        {
            return Ok(());
        }

        match attach_match_histories(self.ctx, &self.region_name, &result, &timeline).await {
            Ok(()) => {
                report.histories_recovered += 1;
                metrics::counter!("repair_histories_recovered_total").increment(1);
                info!(match_id = row.match_id, "recovered histories");
                Ok(())
            }
            Err(GatherError::MissingStaticData { semver }) => {
                warn!(
                    match_id = row.match_id,
                    semver, "static data missing for a historical version, histories stay open"
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn backfill_version(
        &self,
        row: &IncompleteMatch,
        known_versions: &[String],
        report: &mut RepairReport,
    ) -> Result<(), GatherError> {
        let Some(current) = self
            .ctx
            .store
            .get_match(row.match_id, &self.region_name)
            .await?
        else {
            return Ok(());
        };
        let Some(result_raw) = &current.match_result_json else {
            return Ok(());
        };
        let result_value: serde_json::Value = serde_json::from_str(result_raw)?;
        let result = parse_match_result(&result_value)?;
        if let Some(version) = versions::find_matching(known_versions, &result.game_version) {
            self.ctx
                .store
                .attach_version(row.match_id, &self.region_name, version)
                .await?;
            report.versions_recovered += 1;
            info!(match_id = row.match_id, version, "recovered game version");
        }
        Ok(())
    }
}

//! The vendor API client.
//!
//! Every call runs through the same discipline: resolve the host through
//! the catalog, obtain a permit from the request ledger, perform the GET,
//! and on success cross-check the advertised app quotas against our
//! configuration. A disagreement there means every subsequent admission
//! decision would be made against wrong numbers, so it is fatal.

use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::endpoints;
use crate::error::{ApiError, GatherError};
use crate::ledger::RequestLedger;
use crate::ratelimits::{ApiKeyConfig, RateLimit};
use crate::regions::RegionalHosts;
use crate::types::{CurrentGameInfo, Matchlist, SummonerDto};

pub struct RiotApi {
    client: reqwest::Client,
    keys: ApiKeyConfig,
    hosts: RegionalHosts,
    ledger: RequestLedger,
}

impl RiotApi {
    pub fn new(keys: ApiKeyConfig, ledger: RequestLedger, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("match-stalker gatherer")
            .timeout(request_timeout)
            .build()
            .expect("failed to construct reqwest client for the riot api");

        Self {
            client,
            keys,
            hosts: RegionalHosts,
            ledger,
        }
    }

    pub fn hosts(&self) -> &RegionalHosts {
        &self.hosts
    }

    pub async fn get_summoner(
        &self,
        region_name: &str,
        name: &str,
    ) -> Result<SummonerDto, GatherError> {
        let host = self.hosts.host_by_region(region_name)?;
        let uri = endpoints::summoner_by_name(host, name, &self.keys.key);
        let body = self
            .get(&uri, region_name, endpoints::METHOD_SUMMONER_BY_NAME)
            .await?;
        Ok(decode(&body, &uri)?)
    }

    /// Tier positions for one summoner, verbatim (the body is snapshotted
    /// into the tier history as-is).
    pub async fn get_tiers(
        &self,
        region_name: &str,
        summoner_id: i64,
    ) -> Result<Value, GatherError> {
        let host = self.hosts.host_by_region(region_name)?;
        let uri = endpoints::tiers_by_summoner_id(host, summoner_id, &self.keys.key);
        self.get(&uri, region_name, endpoints::METHOD_TIERS).await
    }

    pub async fn get_active_match(
        &self,
        region_name: &str,
        summoner_id: i64,
    ) -> Result<CurrentGameInfo, GatherError> {
        let host = self.hosts.host_by_region(region_name)?;
        let uri = endpoints::spectator_by_summoner_id(host, summoner_id, &self.keys.key);
        let body = self.get(&uri, region_name, endpoints::METHOD_OTHER).await?;
        Ok(decode(&body, &uri)?)
    }

    pub async fn get_matchlist(
        &self,
        region_name: &str,
        account_id: i64,
        end_time_ms: i64,
        begin_time_ms: i64,
    ) -> Result<Matchlist, GatherError> {
        let host = self.hosts.host_by_region(region_name)?;
        let uri = endpoints::matchlist_by_account_id(
            host,
            account_id,
            &self.keys.key,
            end_time_ms,
            begin_time_ms,
        );
        let body = self
            .get(&uri, region_name, endpoints::METHOD_MATCHLIST)
            .await?;
        Ok(decode(&body, &uri)?)
    }

    /// Match result, verbatim. Platform-scoped: the ledger key is the
    /// region the platform belongs to.
    pub async fn get_match_result(
        &self,
        platform_name: &str,
        match_id: i64,
    ) -> Result<Value, GatherError> {
        let host = self.hosts.host_by_platform(platform_name)?;
        let region = self.hosts.region_by_platform(platform_name)?;
        let uri = endpoints::match_by_match_id(host, match_id, &self.keys.key);
        self.get(&uri, region, endpoints::METHOD_MATCH_AND_TIMELINE)
            .await
    }

    /// Match timeline, verbatim. Shares a rate-limit class with results.
    pub async fn get_match_timeline(
        &self,
        platform_name: &str,
        match_id: i64,
    ) -> Result<Value, GatherError> {
        let host = self.hosts.host_by_platform(platform_name)?;
        let region = self.hosts.region_by_platform(platform_name)?;
        let uri = endpoints::timeline_by_match_id(host, match_id, &self.keys.key);
        self.get(&uri, region, endpoints::METHOD_MATCH_AND_TIMELINE)
            .await
    }

    /// The static-data CDN version list. The CDN is unmetered, no permit.
    pub async fn get_versions(&self) -> Result<Vec<String>, GatherError> {
        let body = self.get_unmetered(endpoints::VERSIONS).await?;
        Ok(decode(&body, endpoints::VERSIONS)?)
    }

    /// Fetch one static-data CDN document verbatim.
    pub async fn get_static(&self, uri: &str) -> Result<Value, GatherError> {
        self.get_unmetered(uri).await
    }

    async fn get(&self, uri: &str, region: &str, method: &str) -> Result<Value, GatherError> {
        let quotas = self.keys.applied_quotas(region, method)?;
        self.ledger
            .permit(&self.keys.key, region, method, uri, &quotas)
            .await?;

        let response = self.client.get(uri).send().await.map_err(ApiError::from)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(ApiError::from)?;

        metrics::counter!(
            "riot_api_requests_total",
            &[
                ("method", method.to_owned()),
                ("status", status.as_u16().to_string()),
            ]
        )
        .increment(1);

        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                headers,
                body,
                uri: uri.to_owned(),
            }
            .into());
        }

        let advertised = headers
            .get("X-App-Rate-Limit")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                GatherError::RatelimitMismatch(
                    "response carried no X-App-Rate-Limit header".to_string(),
                )
            })?;
        validate_app_rate_limits(&self.keys.app_limits, advertised)?;

        serde_json::from_str(&body)
            .map_err(|error| {
                ApiError::Decode {
                    uri: uri.to_owned(),
                    error,
                }
                .into()
            })
    }

    async fn get_unmetered(&self, uri: &str) -> Result<Value, GatherError> {
        debug!(uri, "fetching static data");
        let response = self.client.get(uri).send().await.map_err(ApiError::from)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::from)?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                headers: http::HeaderMap::new(),
                body,
                uri: uri.to_owned(),
            }
            .into());
        }
        serde_json::from_str(&body)
            .map_err(|error| {
                ApiError::Decode {
                    uri: uri.to_owned(),
                    error,
                }
                .into()
            })
    }
}

fn decode<T: for<'de> serde::Deserialize<'de>>(value: &Value, uri: &str) -> Result<T, ApiError> {
    T::deserialize(value).map_err(|error| ApiError::Decode {
        uri: uri.to_owned(),
        error,
    })
}

/// Compare the advertised app quotas (`n:w,n:w,…`) against the configured
/// ones, element-wise after sorting both by window length.
fn validate_app_rate_limits(
    configured: &[RateLimit],
    advertised_header: &str,
) -> Result<(), GatherError> {
    let mut advertised: Vec<(u32, u32)> = Vec::new();
    for pair in advertised_header.split(',') {
        let (count, window) = pair.split_once(':').ok_or_else(|| {
            GatherError::RatelimitMismatch(format!(
                "malformed X-App-Rate-Limit header: {advertised_header}"
            ))
        })?;
        let count: u32 = count.trim().parse().map_err(|_| {
            GatherError::RatelimitMismatch(format!(
                "malformed X-App-Rate-Limit header: {advertised_header}"
            ))
        })?;
        let window: u32 = window.trim().parse().map_err(|_| {
            GatherError::RatelimitMismatch(format!(
                "malformed X-App-Rate-Limit header: {advertised_header}"
            ))
        })?;
        advertised.push((count, window));
    }
    advertised.sort_by_key(|(_, window)| *window);

    let mut expected: Vec<&RateLimit> = configured.iter().collect();
    expected.sort_by_key(|limit| limit.window_seconds);

    if expected.len() != advertised.len() {
        return Err(GatherError::RatelimitMismatch(format!(
            "number of app rate limits differs: configured {}, advertised {advertised_header}",
            expected.len()
        )));
    }
    for (limit, (count, window)) in expected.iter().zip(advertised.iter()) {
        if limit.window_seconds != *window {
            return Err(GatherError::RatelimitMismatch(format!(
                "interval mismatch: configured {}s, advertised {advertised_header}",
                limit.window_seconds
            )));
        }
        if limit.max_requests != *count {
            return Err(GatherError::RatelimitMismatch(format!(
                "max-requests mismatch: configured {} per {}s, advertised {advertised_header}",
                limit.max_requests, limit.window_seconds
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Vec<RateLimit> {
        vec![
            RateLimit { max_requests: 10, window_seconds: 1 },
            RateLimit { max_requests: 100, window_seconds: 10 },
            RateLimit { max_requests: 6000, window_seconds: 600 },
        ]
    }

    #[test]
    fn matching_limits_pass() {
        validate_app_rate_limits(&configured(), "10:1,100:10,6000:600").unwrap();
    }

    #[test]
    fn advertised_order_does_not_matter() {
        validate_app_rate_limits(&configured(), "6000:600,10:1,100:10").unwrap();
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let err = validate_app_rate_limits(&configured(), "10:1,100:10").unwrap_err();
        assert!(matches!(err, GatherError::RatelimitMismatch(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn window_mismatch_is_fatal() {
        let err = validate_app_rate_limits(&configured(), "10:1,100:10,6000:3600").unwrap_err();
        assert!(matches!(err, GatherError::RatelimitMismatch(_)));
    }

    #[test]
    fn count_mismatch_is_fatal() {
        let err = validate_app_rate_limits(&configured(), "10:1,120:10,6000:600").unwrap_err();
        assert!(matches!(err, GatherError::RatelimitMismatch(_)));
    }

    #[test]
    fn malformed_header_is_fatal() {
        let err = validate_app_rate_limits(&configured(), "banana").unwrap_err();
        assert!(matches!(err, GatherError::RatelimitMismatch(_)));
    }
}

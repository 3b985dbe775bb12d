//! Rate-limit configuration carried by the API client.
//!
//! App-wide quotas come from the environment (the vendor prints them when
//! issuing a key); method-level quotas are compiled in, keyed by rate-limit
//! class and, for the per-region classes, by region.

use std::collections::HashMap;
use std::str::FromStr;

use crate::endpoints;
use crate::error::GatherError;

/// One quota: at most `max_requests` within any `window_seconds` span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_seconds: u32,
}

/// App-wide quotas as configured via `RIOT_APP_RATE_LIMITS_JSON`,
/// e.g. `[[10, 1], [100, 10]]`.
#[derive(Debug, Clone)]
pub struct AppRateLimits(pub Vec<RateLimit>);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseAppRateLimitsError(pub String);

impl FromStr for AppRateLimits {
    type Err = ParseAppRateLimitsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pairs: Vec<(u32, u32)> =
            serde_json::from_str(s).map_err(|e| ParseAppRateLimitsError(e.to_string()))?;
        if pairs.is_empty() {
            return Err(ParseAppRateLimitsError("no app rate limits given".to_string()));
        }
        Ok(AppRateLimits(
            pairs
                .into_iter()
                .map(|(max_requests, window_seconds)| RateLimit {
                    max_requests,
                    window_seconds,
                })
                .collect(),
        ))
    }
}

enum MethodLimit {
    Flat(Vec<RateLimit>),
    PerRegion(HashMap<&'static str, Vec<RateLimit>>),
}

/// Method-level quotas per rate-limit class, some of them region-scoped.
pub struct MethodRateLimits {
    methods: HashMap<&'static str, MethodLimit>,
}

impl MethodRateLimits {
    pub fn get_rate_limits(&self, method: &str, region: &str) -> Result<&[RateLimit], GatherError> {
        match self.methods.get(method) {
            None => Err(GatherError::Config(format!("non-configured method {method}"))),
            Some(MethodLimit::Flat(limits)) => Ok(limits),
            Some(MethodLimit::PerRegion(by_region)) => {
                by_region.get(region).map(Vec::as_slice).ok_or_else(|| {
                    GatherError::Config(format!(
                        "non-configured region {region} for method {method}"
                    ))
                })
            }
        }
    }

    /// The quota table the vendor currently enforces for development keys.
    pub fn compiled() -> Self {
        fn one(max_requests: u32, window_seconds: u32) -> Vec<RateLimit> {
            vec![RateLimit {
                max_requests,
                window_seconds,
            }]
        }

        let summoner_by_name = HashMap::from([
            ("EUW", one(2000, 60)),
            ("KR", one(2000, 60)),
            ("NA", one(2000, 60)),
            ("EUNE", one(1600, 60)),
            ("BR", one(1300, 60)),
            ("TR", one(1300, 60)),
            ("LAN", one(1000, 60)),
            ("LAS", one(1000, 60)),
            ("JP", one(800, 60)),
            ("OCE", one(800, 60)),
            ("RU", one(600, 60)),
        ]);
        let tiers = HashMap::from([
            ("EUW", one(300, 60)),
            ("NA", one(270, 60)),
            ("EUNE", one(165, 60)),
            ("BR", one(90, 60)),
            ("KR", one(90, 60)),
            ("LAN", one(80, 60)),
            ("LAS", one(80, 60)),
            ("TR", one(60, 60)),
            ("OCE", one(55, 60)),
            ("JP", one(35, 60)),
            ("RU", one(35, 60)),
        ]);

        let methods = HashMap::from([
            (
                endpoints::METHOD_SUMMONER_BY_NAME,
                MethodLimit::PerRegion(summoner_by_name),
            ),
            (endpoints::METHOD_TIERS, MethodLimit::PerRegion(tiers)),
            (endpoints::METHOD_MATCHLIST, MethodLimit::Flat(one(1000, 10))),
            (
                endpoints::METHOD_MATCH_AND_TIMELINE,
                MethodLimit::Flat(one(500, 10)),
            ),
            (endpoints::METHOD_OTHER, MethodLimit::Flat(one(20000, 10))),
        ]);

        MethodRateLimits { methods }
    }
}

/// A quota scoped to the request it applies to, ready for the ledger.
/// App quotas carry no method; method quotas carry their class key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedQuota {
    pub limit: RateLimit,
    pub region: String,
    pub method: Option<String>,
}

/// API key plus the quotas attached to it.
pub struct ApiKeyConfig {
    pub key: String,
    pub app_limits: Vec<RateLimit>,
    pub method_limits: MethodRateLimits,
}

impl ApiKeyConfig {
    pub fn new(key: String, app_limits: AppRateLimits) -> Self {
        Self {
            key,
            app_limits: app_limits.0,
            method_limits: MethodRateLimits::compiled(),
        }
    }

    /// All quotas that gate one request: every app quota plus the method
    /// quotas for this class and region.
    pub fn applied_quotas(
        &self,
        region: &str,
        method: &str,
    ) -> Result<Vec<AppliedQuota>, GatherError> {
        let mut applied: Vec<AppliedQuota> = self
            .app_limits
            .iter()
            .map(|limit| AppliedQuota {
                limit: *limit,
                region: region.to_owned(),
                method: None,
            })
            .collect();
        for limit in self.method_limits.get_rate_limits(method, region)? {
            applied.push(AppliedQuota {
                limit: *limit,
                region: region.to_owned(),
                method: Some(method.to_owned()),
            });
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_app_limits_json() {
        let limits: AppRateLimits = "[[10, 1], [100, 10]]".parse().unwrap();
        assert_eq!(
            limits.0,
            vec![
                RateLimit { max_requests: 10, window_seconds: 1 },
                RateLimit { max_requests: 100, window_seconds: 10 },
            ]
        );
        assert!("not json".parse::<AppRateLimits>().is_err());
        assert!("[]".parse::<AppRateLimits>().is_err());
    }

    #[test]
    fn region_scoped_method_lookup() {
        let methods = MethodRateLimits::compiled();
        let limits = methods
            .get_rate_limits(endpoints::METHOD_TIERS, "EUW")
            .unwrap();
        assert_eq!(limits, &[RateLimit { max_requests: 300, window_seconds: 60 }]);

        assert!(methods
            .get_rate_limits(endpoints::METHOD_TIERS, "PBE")
            .is_err());
        assert!(methods.get_rate_limits("no-such-method", "EUW").is_err());
    }

    #[test]
    fn applied_quotas_combine_app_and_method() {
        let config = ApiKeyConfig::new(
            "RGAPI-test".to_string(),
            "[[10, 1], [100, 10]]".parse().unwrap(),
        );
        let applied = config
            .applied_quotas("EUW", endpoints::METHOD_MATCHLIST)
            .unwrap();
        assert_eq!(applied.len(), 3);
        assert!(applied[0].method.is_none());
        assert!(applied[1].method.is_none());
        assert_eq!(
            applied[2].method.as_deref(),
            Some(endpoints::METHOD_MATCHLIST)
        );
        assert!(applied.iter().all(|q| q.region == "EUW"));
    }
}

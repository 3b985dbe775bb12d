use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

/// Enumeration of failures a single upstream request can end in.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error while calling the vendor api: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP error {status} from {uri}")]
    Status {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
        uri: String,
    },
    #[error("could not decode response body from {uri}: {error}")]
    Decode {
        uri: String,
        error: serde_json::Error,
    },
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `X-Rate-Limit-Type` header of a 429, if any.
    pub fn rate_limit_type(&self) -> Option<&str> {
        match self {
            ApiError::Status { headers, .. } => headers
                .get("X-Rate-Limit-Type")
                .and_then(|v| v.to_str().ok()),
            _ => None,
        }
    }

    /// The `Retry-After` header in seconds, if present and parseable.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ApiError::Status { headers, .. } => headers
                .get(http::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok()),
            _ => None,
        }
    }
}

/// Enumeration of errors of the gathering process as a whole.
///
/// Only two of these abort a run: `Config`/`RatelimitMismatch` (the process
/// is wrongly configured) and `ApplicationRateLimit` (our ledger admitted a
/// request the vendor counted as over-quota, so every further request would
/// dig the hole deeper). Everything else is scoped to one target or match.
#[derive(Error, Debug)]
pub enum GatherError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("configured rate limits disagree with the vendor: {0}")]
    RatelimitMismatch(String),
    #[error("received a {kind} 429, local quota accounting must be wrong")]
    ApplicationRateLimit { kind: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("match {match_id} is already being observed by another process")]
    MatchTaken { match_id: i64 },
    #[error("no static game data stored for version {semver}")]
    MissingStaticData { semver: String },
}

impl GatherError {
    /// True when the process must terminate rather than drop a target.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatherError::Config(_)
                | GatherError::RatelimitMismatch(_)
                | GatherError::ApplicationRateLimit { .. }
        )
    }
}

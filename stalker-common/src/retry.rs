//! The retry envelope every vendor call runs inside.
//!
//! The envelope owns the error interpretation the call sites used to
//! repeat: 404 depends on what absence means to the caller, a 429 is
//! either the service being crowded (wait it out, uncounted) or proof our
//! ledger accounting is wrong (fatal), and anything else gets a bounded
//! number of short-backoff retries.

use std::future::Future;
use std::time::Duration;

use http::StatusCode;
use tracing::{error, warn};

use crate::error::{ApiError, GatherError};

/// Backoff when the vendor returns a 429 with no rate-limit-type header.
const SERVICE_BACKOFF: Duration = Duration::from_secs(5);
/// Backoff between counted transient retries.
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(2);
/// Poll cadence while a match result is not available yet.
pub const IN_PROGRESS_POLL: Duration = Duration::from_secs(300);

/// What a 404 means to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundAction {
    /// 404 is unexpected; bubble it up.
    Propagate,
    /// Absence is data (no active match, no matches in a time slice).
    ReturnNone,
    /// Absence means "not finished yet"; sleep and poll again, uncounted.
    WaitAndRetry(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryEnvelope {
    not_found: NotFoundAction,
    retries: u32,
}

impl RetryEnvelope {
    /// For data the caller cannot continue without; 404 propagates.
    pub fn required(retries: u32) -> Self {
        Self {
            not_found: NotFoundAction::Propagate,
            retries,
        }
    }

    /// For lookups where a 404 simply means there is nothing there.
    pub fn absence_is_empty(retries: u32) -> Self {
        Self {
            not_found: NotFoundAction::ReturnNone,
            retries,
        }
    }

    /// For polling a result that will exist once the match ends.
    pub fn poll_until_present(retries: u32) -> Self {
        Self {
            not_found: NotFoundAction::WaitAndRetry(IN_PROGRESS_POLL),
            retries,
        }
    }

    /// Run `op` until it succeeds, a 404 resolves per policy, a fatal
    /// error surfaces, or the transient budget runs out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<Option<T>, GatherError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatherError>>,
    {
        let attempts_permitted = 1 + self.retries;
        let mut transient_failures = 0;
        loop {
            let outcome = op().await;
            let api_error = match outcome {
                Ok(value) => return Ok(Some(value)),
                Err(GatherError::Api(api_error)) => api_error,
                // Config, ledger and database failures are not the
                // vendor's; no amount of retrying fixes them here.
                Err(other) => return Err(other),
            };

            match api_error.status() {
                Some(StatusCode::NOT_FOUND) => match self.not_found {
                    NotFoundAction::Propagate => return Err(api_error.into()),
                    NotFoundAction::ReturnNone => return Ok(None),
                    NotFoundAction::WaitAndRetry(pause) => {
                        tokio::time::sleep(pause).await;
                        continue;
                    }
                },
                Some(StatusCode::TOO_MANY_REQUESTS) => {
                    match api_error.rate_limit_type() {
                        // Crowded service with an unknown limit mechanism:
                        // back off without spending a retry.
                        None => tokio::time::sleep(SERVICE_BACKOFF).await,
                        Some("service") => {
                            let pause = api_error
                                .retry_after_seconds()
                                .map(Duration::from_secs)
                                .unwrap_or(SERVICE_BACKOFF);
                            tokio::time::sleep(pause).await;
                        }
                        Some(kind) => {
                            error!("received a {} 429, local quota accounting must be wrong", kind);
                            return Err(GatherError::ApplicationRateLimit {
                                kind: kind.to_owned(),
                            });
                        }
                    }
                    continue;
                }
                _ => {
                    transient_failures += 1;
                    if transient_failures >= attempts_permitted {
                        return Err(api_error.into());
                    }
                    warn!(
                        "vendor request failed ({}), retry {}/{} shortly",
                        api_error, transient_failures, self.retries
                    );
                    tokio::time::sleep(TRANSIENT_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status_error(status: StatusCode, headers: HeaderMap) -> GatherError {
        GatherError::Api(ApiError::Status {
            status,
            headers,
            body: String::new(),
            uri: "https://example.invalid".to_string(),
        })
    }

    fn limit_headers(kind: Option<&str>, retry_after: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(kind) = kind {
            headers.insert("X-Rate-Limit-Type", kind.parse().unwrap());
        }
        if let Some(seconds) = retry_after {
            headers.insert(http::header::RETRY_AFTER, seconds.parse().unwrap());
        }
        headers
    }

    #[tokio::test]
    async fn success_passes_through() {
        let result = RetryEnvelope::required(2)
            .run(|| async { Ok::<_, GatherError>(7) })
            .await
            .unwrap();
        assert_eq!(result, Some(7));
    }

    #[tokio::test]
    async fn not_found_can_mean_empty() {
        let result = RetryEnvelope::absence_is_empty(2)
            .run(|| async {
                Err::<u32, _>(status_error(StatusCode::NOT_FOUND, HeaderMap::new()))
            })
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn not_found_can_propagate() {
        let err = RetryEnvelope::required(2)
            .run(|| async {
                Err::<u32, _>(status_error(StatusCode::NOT_FOUND, HeaderMap::new()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatherError::Api(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_can_poll() {
        let calls = AtomicU32::new(0);
        let result = RetryEnvelope::poll_until_present(0)
            .run(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(status_error(StatusCode::NOT_FOUND, HeaderMap::new()))
                    } else {
                        Ok(9)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Some(9));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn application_429_is_fatal() {
        let err = RetryEnvelope::required(5)
            .run(|| async {
                Err::<u32, _>(status_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    limit_headers(Some("application"), None),
                ))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatherError::ApplicationRateLimit { ref kind } if kind == "application"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn method_429_is_fatal() {
        let err = RetryEnvelope::required(5)
            .run(|| async {
                Err::<u32, _>(status_error(
                    StatusCode::TOO_MANY_REQUESTS,
                    limit_headers(Some("method"), None),
                ))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatherError::ApplicationRateLimit { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn service_429_does_not_consume_retries() {
        let calls = AtomicU32::new(0);
        let result = RetryEnvelope::required(0)
            .run(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(status_error(
                            StatusCode::TOO_MANY_REQUESTS,
                            limit_headers(Some("service"), Some("30")),
                        ))
                    } else {
                        Ok(1)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn untyped_429_does_not_consume_retries() {
        let calls = AtomicU32::new(0);
        let result = RetryEnvelope::required(0)
            .run(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 1 {
                        Err(status_error(StatusCode::TOO_MANY_REQUESTS, HeaderMap::new()))
                    } else {
                        Ok(1)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_exhaust_the_budget() {
        let calls = AtomicU32::new(0);
        let err = RetryEnvelope::required(2)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<u32, _>(status_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        HeaderMap::new(),
                    ))
                }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatherError::Api(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = RetryEnvelope::required(2)
            .run(|| {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 1 {
                        Err(status_error(StatusCode::BAD_GATEWAY, HeaderMap::new()))
                    } else {
                        Ok(3)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Some(3));
    }

    #[tokio::test]
    async fn database_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryEnvelope::required(5)
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(GatherError::Database(sqlx::Error::PoolClosed)) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatherError::Database(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

//! # RequestLedger
//!
//! The shared record of outgoing requests, backed by a MySQL table every
//! gathering process appends to. `permit` is the single gate all vendor
//! requests pass through: it blocks until every applicable quota has
//! headroom, then durably records the request before it is sent.
//!
//! One table-wide write lock and one read over the widest window per
//! admission keeps the scheme simple; the request rate is bounded by the
//! quotas themselves, so the coarse lock is never the bottleneck.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, Executor};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::GatherError;
use crate::ratelimits::AppliedQuota;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS RequestHistory (
    id Integer NOT NULL AUTO_INCREMENT,
    at_time Datetime NOT NULL DEFAULT CURRENT_TIMESTAMP,
    api_key Varchar(255) NOT NULL,
    region_name Varchar(255) NOT NULL,
    method_name Varchar(255) NOT NULL,
    request_uri Varchar(510) NOT NULL,
    PRIMARY KEY (id)
)
"#;

/// A request already in the ledger, as seen at evaluation time.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecordedRequest {
    pub age_seconds: i64,
    pub region_name: String,
    pub method_name: String,
}

/// Usage of one quota at one admission decision, for the observability log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaUsage {
    pub region: String,
    pub method: Option<String>,
    pub window_seconds: u32,
    pub current_count: usize,
    pub max_requests: u32,
}

/// Outcome of evaluating the quotas against the recorded requests:
/// admit now, or wait until the oldest in-window request ages out of the
/// first exhausted quota.
#[derive(Debug)]
pub struct QuotaDecision {
    pub usages: Vec<QuotaUsage>,
    pub wait: Option<Duration>,
}

/// Evaluate every quota against the recorded requests. Evaluation stops at
/// the first exhausted quota, mirroring how the admission loop re-checks
/// everything after sleeping anyway.
pub fn evaluate(quotas: &[AppliedQuota], recent: &[RecordedRequest]) -> QuotaDecision {
    let mut usages = Vec::with_capacity(quotas.len());
    for quota in quotas {
        let window = i64::from(quota.limit.window_seconds);
        let in_window = |r: &&RecordedRequest| {
            r.age_seconds <= window
                && r.region_name == quota.region
                && quota
                    .method
                    .as_ref()
                    .map_or(true, |method| r.method_name == *method)
        };
        let count = recent.iter().filter(in_window).count();
        let oldest_age = recent
            .iter()
            .filter(in_window)
            .map(|r| r.age_seconds)
            .max();
        usages.push(QuotaUsage {
            region: quota.region.clone(),
            method: quota.method.clone(),
            window_seconds: quota.limit.window_seconds,
            current_count: count,
            max_requests: quota.limit.max_requests,
        });
        if count >= quota.limit.max_requests as usize {
            // Sleep until the oldest in-window entry leaves the window.
            let wait = (window - oldest_age.unwrap_or(0)).max(1) as u64;
            return QuotaDecision {
                usages,
                wait: Some(Duration::from_secs(wait)),
            };
        }
    }
    QuotaDecision { usages, wait: None }
}

pub struct RequestLedger {
    pool: MySqlPool,
    logfile: Option<PathBuf>,
}

impl RequestLedger {
    /// Connect to the ledger database and make sure the table exists.
    pub async fn connect(url: &str, logfile: Option<&Path>) -> Result<Self, GatherError> {
        let pool = MySqlPoolOptions::new().connect(url).await?;
        pool.execute(CREATE_TABLE).await?;
        Ok(Self {
            pool,
            logfile: logfile.map(Path::to_path_buf),
        })
    }

    /// Block until every supplied quota has headroom, then record the
    /// request. Returns only once the row is durably written; the caller
    /// may then issue the request it described.
    pub async fn permit(
        &self,
        api_key: &str,
        region: &str,
        method: &str,
        request_uri: &str,
        quotas: &[AppliedQuota],
    ) -> Result<(), GatherError> {
        let widest_window = quotas
            .iter()
            .map(|q| q.limit.window_seconds)
            .max()
            .ok_or_else(|| GatherError::Config("permit called with no quotas".to_string()))?;

        let mut conn = self.pool.acquire().await?;

        // Table lock serializes admission across every process sharing the
        // key. Held only while evaluating and inserting, never while
        // sleeping.
        conn.execute("LOCK TABLES RequestHistory WRITE").await?;
        let admitted = self
            .admit_when_headroom(&mut conn, region, method, widest_window, quotas)
            .await;
        match admitted {
            Ok(()) => {
                sqlx::query(
                    "INSERT INTO RequestHistory (api_key, region_name, method_name, request_uri) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(api_key)
                .bind(region)
                .bind(method)
                .bind(request_uri)
                .execute(&mut *conn)
                .await?;
                conn.execute("UNLOCK TABLES").await?;
                metrics::counter!("ledger_permits_total", &[("method", method.to_owned())])
                    .increment(1);
                Ok(())
            }
            Err(error) => {
                // The connection goes back to the pool; never hand it back
                // holding the table lock.
                if let Err(unlock_error) = conn.execute("UNLOCK TABLES").await {
                    warn!("failed to unlock the request history table: {}", unlock_error);
                }
                Err(error)
            }
        }
    }

    async fn admit_when_headroom(
        &self,
        conn: &mut sqlx::MySqlConnection,
        region: &str,
        method: &str,
        widest_window: u32,
        quotas: &[AppliedQuota],
    ) -> Result<(), GatherError> {
        loop {
            let recent: Vec<RecordedRequest> = sqlx::query_as(
                "SELECT TIMESTAMPDIFF(SECOND, at_time, NOW()) AS age_seconds, \
                        region_name, method_name \
                 FROM RequestHistory \
                 WHERE at_time > NOW() - INTERVAL ? SECOND \
                 ORDER BY at_time DESC",
            )
            .bind(i64::from(widest_window))
            .fetch_all(&mut *conn)
            .await?;

            let decision = evaluate(quotas, &recent);
            self.log_decision(&decision.usages).await;

            match decision.wait {
                None => return Ok(()),
                Some(wait) => {
                    metrics::counter!("ledger_waits_total", &[("method", method.to_owned())])
                        .increment(1);
                    info!(
                        region,
                        method,
                        wait_seconds = wait.as_secs(),
                        "quota exhausted, waiting for headroom"
                    );
                    (&mut *conn).execute("UNLOCK TABLES").await?;
                    tokio::time::sleep(wait).await;
                    // Re-check after reacquiring: several quotas may have
                    // been exhausted simultaneously.
                    conn.ping().await?;
                    (&mut *conn)
                        .execute("LOCK TABLES RequestHistory WRITE")
                        .await?;
                }
            }
        }
    }

    /// One CSV row per evaluated quota:
    /// `timestamp,region,method,window_seconds,current_count,max`.
    /// The monitoring surface tails this file.
    async fn log_decision(&self, usages: &[QuotaUsage]) {
        let Some(logfile) = &self.logfile else {
            for usage in usages {
                info!(
                    region = usage.region,
                    method = usage.method.as_deref().unwrap_or(""),
                    "[RATE-LIMIT][{}/{}, in {} second timeframe]",
                    usage.current_count,
                    usage.max_requests,
                    usage.window_seconds
                );
            }
            return;
        };

        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let mut rows = String::new();
        for usage in usages {
            rows.push_str(&format!(
                "{},{},{},{},{},{}\n",
                timestamp,
                usage.region,
                usage.method.as_deref().unwrap_or(""),
                usage.window_seconds,
                usage.current_count,
                usage.max_requests
            ));
        }

        if let Some(parent) = logfile.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(error) = tokio::fs::create_dir_all(parent).await {
                    warn!("failed to create ratelimit logfile directory: {}", error);
                }
            }
        }
        let open = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(logfile)
            .await;
        match open {
            Ok(mut file) => {
                if let Err(error) = file.write_all(rows.as_bytes()).await {
                    warn!("failed to append to ratelimit logfile: {}", error);
                }
            }
            Err(error) => warn!("failed to open ratelimit logfile: {}", error),
        }
    }
}

use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use stalker_common::ratelimits::AppRateLimits;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "RIOT_API_KEY")]
    pub riot_api_key: String,

    #[envconfig(from = "RIOT_APP_RATE_LIMITS_JSON")]
    pub riot_app_rate_limits: AppRateLimits,

    #[envconfig(from = "REQUEST_TIMEOUT_MS", default = "10000")]
    pub request_timeout: EnvMsDuration,

    #[envconfig(nested = true)]
    pub ledger_db: LedgerDbConfig,

    #[envconfig(nested = true)]
    pub main_db: MainDbConfig,
}

#[derive(Envconfig, Clone)]
pub struct LedgerDbConfig {
    #[envconfig(from = "MYSQL_REQUESTHISTORY_USERNAME")]
    pub username: String,

    #[envconfig(from = "MYSQL_REQUESTHISTORY_PASSWORD")]
    pub password: String,

    #[envconfig(from = "MYSQL_REQUESTHISTORY_DBNAME")]
    pub dbname: String,

    #[envconfig(from = "MYSQL_REQUESTHISTORY_HOST", default = "localhost")]
    pub host: String,
}

impl LedgerDbConfig {
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}/{}",
            self.username, self.password, self.host, self.dbname
        )
    }
}

#[derive(Envconfig, Clone)]
pub struct MainDbConfig {
    #[envconfig(from = "DJ_PG_USERNAME")]
    pub username: String,

    #[envconfig(from = "DJ_PG_PASSWORD")]
    pub password: String,

    #[envconfig(from = "DJ_PG_DBNAME")]
    pub dbname: String,

    #[envconfig(from = "DJ_PG_HOST", default = "localhost")]
    pub host: String,
}

impl MainDbConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}/{}",
            self.username, self.password, self.host, self.dbname
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

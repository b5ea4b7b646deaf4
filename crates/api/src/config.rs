//! Process configuration: `.env` (when present) overlaid by the environment.

use anyhow::{Context, bail};
use chrono::Duration;

use habbot_observability::LoggingConfig;
use habbot_observability::config::{flag, number};

pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 7;

const DEV_SECRET_KEY: &str = "habbot-dev-secret";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub secret_key: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = get("APP_ENVIRONMENT").unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        let secret_key = match get("SECRET_KEY") {
            Some(secret) if environment == "production" && secret == DEV_SECRET_KEY => {
                bail!("SECRET_KEY must not be the development default in production")
            }
            Some(secret) => secret,
            None if environment == "production" => bail!("SECRET_KEY must be set in production"),
            None => {
                tracing::warn!("SECRET_KEY not set; using insecure dev default");
                DEV_SECRET_KEY.to_string()
            }
        };

        let access_minutes: i64 = number(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", DEFAULT_ACCESS_TOKEN_MINUTES)?;
        let refresh_days: i64 = number(&get, "REFRESH_TOKEN_EXPIRE_DAYS", DEFAULT_REFRESH_TOKEN_DAYS)?;
        if access_minutes <= 0 || refresh_days <= 0 {
            bail!("token lifetimes must be positive");
        }

        Ok(Self {
            host: get("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: number(&get, "APP_PORT", DEFAULT_PORT)?,
            secret_key,
            access_token_ttl: Duration::minutes(access_minutes),
            refresh_token_ttl: Duration::days(refresh_days),
            use_persistent_stores: flag(&get, "USE_PERSISTENT_STORES", false)?,
            database_url: get("DATABASE_URL"),
            logging: LoggingConfig::from_lookup(&get).context("invalid logging configuration")?,
            environment,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

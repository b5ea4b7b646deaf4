//! Service layer: one struct per domain area, each call tracked through the
//! structured logger.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use habbot_auth::Hs256Jwt;
use habbot_infra::{EmployeeStore, InMemoryEmployeeStore, InMemoryUserStore, UserStore};
use habbot_observability::{Logger, LoggerFactory, LoggerOptions};

use crate::config::AppConfig;

mod auth;
mod employees;

pub use auth::AuthService;
pub use employees::EmployeeService;

pub struct AppServices {
    pub auth: AuthService,
    pub employees: EmployeeService,
    pub environment: String,
    pub started_at: Instant,
    logs: Arc<LoggerFactory>,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        users: Arc<dyn UserStore>,
        employees: Arc<dyn EmployeeStore>,
        logs: Arc<LoggerFactory>,
    ) -> Self {
        let jwt = Arc::new(Hs256Jwt::new(config.secret_key.as_bytes()));
        Self {
            auth: AuthService::new(users, jwt, config.access_token_ttl, config.refresh_token_ttl, &logs),
            employees: EmployeeService::new(employees, &logs),
            environment: config.environment.clone(),
            started_at: Instant::now(),
            logs,
        }
    }

    /// In-memory stores; used in development and tests.
    pub fn in_memory(config: &AppConfig, logs: Arc<LoggerFactory>) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryEmployeeStore::new()),
            logs,
        )
    }

    pub fn logger(&self, name: &str) -> Logger {
        self.logs.get_logger(name, LoggerOptions::default())
    }

    pub fn logs(&self) -> &Arc<LoggerFactory> {
        &self.logs
    }
}

/// Wire stores and loggers from configuration.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let logs = Arc::new(LoggerFactory::from_config(&config.logging).context("failed to set up logging")?);

    if !config.use_persistent_stores {
        return Ok(AppServices::in_memory(config, logs));
    }
    let (users, employees) = persistent_stores(config).await?;
    Ok(AppServices::new(config, users, employees, logs))
}

#[cfg(feature = "postgres")]
async fn persistent_stores(config: &AppConfig) -> anyhow::Result<(Arc<dyn UserStore>, Arc<dyn EmployeeStore>)> {
    use habbot_infra::{PostgresEmployeeStore, PostgresUserStore};

    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required when USE_PERSISTENT_STORES is set")?;
    let pool = sqlx::PgPool::connect(url).await.context("failed to connect to postgres")?;
    habbot_infra::migrate(&pool).await?;

    Ok((
        Arc::new(PostgresUserStore::new(pool.clone())),
        Arc::new(PostgresEmployeeStore::new(pool)),
    ))
}

#[cfg(not(feature = "postgres"))]
async fn persistent_stores(_config: &AppConfig) -> anyhow::Result<(Arc<dyn UserStore>, Arc<dyn EmployeeStore>)> {
    anyhow::bail!("USE_PERSISTENT_STORES requires building with the `postgres` feature")
}

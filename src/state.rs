use std::sync::Arc;

use anyhow::Context;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{password::Hasher, repo::PgUserStore, services::AccountService};
use crate::config::AppConfig;
use crate::mailer;

/// Schema for the credential store. The `lower(email)` unique index and the
/// reset pair check live here, so startup fails if they cannot be applied.
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        MIGRATOR.run(&db).await.context("run migrations")?;

        let hasher = Hasher::new(config.hasher).context("hasher parameters")?;
        let mailer = mailer::from_config(&config.mail, &config.base_url)?;
        let accounts = AccountService::new(Arc::new(PgUserStore::new(db)), mailer, hasher)
            .with_reset_ttl(config.reset_ttl);

        Ok(Self::from_service(accounts))
    }

    pub fn from_service(accounts: AccountService) -> Self {
        Self {
            accounts: Arc::new(accounts),
        }
    }

    /// In-memory store, log mailer and fast hashing. No database needed.
    #[cfg(test)]
    pub fn fake() -> anyhow::Result<Self> {
        use crate::auth::{memory::MemoryUserStore, password::HasherConfig};
        use crate::mailer::{Links, LogMailer};

        let hasher = Hasher::new(HasherConfig::fast())?;
        let accounts = AccountService::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(LogMailer::new(Links::new("http://localhost:8080"))),
            hasher,
        );
        Ok(Self::from_service(accounts))
    }
}

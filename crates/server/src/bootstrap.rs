use std::sync::Arc;

use storytime_bot::{AllowList, Authorizer, Dispatcher, TelegramClient, TelegramError};
use storytime_core::clock::SystemClock;
use storytime_core::config::{AppConfig, ConfigError, LoadOptions};
use storytime_db::{
    connect_with_config, migrations, InMemoryLibraryRepository, LibraryRepository,
    SqlLibraryRepository,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub repo: Arc<dyn LibraryRepository>,
    pub client: Arc<TelegramClient>,
    pub dispatcher: Arc<Dispatcher>,
    /// Shared by the chat dispatcher and the Mini App API.
    pub authorizer: Arc<dyn Authorizer>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("telegram client setup failed: {0}")]
    Telegram(#[from] TelegramError),
}

#[cfg(test)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        mode = config.telegram.mode.as_str(),
        "starting application bootstrap"
    );

    let repo = open_repository(&config).await?;
    let client = Arc::new(TelegramClient::new(&config.telegram)?);
    let authorizer: Arc<dyn Authorizer> =
        Arc::new(AllowList::new(config.access.allowed_user_ids.iter().copied()));
    let dispatcher = Dispatcher::new(Arc::clone(&repo), client.clone(), Arc::clone(&authorizer))
        .with_clock(Arc::new(SystemClock))
        .with_denial_notice(config.access.notify_denied);

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        allowed_users = config.access.allowed_user_ids.len(),
        "dispatcher ready"
    );

    Ok(Application { config, repo, client, dispatcher: Arc::new(dispatcher), authorizer })
}

async fn open_repository(config: &AppConfig) -> Result<Arc<dyn LibraryRepository>, BootstrapError> {
    if config.database.in_memory {
        info!(
            event_name = "system.bootstrap.in_memory_store",
            correlation_id = "bootstrap",
            "using seeded in-memory store; data is lost on restart"
        );
        return Ok(Arc::new(InMemoryLibraryRepository::with_default_family()));
    }

    let pool = connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(Arc::new(SqlLibraryRepository::new(pool)))
}

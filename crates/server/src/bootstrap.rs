use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use travo_core::config::{AppConfig, ConfigError, LoadOptions};
use travo_core::hierarchy::ApprovalHierarchy;
use travo_core::{Clock, SystemClock};
use travo_db::repositories::{
    SqlNotificationRepository, SqlTravelRequestRepository, SqlUserRepository,
};
use travo_db::{connect, migrations, DbPool};
use travo_notify::DbNotificationGateway;
use travo_workflow::{ExpirySweeper, NotificationDispatcher};

/// What the server process actually runs: the pool it owns and the sweeper
/// it schedules. Interactive operations go through the CLI and the workflow
/// crate, not this binary.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub sweeper: Arc<ExpirySweeper>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap_start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "migrations_applied", "database migrations applied");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let requests = Arc::new(SqlTravelRequestRepository::new(db_pool.clone()));
    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let notifications = Arc::new(SqlNotificationRepository::new(db_pool.clone()));
    let gateway = Arc::new(DbNotificationGateway::new(notifications, clock.clone()));
    let hierarchy = ApprovalHierarchy::new(config.hierarchy.clone());

    let sweeper = Arc::new(ExpirySweeper::new(
        requests,
        clock,
        Arc::new(NotificationDispatcher::new(gateway, users, hierarchy)),
    ));

    Ok(Application { config, db_pool, sweeper })
}

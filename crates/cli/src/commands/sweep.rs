use std::sync::Arc;

use crate::commands::CommandResult;
use travo_core::config::{AppConfig, LoadOptions};
use travo_core::hierarchy::ApprovalHierarchy;
use travo_core::SystemClock;
use travo_db::repositories::{
    SqlNotificationRepository, SqlTravelRequestRepository, SqlUserRepository,
};
use travo_db::{connect, migrations};
use travo_notify::DbNotificationGateway;
use travo_workflow::{ExpirySweeper, NotificationDispatcher};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let clock = Arc::new(SystemClock);
        let requests = Arc::new(SqlTravelRequestRepository::new(pool.clone()));
        let users = Arc::new(SqlUserRepository::new(pool.clone()));
        let notifications = Arc::new(SqlNotificationRepository::new(pool.clone()));
        let gateway = Arc::new(DbNotificationGateway::new(notifications, clock.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            gateway,
            users,
            ApprovalHierarchy::new(config.hierarchy.clone()),
        ));
        let sweeper = ExpirySweeper::new(requests, clock, dispatcher);

        let summary =
            sweeper.run_once().await.map_err(|error| ("sweep_execution", error.to_string(), 5u8));

        pool.close().await;
        summary
    });

    match result {
        Ok(summary) => CommandResult::success(
            "sweep",
            format!(
                "sweep completed: {} security codes expired, {} travel windows closed",
                summary.expired, summary.cleared
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}

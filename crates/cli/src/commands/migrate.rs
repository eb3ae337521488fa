use crate::commands::CommandResult;
use travo_core::config::{AppConfig, LoadOptions};
use travo_db::connect;
use travo_db::migrations::{self, AppliedMigration};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
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
                "migrate",
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
        let applied = migrations::run_pending_verbose(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<Vec<AppliedMigration>, (&'static str, String, u8)>(applied)
    });

    match result {
        Ok(applied) => CommandResult::success("migrate", render_summary(&applied)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

fn render_summary(applied: &[AppliedMigration]) -> String {
    if applied.is_empty() {
        return "schema is up to date; no pending migrations".to_string();
    }

    let lines: Vec<String> = applied
        .iter()
        .map(|migration| format!("  - {:04} {}", migration.version, migration.description))
        .collect();
    format!("applied {} migration(s):\n{}", applied.len(), lines.join("\n"))
}

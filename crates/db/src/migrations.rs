use std::collections::HashSet;

use sqlx::migrate::{MigrateError, MigrationType, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// One migration applied during a `run_pending_verbose` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub description: String,
}

/// Like `run_pending`, but reports which migrations this invocation actually
/// applied so operator tooling can echo them back.
pub async fn run_pending_verbose(pool: &DbPool) -> Result<Vec<AppliedMigration>, MigrateError> {
    let before = applied_versions(pool).await?;
    MIGRATOR.run(pool).await?;

    Ok(MIGRATOR
        .iter()
        .filter(|migration| {
            migration.migration_type != MigrationType::ReversibleDown
                && !before.contains(&migration.version)
        })
        .map(|migration| AppliedMigration {
            version: migration.version,
            description: migration.description.to_string(),
        })
        .collect())
}

async fn applied_versions(pool: &DbPool) -> Result<HashSet<i64>, sqlx::Error> {
    let ledger_present: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if ledger_present == 0 {
        return Ok(HashSet::new());
    }

    let versions: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations").fetch_all(pool).await?;
    Ok(versions.into_iter().collect())
}

use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Contract for the seeded users: one per approval-chain role, all in one
/// school district so the demo chain routes end to end.
const SEED_USERS: &[UserSeedContract] = &[
    UserSeedContract { user_id: "seed-user-teacher", username: "mdelacruz", role: "Teacher" },
    UserSeedContract { user_id: "seed-user-principal", username: "jsantos", role: "Principal" },
    UserSeedContract { user_id: "seed-user-psds", username: "rlim", role: "PSDS" },
    UserSeedContract { user_id: "seed-user-asds", username: "creyes", role: "ASDS" },
    UserSeedContract { user_id: "seed-user-sds", username: "agarcia", role: "SDS" },
    UserSeedContract { user_id: "seed-user-ao", username: "btan", role: "AO Admin Officer" },
    UserSeedContract { user_id: "seed-user-admin", username: "admin", role: "Admin" },
];

const SEED_REQUESTS: &[RequestSeedContract] = &[
    RequestSeedContract {
        request_id: "seed-request-pending",
        user_id: "seed-user-teacher",
        state: "pending_validation",
        status: "pending",
        validation_status: "pending",
        has_security_code: false,
        description: "Teacher request awaiting principal validation",
    },
    RequestSeedContract {
        request_id: "seed-request-accepted",
        user_id: "seed-user-principal",
        state: "accepted",
        status: "accepted",
        validation_status: "validated",
        has_security_code: true,
        description: "Approved principal request carrying a live security code",
    },
];

const SEED_NOTIFICATION_IDS: &[&str] =
    &["seed-notification-submitted", "seed-notification-approved"];

/// Deterministic demo dataset for the travel-authorization workflow.
///
/// Seeds the full approval chain plus one request on each side of approval,
/// so a fresh install can exercise validation, code lookup, and the expiry
/// sweep without manual data entry.
pub struct SeedDataset;

impl SeedDataset {
    /// SQL fixture content for the demo seed data.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into the database.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users_seeded: SEED_USERS.len(),
            requests_seeded: SEED_REQUESTS
                .iter()
                .map(|request| RequestSeedInfo {
                    request_id: request.request_id,
                    description: request.description,
                })
                .collect(),
        })
    }

    /// Verify that the seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SEED_USERS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1 AND username = ?2 AND role = ?3)",
            )
            .bind(user.user_id)
            .bind(user.username)
            .bind(user.role)
            .fetch_one(pool)
            .await?;
            checks.push((user.user_id, exists == 1));
        }

        for request in SEED_REQUESTS {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM travel_requests
                 WHERE id = ?1 AND user_id = ?2 AND state = ?3
                   AND status = ?4 AND validation_status = ?5)",
            )
            .bind(request.request_id)
            .bind(request.user_id)
            .bind(request.state)
            .bind(request.status)
            .bind(request.validation_status)
            .fetch_one(pool)
            .await?;
            checks.push((request.request_id, exists == 1));

            let code_ok: i64 = if request.has_security_code {
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM travel_requests
                     WHERE id = ?1 AND security_code IS NOT NULL AND security_code != '')",
                )
                .bind(request.request_id)
                .fetch_one(pool)
                .await?
            } else {
                sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM travel_requests
                     WHERE id = ?1 AND security_code IS NULL)",
                )
                .bind(request.request_id)
                .fetch_one(pool)
                .await?
            };
            checks.push((request.code_label(), code_ok == 1));
        }

        let quoted_notifications = sql_array_from_ids(SEED_NOTIFICATION_IDS);
        let notification_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM notifications WHERE id IN {quoted_notifications}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("notifications", notification_count == SEED_NOTIFICATION_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Clean up seeded fixtures from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_notifications = sql_array_from_ids(SEED_NOTIFICATION_IDS);
        let quoted_requests = sql_array_from_ids(
            &SEED_REQUESTS.iter().map(|request| request.request_id).collect::<Vec<_>>(),
        );
        let quoted_users =
            sql_array_from_ids(&SEED_USERS.iter().map(|user| user.user_id).collect::<Vec<_>>());

        sqlx::query(&format!("DELETE FROM notifications WHERE id IN {quoted_notifications}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM travel_requests WHERE id IN {quoted_requests}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM users WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Copy)]
struct UserSeedContract {
    user_id: &'static str,
    username: &'static str,
    role: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct RequestSeedContract {
    request_id: &'static str,
    user_id: &'static str,
    state: &'static str,
    status: &'static str,
    validation_status: &'static str,
    has_security_code: bool,
    description: &'static str,
}

impl RequestSeedContract {
    fn code_label(&self) -> &'static str {
        match self.request_id {
            "seed-request-pending" => "seed-request-pending-code",
            _ => "seed-request-accepted-code",
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: usize,
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!SeedDataset::SQL.is_empty());
        assert!(SeedDataset::SQL.contains("seed-user-teacher"));
        assert!(SeedDataset::SQL.contains("seed-request-accepted"));
    }

    #[tokio::test]
    async fn load_then_verify_passes_every_check() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let seeded = SeedDataset::load(&pool).await.expect("load");
        assert_eq!(seeded.users_seeded, 7);
        assert_eq!(seeded.requests_seeded.len(), 2);

        let verification = SeedDataset::verify(&pool).await.expect("verify");
        assert!(
            verification.all_present,
            "failed checks: {:?}",
            verification
                .checks
                .iter()
                .filter(|(_, present)| !present)
                .map(|(label, _)| label)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        SeedDataset::load(&pool).await.expect("first load");
        SeedDataset::load(&pool).await.expect("second load");

        let verification = SeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present);
    }

    #[tokio::test]
    async fn clean_removes_all_seeded_rows() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        SeedDataset::load(&pool).await.expect("load");
        SeedDataset::clean(&pool).await.expect("clean");

        let verification = SeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(remaining, 0);
    }
}

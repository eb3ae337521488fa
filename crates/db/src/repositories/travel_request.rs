use chrono::{DateTime, Utc};
use sqlx::Row;

use travo_core::domain::travel_request::{RequestState, TravelRequest, TravelRequestId};

use super::user::decode_user_columns;
use super::{fmt_ts, parse_ts, RepositoryError, TravelRequestFilter, TravelRequestRepository};
use crate::DbPool;

pub struct SqlTravelRequestRepository {
    pool: DbPool,
}

impl SqlTravelRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Requests are always fetched joined to their requester so callers never see
/// a dangling `user_id`.
const SELECT_REQUEST: &str = "SELECT
        tr.id, tr.purpose, tr.start_date, tr.end_date, tr.departments, tr.state,
        tr.viewed, tr.remarks, tr.security_code, tr.code_expiration_date,
        tr.is_code_expired, tr.created_at,
        u.id AS user_id, u.username AS user_username, u.first_name AS user_first_name,
        u.last_name AS user_last_name, u.email AS user_email, u.school_id AS user_school_id,
        u.school_name AS user_school_name, u.district AS user_district,
        u.position AS user_position, u.original_position AS user_original_position,
        u.contact_no AS user_contact_no, u.employee_number AS user_employee_number,
        u.role AS user_role, u.created_at AS user_created_at
    FROM travel_requests tr
    JOIN users u ON u.id = tr.user_id";

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<TravelRequest, RepositoryError> {
    let get = |name: &str| -> Result<String, RepositoryError> {
        row.try_get::<String, _>(name).map_err(|err| RepositoryError::Decode(err.to_string()))
    };

    let state_str = get("state")?;
    let state: RequestState = state_str
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown request state `{state_str}`")))?;

    let departments_raw = get("departments")?;
    let departments = if departments_raw.is_empty() {
        Vec::new()
    } else {
        departments_raw.split(',').map(str::to_string).collect()
    };

    let viewed: i64 =
        row.try_get("viewed").map_err(|err| RepositoryError::Decode(err.to_string()))?;
    let is_code_expired: i64 =
        row.try_get("is_code_expired").map_err(|err| RepositoryError::Decode(err.to_string()))?;
    let remarks: Option<String> =
        row.try_get("remarks").map_err(|err| RepositoryError::Decode(err.to_string()))?;
    let security_code: Option<String> =
        row.try_get("security_code").map_err(|err| RepositoryError::Decode(err.to_string()))?;

    Ok(TravelRequest {
        id: TravelRequestId(get("id")?),
        purpose: get("purpose")?,
        start_date: parse_ts(&get("start_date")?, "start_date")?,
        end_date: parse_ts(&get("end_date")?, "end_date")?,
        departments,
        state,
        viewed: viewed != 0,
        remarks,
        security_code,
        code_expiration_date: parse_ts(&get("code_expiration_date")?, "code_expiration_date")?,
        is_code_expired: is_code_expired != 0,
        requester: decode_user_columns(row, "user_")?,
        created_at: parse_ts(&get("created_at")?, "created_at")?,
    })
}

#[async_trait::async_trait]
impl TravelRequestRepository for SqlTravelRequestRepository {
    async fn save(&self, request: TravelRequest) -> Result<(), RepositoryError> {
        // The status/validation_status columns are denormalized projections of
        // the state tag, kept so that filters can hit their indexes.
        sqlx::query(
            "INSERT INTO travel_requests (id, user_id, purpose, start_date, end_date,
                                          departments, state, status, validation_status, viewed,
                                          remarks, security_code, code_expiration_date,
                                          is_code_expired, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 purpose = excluded.purpose,
                 start_date = excluded.start_date,
                 end_date = excluded.end_date,
                 departments = excluded.departments,
                 state = excluded.state,
                 status = excluded.status,
                 validation_status = excluded.validation_status,
                 viewed = excluded.viewed,
                 remarks = excluded.remarks,
                 security_code = excluded.security_code,
                 code_expiration_date = excluded.code_expiration_date,
                 is_code_expired = excluded.is_code_expired",
        )
        .bind(&request.id.0)
        .bind(&request.requester.id.0)
        .bind(&request.purpose)
        .bind(fmt_ts(request.start_date))
        .bind(fmt_ts(request.end_date))
        .bind(request.departments.join(","))
        .bind(request.state.as_str())
        .bind(request.status().as_str())
        .bind(request.validation_status().as_str())
        .bind(request.viewed as i64)
        .bind(&request.remarks)
        .bind(&request.security_code)
        .bind(fmt_ts(request.code_expiration_date))
        .bind(request.is_code_expired as i64)
        .bind(fmt_ts(request.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TravelRequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_REQUEST} WHERE tr.id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_security_code(
        &self,
        code: &str,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "{SELECT_REQUEST} WHERE tr.security_code = ? ORDER BY tr.created_at ASC LIMIT 1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: TravelRequestFilter,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let mut sql = format!("{SELECT_REQUEST} WHERE 1 = 1");
        if filter.status.is_some() {
            sql.push_str(" AND tr.status = ?");
        }
        if filter.validation_status.is_some() {
            sql.push_str(" AND tr.validation_status = ?");
        }
        if filter.requester.is_some() {
            sql.push_str(" AND tr.user_id = ?");
        }
        if filter.requester_role.is_some() {
            sql.push_str(" AND u.role = ?");
        }
        if filter.requester_school_id.is_some() {
            sql.push_str(" AND u.school_id = ?");
        }
        if filter.requester_district.is_some() {
            sql.push_str(" AND u.district = ?");
        }
        if filter.created_after.is_some() {
            sql.push_str(" AND tr.created_at >= ?");
        }
        if filter.created_before.is_some() {
            sql.push_str(" AND tr.created_at <= ?");
        }
        sql.push_str(" ORDER BY tr.created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(validation_status) = filter.validation_status {
            query = query.bind(validation_status.as_str());
        }
        if let Some(requester) = &filter.requester {
            query = query.bind(&requester.0);
        }
        if let Some(role) = filter.requester_role {
            query = query.bind(role.as_str());
        }
        if let Some(school_id) = &filter.requester_school_id {
            query = query.bind(school_id);
        }
        if let Some(district) = &filter.requester_district {
            query = query.bind(district);
        }
        if let Some(created_after) = filter.created_after {
            query = query.bind(fmt_ts(created_after));
        }
        if let Some(created_before) = filter.created_before {
            query = query.bind(fmt_ts(created_before));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect()
    }

    async fn list_code_expiry_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        // Also picks up rows a previous sweep flagged but failed to clear, so
        // a crashed run heals on the next pass.
        let rows = sqlx::query(&format!(
            "{SELECT_REQUEST}
             WHERE tr.security_code IS NOT NULL AND tr.security_code != ''
               AND (tr.is_code_expired = 1 OR tr.code_expiration_date < ?)
             ORDER BY tr.created_at ASC"
        ))
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    async fn list_travel_window_lapsed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_REQUEST}
             WHERE tr.security_code IS NOT NULL AND tr.security_code != ''
               AND tr.end_date < ?
             ORDER BY tr.created_at ASC"
        ))
        .bind(fmt_ts(now))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    async fn remove(&self, id: &TravelRequestId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM travel_requests WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use travo_core::domain::travel_request::{
        CreateTravelRequest, RequestAction, Status, TravelRequest, TravelRequestId,
        ValidationStatus,
    };
    use travo_core::domain::user::{Role, User, UserId};

    use super::SqlTravelRequestRepository;
    use crate::repositories::{
        SqlUserRepository, TravelRequestFilter, TravelRequestRepository, UserRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn teacher(id: &str, school_id: &str, district: &str) -> User {
        User {
            id: UserId(id.to_string()),
            username: format!("user-{id}"),
            first_name: "Maria".to_string(),
            last_name: "Dela Cruz".to_string(),
            email: format!("{id}@district.example"),
            school_id: school_id.to_string(),
            school_name: "San Isidro Elementary".to_string(),
            district: district.to_string(),
            position: "Teacher III".to_string(),
            original_position: None,
            contact_no: "09170000001".to_string(),
            employee_number: format!("EMP-{id}"),
            role: Role::Teacher,
            created_at: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        }
    }

    fn submitted(requester: User, created_at: chrono::DateTime<chrono::Utc>) -> TravelRequest {
        let mut request = TravelRequest::new(
            CreateTravelRequest {
                purpose: "Division training".to_string(),
                start_date: created_at + Duration::days(7),
                end_date: created_at + Duration::days(9),
                departments: vec![
                    "Curriculum Implementation Division".to_string(),
                    "School Governance and Operations Division".to_string(),
                ],
            },
            requester,
            created_at,
        );
        request.transition(RequestAction::Submit).expect("submit");
        request
    }

    async fn seed_request(pool: &DbPool, request: &TravelRequest) {
        SqlUserRepository::new(pool.clone())
            .save(request.requester.clone())
            .await
            .expect("save user");
        SqlTravelRequestRepository::new(pool.clone())
            .save(request.clone())
            .await
            .expect("save request");
    }

    #[tokio::test]
    async fn save_and_find_round_trips_with_requester() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let request = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        seed_request(&pool, &request).await;

        let found = repo.find_by_id(&request.id).await.expect("find").expect("row exists");

        assert_eq!(found, request);
        assert_eq!(found.requester.role, Role::Teacher);
        assert_eq!(found.departments.len(), 2);
    }

    #[tokio::test]
    async fn save_upserts_state_and_projections() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let mut request = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        seed_request(&pool, &request).await;

        request.transition(RequestAction::Validate).expect("validate");
        request.assign_code("MD12345".to_string(), request.start_date).expect("assign");
        repo.save(request.clone()).await.expect("upsert");

        let found = repo.find_by_id(&request.id).await.expect("find").expect("row exists");
        assert_eq!(found.status(), Status::Accepted);
        assert_eq!(found.validation_status(), ValidationStatus::Validated);
        assert_eq!(found.security_code.as_deref(), Some("MD12345"));
    }

    #[tokio::test]
    async fn list_filters_by_status_school_and_district() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();

        let in_school = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        let other_school =
            submitted(teacher("u-2", "SCH-02", "District I"), created_at + Duration::hours(1));
        let mut rejected =
            submitted(teacher("u-3", "SCH-01", "District I"), created_at + Duration::hours(2));
        rejected.transition(RequestAction::Reject).expect("reject");
        seed_request(&pool, &in_school).await;
        seed_request(&pool, &other_school).await;
        seed_request(&pool, &rejected).await;

        let filter = TravelRequestFilter {
            status: Some(Status::Pending),
            requester_role: Some(Role::Teacher),
            requester_school_id: Some("SCH-01".to_string()),
            ..TravelRequestFilter::default()
        };
        let found = repo.list(filter).await.expect("list");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, in_school.id);

        let by_district = repo
            .list(TravelRequestFilter {
                requester_district: Some("District I".to_string()),
                ..TravelRequestFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(by_district.len(), 3);
        // Newest first.
        assert_eq!(by_district[0].id, rejected.id);
    }

    #[tokio::test]
    async fn find_by_security_code_prefers_the_oldest_match() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();

        let mut older = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        older.transition(RequestAction::Validate).expect("validate");
        older.assign_code("MD12345".to_string(), older.start_date).expect("assign");
        let mut newer =
            submitted(teacher("u-2", "SCH-01", "District I"), created_at + Duration::hours(1));
        newer.transition(RequestAction::Validate).expect("validate");
        newer.assign_code("MD12345".to_string(), newer.start_date).expect("assign");
        seed_request(&pool, &older).await;
        seed_request(&pool, &newer).await;

        let found =
            repo.find_by_security_code("MD12345").await.expect("find").expect("code resolves");
        assert_eq!(found.id, older.id);

        let missing = repo.find_by_security_code("XX00000").await.expect("find");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn expiry_candidates_include_lapsed_and_previously_flagged_rows() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let now = created_at + Duration::days(30);

        let mut lapsed = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        lapsed.transition(RequestAction::Validate).expect("validate");
        lapsed.assign_code("MD11111".to_string(), created_at + Duration::days(10)).expect("assign");

        let mut flagged =
            submitted(teacher("u-2", "SCH-01", "District I"), created_at + Duration::hours(1));
        flagged.transition(RequestAction::Validate).expect("validate");
        flagged.assign_code("MD22222".to_string(), now + Duration::days(10)).expect("assign");
        // Simulate a sweep that flagged the row but crashed before clearing it.
        flagged.is_code_expired = true;

        let mut current =
            submitted(teacher("u-3", "SCH-01", "District I"), created_at + Duration::hours(2));
        current.transition(RequestAction::Validate).expect("validate");
        current.assign_code("MD33333".to_string(), now + Duration::days(10)).expect("assign");

        seed_request(&pool, &lapsed).await;
        seed_request(&pool, &flagged).await;
        seed_request(&pool, &current).await;

        let candidates = repo.list_code_expiry_candidates(now).await.expect("list");
        let ids: Vec<_> = candidates.iter().map(|r| r.id.clone()).collect();

        assert_eq!(ids, vec![lapsed.id, flagged.id]);
    }

    #[tokio::test]
    async fn travel_window_lapsed_requires_a_remaining_code() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let now = created_at + Duration::days(30);

        let mut done = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        done.transition(RequestAction::Validate).expect("validate");
        done.assign_code("MD11111".to_string(), created_at + Duration::days(10)).expect("assign");

        let mut cleared =
            submitted(teacher("u-2", "SCH-01", "District I"), created_at + Duration::hours(1));
        cleared.transition(RequestAction::Validate).expect("validate");

        let mut upcoming =
            submitted(teacher("u-3", "SCH-01", "District I"), now - Duration::days(1));
        upcoming.transition(RequestAction::Validate).expect("validate");
        upcoming.assign_code("MD33333".to_string(), now + Duration::days(10)).expect("assign");

        seed_request(&pool, &done).await;
        seed_request(&pool, &cleared).await;
        seed_request(&pool, &upcoming).await;

        let lapsed = repo.list_travel_window_lapsed(now).await.expect("list");

        assert_eq!(lapsed.len(), 1);
        assert_eq!(lapsed[0].id, done.id);
    }

    #[tokio::test]
    async fn remove_reports_whether_a_row_was_deleted() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool.clone());
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let request = submitted(teacher("u-1", "SCH-01", "District I"), created_at);
        seed_request(&pool, &request).await;

        assert!(repo.remove(&request.id).await.expect("remove"));
        assert!(!repo.remove(&request.id).await.expect("second remove"));
        assert!(repo.find_by_id(&request.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn unknown_id_yields_none() {
        let pool = setup().await;
        let repo = SqlTravelRequestRepository::new(pool);

        let found =
            repo.find_by_id(&TravelRequestId("missing".to_string())).await.expect("find");
        assert!(found.is_none());
    }
}

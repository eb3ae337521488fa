use chrono::{DateTime, Utc};
use sqlx::Row;

use travo_core::domain::notification::{
    Notification, NotificationId, NotificationKind, NotificationMetadata,
};
use travo_core::domain::user::UserId;

use super::{fmt_ts, parse_ts, NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, message, kind, is_read, metadata, created_at";

fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> Result<Notification, RepositoryError> {
    let get = |name: &str| -> Result<String, RepositoryError> {
        row.try_get::<String, _>(name).map_err(|err| RepositoryError::Decode(err.to_string()))
    };

    let kind_str = get("kind")?;
    let kind: NotificationKind = kind_str
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown notification kind `{kind_str}`")))?;
    let is_read: i64 =
        row.try_get("is_read").map_err(|err| RepositoryError::Decode(err.to_string()))?;
    let metadata_raw: Option<String> =
        row.try_get("metadata").map_err(|err| RepositoryError::Decode(err.to_string()))?;
    let metadata: Option<NotificationMetadata> = match metadata_raw {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|err| RepositoryError::Decode(format!("column `metadata`: {err}")))?,
        ),
        None => None,
    };

    Ok(Notification {
        id: NotificationId(get("id")?),
        user_id: UserId(get("user_id")?),
        message: get("message")?,
        kind,
        is_read: is_read != 0,
        metadata,
        created_at: parse_ts(&get("created_at")?, "created_at")?,
    })
}

fn encode_metadata(
    metadata: &Option<NotificationMetadata>,
) -> Result<Option<String>, RepositoryError> {
    match metadata {
        Some(metadata) => serde_json::to_string(metadata)
            .map(Some)
            .map_err(|err| RepositoryError::Decode(format!("column `metadata`: {err}"))),
        None => Ok(None),
    }
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        let metadata = encode_metadata(&notification.metadata)?;

        // created_at is updated on conflict: a refreshed notification resurfaces
        // at the top of the recipient's feed.
        sqlx::query(
            "INSERT INTO notifications (id, user_id, message, kind, is_read, metadata, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 message = excluded.message,
                 kind = excluded.kind,
                 is_read = excluded.is_read,
                 metadata = excluded.metadata,
                 created_at = excluded.created_at",
        )
        .bind(&notification.id.0)
        .bind(&notification.user_id.0)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(notification.is_read as i64)
        .bind(metadata)
        .bind(fmt_ts(notification.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_notification(row)?)),
            None => Ok(None),
        }
    }

    async fn find_for_user(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Notification>, u64), RepositoryError> {
        let mut conditions = String::from("user_id = ?");
        if start.is_some() {
            conditions.push_str(" AND created_at >= ?");
        }
        if end.is_some() {
            conditions.push_str(" AND created_at <= ?");
        }

        let count_sql = format!("SELECT COUNT(*) AS total FROM notifications WHERE {conditions}");
        let mut count_query = sqlx::query(&count_sql).bind(&user_id.0);
        if let Some(start) = start {
            count_query = count_query.bind(fmt_ts(start));
        }
        if let Some(end) = end {
            count_query = count_query.bind(fmt_ts(end));
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await?
            .try_get("total")
            .map_err(|err| RepositoryError::Decode(err.to_string()))?;

        let per_page = per_page.max(1);
        let offset = u64::from(page.saturating_sub(1)) * u64::from(per_page);
        let page_sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE {conditions}
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query(&page_sql).bind(&user_id.0);
        if let Some(start) = start {
            page_query = page_query.bind(fmt_ts(start));
        }
        if let Some(end) = end {
            page_query = page_query.bind(fmt_ts(end));
        }
        let rows = page_query
            .bind(i64::from(per_page))
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let notifications: Result<Vec<_>, _> = rows.iter().map(row_to_notification).collect();
        Ok((notifications?, total as u64))
    }

    async fn mark_as_read(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn find_by_dedup_key(
        &self,
        user_id: &UserId,
        key: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ? AND json_extract(metadata, '$.notification_key') = ?
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(&user_id.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_notification(row)?)),
            None => Ok(None),
        }
    }

    async fn find_by_travel_request(
        &self,
        user_id: &UserId,
        travel_request_id: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE user_id = ? AND json_extract(metadata, '$.travel_request_id') = ?
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(&user_id.0)
        .bind(travel_request_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_notification(row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use travo_core::domain::notification::{
        Notification, NotificationId, NotificationKind, NotificationMetadata,
    };
    use travo_core::domain::user::{Role, User, UserId};

    use super::SqlNotificationRepository;
    use crate::repositories::{NotificationRepository, SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let user = User {
            id: UserId("u-1".to_string()),
            username: "mdelacruz".to_string(),
            first_name: "Maria".to_string(),
            last_name: "Dela Cruz".to_string(),
            email: "maria@district.example".to_string(),
            school_id: "SCH-01".to_string(),
            school_name: "San Isidro Elementary".to_string(),
            district: "District I".to_string(),
            position: "Teacher III".to_string(),
            original_position: None,
            contact_no: "09170000001".to_string(),
            employee_number: "EMP-0001".to_string(),
            role: Role::Teacher,
            created_at: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        };
        SqlUserRepository::new(pool.clone()).save(user).await.expect("save user");
        pool
    }

    fn sample(id: &str, offset_hours: i64, metadata: Option<NotificationMetadata>) -> Notification {
        Notification {
            id: NotificationId(id.to_string()),
            user_id: UserId("u-1".to_string()),
            message: format!("message {id}"),
            kind: NotificationKind::RequestSubmitted,
            is_read: false,
            metadata,
            created_at: Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap()
                + Duration::hours(offset_hours),
        }
    }

    #[tokio::test]
    async fn save_round_trips_metadata() {
        let pool = setup().await;
        let repo = SqlNotificationRepository::new(pool);

        let metadata = NotificationMetadata {
            notification_key: Some("code-expired:u-1".to_string()),
            travel_request_id: None,
            security_codes: vec!["MD12345".to_string()],
            request_count: Some(1),
        };
        let notification = sample("n-1", 0, Some(metadata));
        repo.save(notification.clone()).await.expect("save");

        let found = repo
            .find_by_id(&NotificationId("n-1".to_string()))
            .await
            .expect("find")
            .expect("row exists");
        assert_eq!(found, notification);
    }

    #[tokio::test]
    async fn find_for_user_pages_newest_first() {
        let pool = setup().await;
        let repo = SqlNotificationRepository::new(pool);

        for hour in 0..5 {
            repo.save(sample(&format!("n-{hour}"), hour, None)).await.expect("save");
        }

        let (first_page, total) = repo
            .find_for_user(&UserId("u-1".to_string()), 1, 2, None, None)
            .await
            .expect("page 1");
        assert_eq!(total, 5);
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].id.0, "n-4");
        assert_eq!(first_page[1].id.0, "n-3");

        let (last_page, _) = repo
            .find_for_user(&UserId("u-1".to_string()), 3, 2, None, None)
            .await
            .expect("page 3");
        assert_eq!(last_page.len(), 1);
        assert_eq!(last_page[0].id.0, "n-0");
    }

    #[tokio::test]
    async fn find_for_user_honors_the_date_window() {
        let pool = setup().await;
        let repo = SqlNotificationRepository::new(pool);

        for hour in 0..5 {
            repo.save(sample(&format!("n-{hour}"), hour, None)).await.expect("save");
        }

        let base = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let (window, total) = repo
            .find_for_user(
                &UserId("u-1".to_string()),
                1,
                10,
                Some(base + Duration::hours(1)),
                Some(base + Duration::hours(3)),
            )
            .await
            .expect("window");

        assert_eq!(total, 3);
        let ids: Vec<_> = window.iter().map(|n| n.id.0.clone()).collect();
        assert_eq!(ids, vec!["n-3", "n-2", "n-1"]);
    }

    #[tokio::test]
    async fn mark_as_read_returns_the_updated_row() {
        let pool = setup().await;
        let repo = SqlNotificationRepository::new(pool);
        repo.save(sample("n-1", 0, None)).await.expect("save");

        let updated = repo
            .mark_as_read(&NotificationId("n-1".to_string()))
            .await
            .expect("mark")
            .expect("row exists");
        assert!(updated.is_read);

        let missing = repo.mark_as_read(&NotificationId("missing".to_string())).await.expect("mark");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn dedup_lookups_match_key_then_request_id() {
        let pool = setup().await;
        let repo = SqlNotificationRepository::new(pool);

        repo.save(sample("n-1", 0, Some(NotificationMetadata::keyed("submitted:tr-1"))))
            .await
            .expect("save");
        repo.save(sample("n-2", 1, Some(NotificationMetadata::for_request("validated:tr-2", "tr-2"))))
            .await
            .expect("save");
        repo.save(sample("n-3", 2, None)).await.expect("save");

        let user = UserId("u-1".to_string());
        let by_key = repo
            .find_by_dedup_key(&user, "submitted:tr-1")
            .await
            .expect("find")
            .expect("keyed row exists");
        assert_eq!(by_key.id.0, "n-1");

        let by_request = repo
            .find_by_travel_request(&user, "tr-2")
            .await
            .expect("find")
            .expect("correlated row exists");
        assert_eq!(by_request.id.0, "n-2");

        assert!(repo.find_by_dedup_key(&user, "absent").await.expect("find").is_none());
        assert!(repo.find_by_travel_request(&user, "tr-9").await.expect("find").is_none());
    }
}

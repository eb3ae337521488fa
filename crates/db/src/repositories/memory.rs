//! In-memory repository twins backed by `tokio::sync::RwLock`. Used by the
//! workflow crate's unit tests and by the doctor command's dry-run mode; they
//! mirror the SQL implementations' ordering and filter semantics.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use travo_core::domain::notification::{Notification, NotificationId};
use travo_core::domain::travel_request::{TravelRequest, TravelRequestId};
use travo_core::domain::user::{Role, User, UserId};

use super::{
    NotificationRepository, RepositoryError, TravelRequestFilter, TravelRequestRepository,
    UserRepository,
};

#[derive(Default)]
pub struct InMemoryTravelRequestRepository {
    requests: RwLock<HashMap<String, TravelRequest>>,
}

impl InMemoryTravelRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(request: &TravelRequest, filter: &TravelRequestFilter) -> bool {
    if let Some(status) = filter.status {
        if request.status() != status {
            return false;
        }
    }
    if let Some(validation_status) = filter.validation_status {
        if request.validation_status() != validation_status {
            return false;
        }
    }
    if let Some(requester) = &filter.requester {
        if &request.requester.id != requester {
            return false;
        }
    }
    if let Some(role) = filter.requester_role {
        if request.requester.role != role {
            return false;
        }
    }
    if let Some(school_id) = &filter.requester_school_id {
        if &request.requester.school_id != school_id {
            return false;
        }
    }
    if let Some(district) = &filter.requester_district {
        if &request.requester.district != district {
            return false;
        }
    }
    if let Some(created_after) = filter.created_after {
        if request.created_at < created_after {
            return false;
        }
    }
    if let Some(created_before) = filter.created_before {
        if request.created_at > created_before {
            return false;
        }
    }
    true
}

fn has_code(request: &TravelRequest) -> bool {
    request.security_code.as_deref().is_some_and(|code| !code.is_empty())
}

#[async_trait::async_trait]
impl TravelRequestRepository for InMemoryTravelRequestRepository {
    async fn save(&self, request: TravelRequest) -> Result<(), RepositoryError> {
        self.requests.write().await.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &TravelRequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        Ok(self.requests.read().await.get(&id.0).cloned())
    }

    async fn find_by_security_code(
        &self,
        code: &str,
    ) -> Result<Option<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matches: Vec<_> = requests
            .values()
            .filter(|request| request.security_code.as_deref() == Some(code))
            .collect();
        matches.sort_by_key(|request| request.created_at);
        Ok(matches.first().map(|request| (*request).clone()))
    }

    async fn list(
        &self,
        filter: TravelRequestFilter,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matches: Vec<_> =
            requests.values().filter(|request| matches_filter(request, &filter)).cloned().collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn list_code_expiry_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matches: Vec<_> = requests
            .values()
            .filter(|request| {
                has_code(request) && (request.is_code_expired || request.code_expiration_date < now)
            })
            .cloned()
            .collect();
        matches.sort_by_key(|request| request.created_at);
        Ok(matches)
    }

    async fn list_travel_window_lapsed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TravelRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matches: Vec<_> = requests
            .values()
            .filter(|request| has_code(request) && request.end_date < now)
            .cloned()
            .collect();
        matches.sort_by_key(|request| request.created_at);
        Ok(matches)
    }

    async fn remove(&self, id: &TravelRequestId) -> Result<bool, RepositoryError> {
        Ok(self.requests.write().await.remove(&id.0).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        self.users.write().await.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id.0).cloned())
    }

    async fn find_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut matches: Vec<_> = users.values().filter(|user| user.role == role).cloned().collect();
        matches.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(matches)
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut all: Vec<_> = users.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<String, Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        self.notifications.write().await.insert(notification.id.0.clone(), notification);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(self.notifications.read().await.get(&id.0).cloned())
    }

    async fn find_for_user(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Notification>, u64), RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut matches: Vec<_> = notifications
            .values()
            .filter(|notification| {
                &notification.user_id == user_id
                    && start.map_or(true, |start| notification.created_at >= start)
                    && end.map_or(true, |end| notification.created_at <= end)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));

        let total = matches.len() as u64;
        let per_page = per_page.max(1) as usize;
        let offset = page.saturating_sub(1) as usize * per_page;
        let page_rows = matches.into_iter().skip(offset).take(per_page).collect();
        Ok((page_rows, total))
    }

    async fn mark_as_read(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError> {
        let mut notifications = self.notifications.write().await;
        match notifications.get_mut(&id.0) {
            Some(notification) => {
                notification.is_read = true;
                Ok(Some(notification.clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_by_dedup_key(
        &self,
        user_id: &UserId,
        key: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut matches: Vec<_> = notifications
            .values()
            .filter(|notification| {
                &notification.user_id == user_id
                    && notification
                        .metadata
                        .as_ref()
                        .and_then(|metadata| metadata.notification_key.as_deref())
                        == Some(key)
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(matches.first().map(|notification| (*notification).clone()))
    }

    async fn find_by_travel_request(
        &self,
        user_id: &UserId,
        travel_request_id: &str,
    ) -> Result<Option<Notification>, RepositoryError> {
        let notifications = self.notifications.read().await;
        let mut matches: Vec<_> = notifications
            .values()
            .filter(|notification| {
                &notification.user_id == user_id
                    && notification
                        .metadata
                        .as_ref()
                        .and_then(|metadata| metadata.travel_request_id.as_deref())
                        == Some(travel_request_id)
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(matches.first().map(|notification| (*notification).clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use travo_core::domain::notification::{
        Notification, NotificationId, NotificationKind, NotificationMetadata,
    };
    use travo_core::domain::travel_request::{
        CreateTravelRequest, RequestAction, Status, TravelRequest,
    };
    use travo_core::domain::user::{Role, User, UserId};

    use super::{InMemoryNotificationRepository, InMemoryTravelRequestRepository};
    use crate::repositories::{
        NotificationRepository, TravelRequestFilter, TravelRequestRepository,
    };

    fn teacher(id: &str) -> User {
        User {
            id: UserId(id.to_string()),
            username: format!("user-{id}"),
            first_name: "Maria".to_string(),
            last_name: "Dela Cruz".to_string(),
            email: format!("{id}@district.example"),
            school_id: "SCH-01".to_string(),
            school_name: "San Isidro Elementary".to_string(),
            district: "District I".to_string(),
            position: "Teacher III".to_string(),
            original_position: None,
            contact_no: "09170000001".to_string(),
            employee_number: format!("EMP-{id}"),
            role: Role::Teacher,
            created_at: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn list_applies_filters_and_orders_newest_first() {
        let repo = InMemoryTravelRequestRepository::new();
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();

        for (offset, id) in [(0, "u-1"), (1, "u-2")] {
            let mut request = TravelRequest::new(
                CreateTravelRequest {
                    purpose: "Division training".to_string(),
                    start_date: created_at + Duration::days(7),
                    end_date: created_at + Duration::days(9),
                    departments: Vec::new(),
                },
                teacher(id),
                created_at + Duration::hours(offset),
            );
            request.transition(RequestAction::Submit).expect("submit");
            repo.save(request).await.expect("save");
        }

        let all = repo
            .list(TravelRequestFilter {
                status: Some(Status::Pending),
                ..TravelRequestFilter::default()
            })
            .await
            .expect("list");

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].requester.id.0, "u-2");
    }

    #[tokio::test]
    async fn dedup_key_lookup_matches_sql_semantics() {
        let repo = InMemoryNotificationRepository::new();
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();

        repo.save(Notification {
            id: NotificationId("n-1".to_string()),
            user_id: UserId("u-1".to_string()),
            message: "message".to_string(),
            kind: NotificationKind::RequestSubmitted,
            is_read: false,
            metadata: Some(NotificationMetadata::keyed("submitted:tr-1")),
            created_at,
        })
        .await
        .expect("save");

        let found = repo
            .find_by_dedup_key(&UserId("u-1".to_string()), "submitted:tr-1")
            .await
            .expect("find")
            .expect("keyed row exists");
        assert_eq!(found.id.0, "n-1");

        let other_user = repo
            .find_by_dedup_key(&UserId("u-2".to_string()), "submitted:tr-1")
            .await
            .expect("find");
        assert!(other_user.is_none());
    }
}

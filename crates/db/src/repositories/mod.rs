use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use travo_core::domain::notification::{Notification, NotificationId};
use travo_core::domain::travel_request::{
    Status, TravelRequest, TravelRequestId, ValidationStatus,
};
use travo_core::domain::user::{Role, User, UserId};

pub mod memory;
pub mod notification;
pub mod travel_request;
pub mod user;

pub use memory::{
    InMemoryNotificationRepository, InMemoryTravelRequestRepository, InMemoryUserRepository,
};
pub use notification::SqlNotificationRepository;
pub use travel_request::SqlTravelRequestRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Filter over the travel-request table. All fields are AND-combined; results
/// are always ordered by creation time descending.
#[derive(Clone, Debug, Default)]
pub struct TravelRequestFilter {
    pub status: Option<Status>,
    pub validation_status: Option<ValidationStatus>,
    pub requester: Option<UserId>,
    pub requester_role: Option<Role>,
    pub requester_school_id: Option<String>,
    pub requester_district: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait TravelRequestRepository: Send + Sync {
    async fn save(&self, request: TravelRequest) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        id: &TravelRequestId,
    ) -> Result<Option<TravelRequest>, RepositoryError>;
    /// Oldest match wins when a code collides (codes are not unique).
    async fn find_by_security_code(
        &self,
        code: &str,
    ) -> Result<Option<TravelRequest>, RepositoryError>;
    async fn list(
        &self,
        filter: TravelRequestFilter,
    ) -> Result<Vec<TravelRequest>, RepositoryError>;
    /// Requests still carrying a code whose expiration has passed, plus rows
    /// a previous sweep flagged but failed to clear.
    async fn list_code_expiry_candidates(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TravelRequest>, RepositoryError>;
    /// Requests still carrying a code whose travel window has fully lapsed.
    async fn list_travel_window_lapsed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TravelRequest>, RepositoryError>;
    /// Returns whether a row was actually deleted.
    async fn remove(&self, id: &TravelRequestId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_role(&self, role: Role) -> Result<Vec<User>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError>;
    async fn find_by_id(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;
    /// Page through a user's notifications, newest first. Returns the page
    /// and the total row count for the given window.
    async fn find_for_user(
        &self,
        user_id: &UserId,
        page: u32,
        per_page: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(Vec<Notification>, u64), RepositoryError>;
    async fn mark_as_read(
        &self,
        id: &NotificationId,
    ) -> Result<Option<Notification>, RepositoryError>;
    /// Dedup lookup by the explicit correlation key in the metadata column.
    async fn find_by_dedup_key(
        &self,
        user_id: &UserId,
        key: &str,
    ) -> Result<Option<Notification>, RepositoryError>;
    /// Dedup fallback: latest notification correlated to a travel request.
    async fn find_by_travel_request(
        &self,
        user_id: &UserId,
        travel_request_id: &str,
    ) -> Result<Option<Notification>, RepositoryError>;
}

/// Timestamps are stored as second-precision RFC 3339 UTC strings so that
/// string comparison in SQL matches chronological order.
pub(crate) fn fmt_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_ts(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| RepositoryError::Decode(format!("column `{column}`: {err}")))
}

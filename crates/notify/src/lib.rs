//! Notification delivery with dedup-update semantics.
//!
//! A notification correlated to an earlier one (same `notification_key`, or
//! failing that the same `travel_request_id`) updates the existing row in
//! place and resurfaces it unread, instead of piling duplicates into the
//! recipient's feed.

pub mod messages;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use travo_core::domain::notification::{
    Notification, NotificationId, NotificationKind, NotificationMetadata,
};
use travo_core::domain::user::User;
use travo_core::Clock;
use travo_db::repositories::{NotificationRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Delivers a notification to `user`, deduplicating against earlier ones
    /// via the metadata correlation keys. Returns the stored row.
    async fn notify(
        &self,
        user: &User,
        message: String,
        kind: NotificationKind,
        metadata: Option<NotificationMetadata>,
    ) -> Result<Notification, NotifyError>;
}

/// Repository-backed gateway used in production.
pub struct DbNotificationGateway {
    repository: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
}

impl DbNotificationGateway {
    pub fn new(repository: Arc<dyn NotificationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    async fn find_existing(
        &self,
        user: &User,
        metadata: &Option<NotificationMetadata>,
    ) -> Result<Option<Notification>, NotifyError> {
        let Some(metadata) = metadata else {
            return Ok(None);
        };

        if let Some(key) = &metadata.notification_key {
            if let Some(existing) = self.repository.find_by_dedup_key(&user.id, key).await? {
                return Ok(Some(existing));
            }
        }
        if let Some(travel_request_id) = &metadata.travel_request_id {
            if let Some(existing) =
                self.repository.find_by_travel_request(&user.id, travel_request_id).await?
            {
                return Ok(Some(existing));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl NotificationGateway for DbNotificationGateway {
    async fn notify(
        &self,
        user: &User,
        message: String,
        kind: NotificationKind,
        metadata: Option<NotificationMetadata>,
    ) -> Result<Notification, NotifyError> {
        let existing = self.find_existing(user, &metadata).await?;

        let notification = match existing {
            Some(mut existing) => {
                debug!(
                    event_name = "notification_refreshed",
                    notification_id = %existing.id.0,
                    user_id = %user.id.0,
                    kind = %kind,
                    "updating correlated notification in place"
                );
                existing.message = message;
                existing.kind = kind;
                existing.metadata = metadata;
                existing.is_read = false;
                existing.created_at = self.clock.now();
                existing
            }
            None => Notification {
                id: NotificationId::generate(),
                user_id: user.id.clone(),
                message,
                kind,
                is_read: false,
                metadata,
                created_at: self.clock.now(),
            },
        };

        self.repository.save(notification.clone()).await?;
        Ok(notification)
    }
}

/// In-memory test double with the same dedup semantics as the DB gateway.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Notification>>,
    clock_offset: Mutex<i64>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, user_id: &str) -> Vec<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|notification| notification.user_id.0 == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(
        &self,
        user: &User,
        message: String,
        kind: NotificationKind,
        metadata: Option<NotificationMetadata>,
    ) -> Result<Notification, NotifyError> {
        let mut sent = self.sent.lock().await;
        let mut offset = self.clock_offset.lock().await;
        *offset += 1;
        let created_at = chrono::DateTime::<chrono::Utc>::UNIX_EPOCH
            + chrono::Duration::seconds(*offset);

        let correlated = sent.iter_mut().find(|existing| {
            if existing.user_id != user.id {
                return false;
            }
            let (Some(existing_meta), Some(new_meta)) = (&existing.metadata, &metadata) else {
                return false;
            };
            match (&existing_meta.notification_key, &new_meta.notification_key) {
                (Some(a), Some(b)) if a == b => true,
                _ => matches!(
                    (&existing_meta.travel_request_id, &new_meta.travel_request_id),
                    (Some(a), Some(b)) if a == b
                ),
            }
        });

        let notification = match correlated {
            Some(existing) => {
                existing.message = message;
                existing.kind = kind;
                existing.metadata = metadata;
                existing.is_read = false;
                existing.created_at = created_at;
                existing.clone()
            }
            None => {
                let notification = Notification {
                    id: NotificationId::generate(),
                    user_id: user.id.clone(),
                    message,
                    kind,
                    is_read: false,
                    metadata,
                    created_at,
                };
                sent.push(notification.clone());
                notification
            }
        };

        Ok(notification)
    }
}

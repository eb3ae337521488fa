use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    RequestSubmitted,
    RequestValidated,
    RequestApproved,
    RequestRejected,
    CodeExpired,
    TravelCompleted,
    RequestReceipt,
    RemarksAdded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestSubmitted => "REQUEST_SUBMITTED",
            Self::RequestValidated => "REQUEST_VALIDATED",
            Self::RequestApproved => "REQUEST_APPROVED",
            Self::RequestRejected => "REQUEST_REJECTED",
            Self::CodeExpired => "CODE_EXPIRED",
            Self::TravelCompleted => "TRAVEL_COMPLETED",
            Self::RequestReceipt => "REQUEST_RECEIPT",
            Self::RemarksAdded => "REMARKS_ADDED",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown notification kind `{0}`")]
pub struct ParseNotificationKindError(pub String);

impl std::str::FromStr for NotificationKind {
    type Err = ParseNotificationKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "REQUEST_SUBMITTED" => Ok(Self::RequestSubmitted),
            "REQUEST_VALIDATED" => Ok(Self::RequestValidated),
            "REQUEST_APPROVED" => Ok(Self::RequestApproved),
            "REQUEST_REJECTED" => Ok(Self::RequestRejected),
            "CODE_EXPIRED" => Ok(Self::CodeExpired),
            "TRAVEL_COMPLETED" => Ok(Self::TravelCompleted),
            "REQUEST_RECEIPT" => Ok(Self::RequestReceipt),
            "REMARKS_ADDED" => Ok(Self::RemarksAdded),
            other => Err(ParseNotificationKindError(other.to_string())),
        }
    }
}

/// Correlation metadata attached to a notification. The gateway uses
/// `notification_key` (then `travel_request_id`) to update an existing row in
/// place instead of inserting a duplicate; `security_codes` preserves the
/// original code values after the sweep clears them, for emergency lookup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_count: Option<u32>,
}

impl NotificationMetadata {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self { notification_key: Some(key.into()), ..Self::default() }
    }

    pub fn for_request(key: impl Into<String>, travel_request_id: impl Into<String>) -> Self {
        Self {
            notification_key: Some(key.into()),
            travel_request_id: Some(travel_request_id.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub metadata: Option<NotificationMetadata>,
    pub created_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::user::User;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TravelRequestId(pub String);

impl TravelRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Coarse request status as surfaced to callers and stored alongside the
/// canonical state tag (legacy-shaped queries filter on it).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

/// Hierarchical sign-off axis, projected from the canonical state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Validated,
    Rejected,
}

/// Canonical request lifecycle state. Collapses the legacy pair of
/// status/validation-status columns into one tag so that impossible
/// combinations cannot be represented.
///
/// `Validated` is reached only on the admin-officer forward-for-review path;
/// chain validation goes straight from `PendingValidation` to `Accepted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Draft,
    PendingValidation,
    Validated,
    Accepted,
    Rejected,
    Expired,
    Completed,
}

impl RequestState {
    pub fn status(&self) -> Status {
        match self {
            Self::Draft | Self::PendingValidation | Self::Validated => Status::Pending,
            Self::Accepted | Self::Expired | Self::Completed => Status::Accepted,
            Self::Rejected => Status::Rejected,
        }
    }

    pub fn validation_status(&self) -> ValidationStatus {
        match self {
            Self::Draft | Self::PendingValidation => ValidationStatus::Pending,
            Self::Validated | Self::Accepted | Self::Expired | Self::Completed => {
                ValidationStatus::Validated
            }
            Self::Rejected => ValidationStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingValidation => "pending_validation",
            Self::Validated => "validated",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown request state `{0}`")]
pub struct ParseRequestStateError(pub String);

impl std::str::FromStr for RequestState {
    type Err = ParseRequestStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "draft" => Ok(Self::Draft),
            "pending_validation" => Ok(Self::PendingValidation),
            "validated" => Ok(Self::Validated),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            "completed" => Ok(Self::Completed),
            other => Err(ParseRequestStateError(other.to_string())),
        }
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown status `{0}`")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions a caller or the sweep may attempt against a request. The transition
/// table in [`RequestState::apply`] is the single source of truth for which
/// are legal from which state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestAction {
    Submit,
    Validate,
    ForwardForReview,
    Reject,
    AdminAccept,
    AdminReject,
    ExpireCode,
    ReissueCode,
    CompleteTravel,
    /// Administrative correction that sets the status projection directly,
    /// bypassing the hierarchy. Kept from the legacy behavior; the missing
    /// role check is a known, deliberately preserved authorization gap.
    ForceStatus(Status),
}

impl RequestState {
    pub fn apply(self, action: RequestAction) -> Result<RequestState, DomainError> {
        use RequestAction as A;
        use RequestState as S;

        let next = match (self, action) {
            (S::Draft, A::Submit) => S::PendingValidation,
            (S::PendingValidation, A::Validate) => S::Accepted,
            (S::PendingValidation, A::ForwardForReview) => S::Validated,
            (S::PendingValidation, A::Reject) => S::Rejected,
            (S::Validated, A::AdminAccept) => S::Accepted,
            (S::Validated, A::AdminReject) => S::Rejected,
            // Re-validation of an already accepted request re-notifies only.
            (S::Accepted, A::Validate) => S::Accepted,
            (S::Accepted, A::ExpireCode) | (S::Expired, A::ExpireCode) => S::Expired,
            (S::Accepted, A::ReissueCode) | (S::Expired, A::ReissueCode) => S::Accepted,
            (S::Accepted, A::CompleteTravel) | (S::Expired, A::CompleteTravel) => S::Completed,
            (_, A::ForceStatus(Status::Pending)) => S::PendingValidation,
            (_, A::ForceStatus(Status::Accepted)) => S::Accepted,
            (_, A::ForceStatus(Status::Rejected)) => S::Rejected,
            (from, action) => return Err(DomainError::InvalidTransition { from, action }),
        };

        Ok(next)
    }
}

/// One submitted trip. Mutated exclusively through the methods below; callers
/// never write fields directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub id: TravelRequestId,
    pub purpose: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Ordered department names the request routes through; may contain a
    /// non-standard "custom" entry outside the configured list.
    pub departments: Vec<String>,
    pub state: RequestState,
    pub viewed: bool,
    pub remarks: Option<String>,
    pub security_code: Option<String>,
    /// Always set; primed to the creation instant before approval so the
    /// expiry sweep has something to compare against.
    pub code_expiration_date: DateTime<Utc>,
    /// Set when the code lapses, independently of whether `security_code` has
    /// been cleared yet. Models the "used up but emergency-valid" window: the
    /// original code survives in notification metadata for manual lookup.
    pub is_code_expired: bool,
    pub requester: User,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateTravelRequest {
    pub purpose: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub departments: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTravelRequest {
    pub purpose: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub departments: Option<Vec<String>>,
    pub remarks: Option<String>,
}

impl TravelRequest {
    pub fn new(dto: CreateTravelRequest, requester: User, created_at: DateTime<Utc>) -> Self {
        Self {
            id: TravelRequestId::generate(),
            purpose: dto.purpose,
            start_date: dto.start_date,
            end_date: dto.end_date,
            departments: dto.departments,
            state: RequestState::Draft,
            viewed: false,
            remarks: None,
            security_code: None,
            code_expiration_date: created_at,
            is_code_expired: false,
            requester,
            created_at,
        }
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn validation_status(&self) -> ValidationStatus {
        self.state.validation_status()
    }

    pub fn transition(&mut self, action: RequestAction) -> Result<(), DomainError> {
        self.state = self.state.apply(action)?;
        Ok(())
    }

    /// Attaches a security code. Legal only while the status projection is
    /// Accepted; this is the invariant `security_code present => Accepted`.
    pub fn assign_code(
        &mut self,
        code: String,
        expiration: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status() != Status::Accepted {
            return Err(DomainError::InvariantViolation(format!(
                "security code may only be assigned while accepted, state is {}",
                self.state
            )));
        }

        self.security_code = Some(code);
        self.code_expiration_date = expiration;
        self.is_code_expired = false;
        Ok(())
    }

    /// Expires the code: flags it stale and clears it, returning the original
    /// value so callers can preserve it in notification metadata.
    pub fn expire_code(&mut self) -> Result<Option<String>, DomainError> {
        self.transition(RequestAction::ExpireCode)?;
        self.is_code_expired = true;
        Ok(self.security_code.take())
    }

    /// Closes out a request whose travel window has fully lapsed, clearing
    /// any remaining code.
    pub fn complete_travel(&mut self) -> Result<Option<String>, DomainError> {
        self.transition(RequestAction::CompleteTravel)?;
        self.is_code_expired = true;
        Ok(self.security_code.take())
    }

    /// Administrative status override. Forcing the request off the accepted
    /// projection invalidates any outstanding code the same way expiry does,
    /// so `security_code` never survives on a non-accepted request. Returns
    /// the displaced code, if any.
    pub fn force_status(&mut self, status: Status) -> Result<Option<String>, DomainError> {
        self.transition(RequestAction::ForceStatus(status))?;

        if self.status() != Status::Accepted && self.security_code.is_some() {
            self.is_code_expired = true;
            return Ok(self.security_code.take());
        }

        Ok(None)
    }

    pub fn merge(&mut self, update: UpdateTravelRequest) {
        if let Some(purpose) = update.purpose {
            self.purpose = purpose;
        }
        if let Some(start_date) = update.start_date {
            self.start_date = start_date;
        }
        if let Some(end_date) = update.end_date {
            self.end_date = end_date;
        }
        if let Some(departments) = update.departments {
            self.departments = departments;
        }
        if let Some(remarks) = update.remarks {
            self.remarks = Some(remarks);
        }
    }
}

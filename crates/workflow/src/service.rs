use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use travo_core::config::PolicyConfig;
use travo_core::domain::travel_request::{
    CreateTravelRequest, RequestAction, RequestState, Status, TravelRequest, TravelRequestId,
    UpdateTravelRequest, ValidationStatus,
};
use travo_core::domain::user::{Role, User};
use travo_core::errors::DomainError;
use travo_core::hierarchy::{ApprovalHierarchy, InboxScope};
use travo_core::security_code::SecurityCodeIssuer;
use travo_core::workdays;
use travo_core::Clock;
use travo_db::repositories::{RepositoryError, TravelRequestFilter, TravelRequestRepository};

use crate::events::{NotificationDispatcher, RequestEvent};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("travel request `{id}` not found")]
    NotFound { id: String },
    #[error("no travel request carries that security code")]
    UnknownSecurityCode,
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome a validator records against a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationDecision {
    Validated,
    Rejected,
}

/// Final decision an admin records against a forwarded request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReviewDecision {
    Accepted,
    Rejected,
}

/// Orchestrates the travel-request lifecycle: authorization against the
/// approval hierarchy, state transitions, code issuance, and notification
/// fan-out (via the dispatcher, after each save commits).
pub struct TravelRequestService {
    requests: Arc<dyn TravelRequestRepository>,
    hierarchy: ApprovalHierarchy,
    issuer: SecurityCodeIssuer,
    policy: PolicyConfig,
    clock: Arc<dyn Clock>,
    dispatcher: NotificationDispatcher,
}

impl TravelRequestService {
    pub fn new(
        requests: Arc<dyn TravelRequestRepository>,
        hierarchy: ApprovalHierarchy,
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self { requests, hierarchy, issuer: SecurityCodeIssuer, policy, clock, dispatcher }
    }

    async fn load(&self, id: &TravelRequestId) -> Result<TravelRequest, WorkflowError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { id: id.0.clone() })
    }

    /// Builds and submits a new request, then notifies the requester and
    /// every user holding the requester's direct-approver role. Fan-out is
    /// not atomic with the save.
    pub async fn create(
        &self,
        dto: CreateTravelRequest,
        requester: &User,
    ) -> Result<TravelRequest, WorkflowError> {
        let now = self.clock.now();
        let mut request = TravelRequest::new(dto, requester.clone(), now);
        request.transition(RequestAction::Submit)?;
        request.code_expiration_date = workdays::add_working_days(
            request.start_date,
            self.policy.code_valid_working_days_after_start,
        );

        self.requests.save(request.clone()).await?;
        info!(
            event_name = "travel_request_created",
            travel_request_id = %request.id.0,
            requester_id = %requester.id.0,
            requester_role = %requester.role,
            "travel request submitted"
        );

        self.dispatcher.dispatch(RequestEvent::Submitted { request: request.clone() }).await;
        Ok(request)
    }

    /// Records a chain validator's decision. A `Validated` decision from the
    /// terminal admin-officer step forwards for final admin review instead of
    /// accepting outright.
    pub async fn validate(
        &self,
        id: &TravelRequestId,
        decision: ValidationDecision,
        validator: &User,
    ) -> Result<TravelRequest, WorkflowError> {
        let mut request = self.load(id).await?;

        if !self.hierarchy.can_validate(validator.role, request.requester.role) {
            return Err(WorkflowError::Forbidden {
                reason: format!(
                    "role {} may not validate requests from role {}",
                    validator.role, request.requester.role
                ),
            });
        }

        match decision {
            ValidationDecision::Rejected => {
                request.transition(RequestAction::Reject)?;
                self.requests.save(request.clone()).await?;
                info!(
                    event_name = "travel_request_rejected",
                    travel_request_id = %request.id.0,
                    validator_id = %validator.id.0,
                    "request rejected during validation"
                );
                self.dispatcher
                    .dispatch(RequestEvent::Rejected { request: request.clone() })
                    .await;
            }
            ValidationDecision::Validated if validator.role == Role::AoAdminOfficer => {
                request.transition(RequestAction::ForwardForReview)?;
                self.requests.save(request.clone()).await?;
                info!(
                    event_name = "travel_request_forwarded",
                    travel_request_id = %request.id.0,
                    validator_id = %validator.id.0,
                    "request forwarded for admin review"
                );
                self.dispatcher
                    .dispatch(RequestEvent::ForwardedForReview { request: request.clone() })
                    .await;
            }
            ValidationDecision::Validated => {
                request.transition(RequestAction::Validate)?;
                // A second validation never regenerates an existing code.
                if request.security_code.is_none() {
                    let code = self
                        .issuer
                        .issue(&request.requester.first_name, &request.requester.last_name);
                    let expiration = workdays::add_working_days(
                        request.start_date,
                        self.policy.code_valid_working_days_after_start,
                    );
                    request.assign_code(code, expiration)?;
                }
                self.requests.save(request.clone()).await?;
                info!(
                    event_name = "travel_request_validated",
                    travel_request_id = %request.id.0,
                    validator_id = %validator.id.0,
                    "request validated and accepted"
                );

                let code = request.security_code.clone().unwrap_or_default();
                let expiration = request.code_expiration_date;
                self.dispatcher
                    .dispatch(RequestEvent::Validated {
                        request: request.clone(),
                        code,
                        expiration,
                    })
                    .await;
            }
        }

        Ok(request)
    }

    /// Final admin decision on a forwarded request. Acceptance always
    /// regenerates the code with the reissue window from now.
    pub async fn admin_review(
        &self,
        id: &TravelRequestId,
        decision: ReviewDecision,
        admin: &User,
    ) -> Result<TravelRequest, WorkflowError> {
        if admin.role != Role::Admin {
            return Err(WorkflowError::Forbidden {
                reason: "only admins make final decisions on forwarded requests".to_string(),
            });
        }

        let mut request = self.load(id).await?;
        if request.state != RequestState::Validated {
            return Err(WorkflowError::Forbidden {
                reason: "admin review applies only to requests forwarded for review".to_string(),
            });
        }

        match decision {
            ReviewDecision::Accepted => {
                request.transition(RequestAction::AdminAccept)?;
                let code = self
                    .issuer
                    .issue(&request.requester.first_name, &request.requester.last_name);
                let expiration = workdays::add_working_days(
                    self.clock.now(),
                    self.policy.code_reissue_working_days,
                );
                request.assign_code(code.clone(), expiration)?;
                self.requests.save(request.clone()).await?;
                info!(
                    event_name = "travel_request_admin_accepted",
                    travel_request_id = %request.id.0,
                    admin_id = %admin.id.0,
                    "forwarded request accepted by admin"
                );
                self.dispatcher
                    .dispatch(RequestEvent::Approved {
                        request: request.clone(),
                        code,
                        expiration,
                    })
                    .await;
            }
            ReviewDecision::Rejected => {
                request.transition(RequestAction::AdminReject)?;
                self.requests.save(request.clone()).await?;
                info!(
                    event_name = "travel_request_admin_rejected",
                    travel_request_id = %request.id.0,
                    admin_id = %admin.id.0,
                    "forwarded request rejected by admin"
                );
                self.dispatcher
                    .dispatch(RequestEvent::Rejected { request: request.clone() })
                    .await;
            }
        }

        Ok(request)
    }

    /// Administrative status correction. Deliberately performs no role check:
    /// the original system shipped this gap and downstream tooling depends on
    /// it, so it is preserved and documented rather than silently fixed.
    pub async fn update_status(
        &self,
        id: &TravelRequestId,
        status: Status,
    ) -> Result<TravelRequest, WorkflowError> {
        let mut request = self.load(id).await?;
        let displaced = request.force_status(status)?;

        let mut issued = None;
        if status == Status::Accepted && request.security_code.is_none() {
            let code =
                self.issuer.issue(&request.requester.first_name, &request.requester.last_name);
            let expiration = workdays::add_working_days(
                self.clock.now(),
                self.policy.code_reissue_working_days,
            );
            request.assign_code(code.clone(), expiration)?;
            issued = Some((code, expiration));
        }

        self.requests.save(request.clone()).await?;
        info!(
            event_name = "travel_request_status_forced",
            travel_request_id = %request.id.0,
            status = %status,
            code_invalidated = displaced.is_some(),
            "status set by administrative correction"
        );

        if let Some((code, expiration)) = issued {
            self.dispatcher
                .dispatch(RequestEvent::CodeReissued { request: request.clone(), code, expiration })
                .await;
        }

        Ok(request)
    }

    pub async fn add_remarks(
        &self,
        id: &TravelRequestId,
        remarks: String,
        actor: &User,
    ) -> Result<TravelRequest, WorkflowError> {
        if !matches!(actor.role, Role::AoAdmin | Role::Admin) {
            return Err(WorkflowError::Forbidden {
                reason: "only administrative officers and admins may add remarks".to_string(),
            });
        }

        let mut request = self.load(id).await?;
        request.remarks = Some(remarks.clone());
        self.requests.save(request.clone()).await?;

        self.dispatcher
            .dispatch(RequestEvent::RemarksAdded { request: request.clone(), remarks })
            .await;

        Ok(request)
    }

    pub async fn mark_as_viewed(&self, id: &TravelRequestId) -> Result<TravelRequest, WorkflowError> {
        let mut request = self.load(id).await?;
        request.viewed = true;
        self.requests.save(request.clone()).await?;
        Ok(request)
    }

    /// Resolves a security code for checkpoint lookup. The owner and the
    /// administrative office may resolve any code they hold.
    pub async fn find_by_security_code(
        &self,
        code: &str,
        caller: &User,
    ) -> Result<TravelRequest, WorkflowError> {
        let request = self
            .requests
            .find_by_security_code(code)
            .await?
            .ok_or(WorkflowError::UnknownSecurityCode)?;

        let privileged = matches!(caller.role, Role::Admin | Role::AoAdmin | Role::AoAdminOfficer);
        if !privileged && request.requester.id != caller.id {
            return Err(WorkflowError::Forbidden {
                reason: "security codes resolve only for their owner or the administrative office"
                    .to_string(),
            });
        }

        Ok(request)
    }

    /// Issues a code for an accepted request that lost or never received one.
    /// No-op when a live code is already present.
    pub async fn generate_security_code(
        &self,
        id: &TravelRequestId,
    ) -> Result<TravelRequest, WorkflowError> {
        let mut request = self.load(id).await?;
        if request.status() != Status::Accepted {
            return Err(WorkflowError::Forbidden {
                reason: "security codes are issued only for accepted requests".to_string(),
            });
        }
        if request.security_code.is_some() {
            return Ok(request);
        }

        request.transition(RequestAction::ReissueCode)?;
        let code = self.issuer.issue(&request.requester.first_name, &request.requester.last_name);
        let expiration =
            workdays::add_working_days(self.clock.now(), self.policy.code_reissue_working_days);
        request.assign_code(code.clone(), expiration)?;
        self.requests.save(request.clone()).await?;
        info!(
            event_name = "security_code_reissued",
            travel_request_id = %request.id.0,
            "security code reissued"
        );

        self.dispatcher
            .dispatch(RequestEvent::CodeReissued { request: request.clone(), code, expiration })
            .await;
        Ok(request)
    }

    pub async fn remove(&self, id: &TravelRequestId) -> Result<(), WorkflowError> {
        if !self.requests.remove(id).await? {
            return Err(WorkflowError::NotFound { id: id.0.clone() });
        }
        Ok(())
    }

    pub async fn find_by_id(&self, id: &TravelRequestId) -> Result<TravelRequest, WorkflowError> {
        self.load(id).await
    }

    pub async fn find_all(&self) -> Result<Vec<TravelRequest>, WorkflowError> {
        Ok(self.requests.list(TravelRequestFilter::default()).await?)
    }

    /// The viewer's pending inbox per their position in the hierarchy.
    pub async fn pending_for(&self, viewer: &User) -> Result<Vec<TravelRequest>, WorkflowError> {
        let filter = match self.hierarchy.inbox(viewer) {
            InboxScope::Empty => return Ok(Vec::new()),
            InboxScope::PendingFrom { requester_role, school_id, district } => {
                TravelRequestFilter {
                    validation_status: Some(ValidationStatus::Pending),
                    status: Some(Status::Pending),
                    requester_role: Some(requester_role),
                    requester_school_id: school_id,
                    requester_district: district,
                    ..TravelRequestFilter::default()
                }
            }
            InboxScope::AllWithValidation(validation_status) => TravelRequestFilter {
                validation_status: Some(validation_status),
                status: Some(Status::Pending),
                ..TravelRequestFilter::default()
            },
        };

        Ok(self.requests.list(filter).await?)
    }

    pub async fn update(
        &self,
        id: &TravelRequestId,
        update: UpdateTravelRequest,
    ) -> Result<TravelRequest, WorkflowError> {
        let mut request = self.load(id).await?;
        request.merge(update);
        self.requests.save(request.clone()).await?;
        Ok(request)
    }
}

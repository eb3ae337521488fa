//! Workflow events and their notification fan-out.
//!
//! State changes emit a [`RequestEvent`]; the [`NotificationDispatcher`]
//! turns each event into notifications after the change has been persisted.
//! Dispatch is best-effort: a gateway failure for one recipient is logged
//! and never rolls back the committed state change or blocks the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use travo_core::domain::notification::{NotificationKind, NotificationMetadata};
use travo_core::domain::travel_request::TravelRequest;
use travo_core::domain::user::{Role, User};
use travo_core::hierarchy::ApprovalHierarchy;
use travo_db::repositories::{RepositoryError, UserRepository};
use travo_notify::{messages, NotificationGateway};

#[derive(Clone, Debug)]
pub enum RequestEvent {
    Submitted { request: TravelRequest },
    Validated { request: TravelRequest, code: String, expiration: DateTime<Utc> },
    ForwardedForReview { request: TravelRequest },
    Approved { request: TravelRequest, code: String, expiration: DateTime<Utc> },
    Rejected { request: TravelRequest },
    CodeReissued { request: TravelRequest, code: String, expiration: DateTime<Utc> },
    RemarksAdded { request: TravelRequest, remarks: String },
    CodesExpired { requester: User, original_codes: Vec<String> },
    TravelCompleted { requester: User, request_count: usize },
}

pub struct NotificationDispatcher {
    gateway: Arc<dyn NotificationGateway>,
    users: Arc<dyn UserRepository>,
    hierarchy: ApprovalHierarchy,
}

impl NotificationDispatcher {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        users: Arc<dyn UserRepository>,
        hierarchy: ApprovalHierarchy,
    ) -> Self {
        Self { gateway, users, hierarchy }
    }

    /// Fans an event out to its recipients. Never fails; per-recipient
    /// delivery errors are logged at warn.
    pub async fn dispatch(&self, event: RequestEvent) {
        match event {
            RequestEvent::Submitted { request } => self.on_submitted(request).await,
            RequestEvent::Validated { request, code, expiration }
            | RequestEvent::Approved { request, code, expiration }
            | RequestEvent::CodeReissued { request, code, expiration } => {
                let message = messages::request_approved(&request, &code, expiration);
                self.deliver(
                    &request.requester,
                    message,
                    NotificationKind::RequestApproved,
                    Some(NotificationMetadata::for_request(
                        format!("validated:{}", request.id.0),
                        request.id.0.clone(),
                    )),
                )
                .await;
            }
            RequestEvent::ForwardedForReview { request } => {
                self.on_forwarded(request).await;
            }
            RequestEvent::Rejected { request } => {
                let message = messages::request_rejected(&request);
                self.deliver(
                    &request.requester,
                    message,
                    NotificationKind::RequestRejected,
                    Some(NotificationMetadata::for_request(
                        format!("validated:{}", request.id.0),
                        request.id.0.clone(),
                    )),
                )
                .await;
            }
            RequestEvent::RemarksAdded { request, remarks } => {
                let message = messages::remarks_added(&request, &remarks);
                self.deliver(
                    &request.requester,
                    message,
                    NotificationKind::RemarksAdded,
                    Some(NotificationMetadata::for_request(
                        format!("remarks:{}", request.id.0),
                        request.id.0.clone(),
                    )),
                )
                .await;
            }
            RequestEvent::CodesExpired { requester, original_codes } => {
                let message = messages::codes_expired(original_codes.len());
                let metadata = NotificationMetadata {
                    notification_key: Some(format!("code-expired:{}", requester.id.0)),
                    travel_request_id: None,
                    security_codes: original_codes.clone(),
                    request_count: Some(original_codes.len() as u32),
                };
                self.deliver(&requester, message, NotificationKind::CodeExpired, Some(metadata))
                    .await;
            }
            RequestEvent::TravelCompleted { requester, request_count } => {
                let message = messages::travel_completed(request_count);
                let metadata = NotificationMetadata {
                    notification_key: Some(format!("travel-completed:{}", requester.id.0)),
                    travel_request_id: None,
                    security_codes: Vec::new(),
                    request_count: Some(request_count as u32),
                };
                self.deliver(&requester, message, NotificationKind::TravelCompleted, Some(metadata))
                    .await;
            }
        }
    }

    async fn on_submitted(&self, request: TravelRequest) {
        let receipt = messages::request_receipt(&request);
        self.deliver(
            &request.requester,
            receipt,
            NotificationKind::RequestReceipt,
            Some(NotificationMetadata::for_request(
                format!("receipt:{}", request.id.0),
                request.id.0.clone(),
            )),
        )
        .await;

        let approver_role = self.hierarchy.direct_approver(request.requester.role);
        let approvers = match self.users.find_by_role(approver_role).await {
            Ok(approvers) => approvers,
            Err(error) => {
                log_lookup_failure(&request, approver_role, &error);
                return;
            }
        };

        for approver in approvers {
            let message = messages::submitted_for_validation(&request);
            self.deliver(
                &approver,
                message,
                NotificationKind::RequestSubmitted,
                Some(NotificationMetadata::for_request(
                    format!("submitted:{}", request.id.0),
                    request.id.0.clone(),
                )),
            )
            .await;
        }
    }

    async fn on_forwarded(&self, request: TravelRequest) {
        let admins = match self.users.find_by_role(Role::Admin).await {
            Ok(admins) => admins,
            Err(error) => {
                log_lookup_failure(&request, Role::Admin, &error);
                return;
            }
        };

        for admin in admins {
            let message = messages::forwarded_for_review(&request);
            self.deliver(
                &admin,
                message,
                NotificationKind::RequestValidated,
                Some(NotificationMetadata::for_request(
                    format!("forwarded:{}", request.id.0),
                    request.id.0.clone(),
                )),
            )
            .await;
        }
    }

    async fn deliver(
        &self,
        recipient: &User,
        message: String,
        kind: NotificationKind,
        metadata: Option<NotificationMetadata>,
    ) {
        if let Err(error) = self.gateway.notify(recipient, message, kind, metadata).await {
            warn!(
                event_name = "notification_delivery_failed",
                user_id = %recipient.id.0,
                kind = %kind,
                error = %error,
                "dropping notification after gateway failure"
            );
        }
    }
}

fn log_lookup_failure(
    request: &TravelRequest,
    role: Role,
    error: &RepositoryError,
) {
    warn!(
        event_name = "notification_recipient_lookup_failed",
        travel_request_id = %request.id.0,
        role = %role,
        error = %error,
        "skipping fan-out for unresolved recipients"
    );
}

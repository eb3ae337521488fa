use thiserror::Error;

use crate::domain::travel_request::{RequestAction, RequestState};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid request transition: {action:?} is not allowed from {from:?}")]
    InvalidTransition { from: RequestState, action: RequestAction },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

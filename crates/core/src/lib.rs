//! Travo core - pure domain logic for the travel-authorization tracker.
//!
//! Everything here is synchronous and free of I/O: the request state machine,
//! the approval hierarchy, security-code issuance, working-day math, the
//! injectable clock, and configuration. Persistence and notification delivery
//! live in the sibling crates.

pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod hierarchy;
pub mod security_code;
pub mod workdays;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::DomainError;

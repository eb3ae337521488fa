//! Travel-request workflow orchestration: the approval service, the event
//! dispatcher that fans notifications out, and the background expiry sweep.

pub mod events;
pub mod service;
pub mod sweeper;

pub use events::{NotificationDispatcher, RequestEvent};
pub use service::{ReviewDecision, TravelRequestService, ValidationDecision, WorkflowError};
pub use sweeper::{spawn_scheduler, ExpirySweeper, SweepSummary};

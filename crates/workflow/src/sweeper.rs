//! Background expiry sweep over issued security codes.
//!
//! The sweep runs in two passes: first it expires codes whose validity
//! window has lapsed, then it closes out requests whose travel window has
//! fully ended. Both passes batch per requester so each user gets one
//! consolidated notification per run, and both are idempotent: rows a
//! previous run flagged but failed to clear are picked up again.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use travo_core::domain::travel_request::TravelRequest;
use travo_core::domain::user::User;
use travo_core::Clock;
use travo_db::repositories::TravelRequestRepository;

use crate::events::{NotificationDispatcher, RequestEvent};
use crate::service::WorkflowError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Requests whose security code was expired this run.
    pub expired: usize,
    /// Requests closed out because their travel window ended.
    pub cleared: usize,
}

pub struct ExpirySweeper {
    requests: Arc<dyn TravelRequestRepository>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ExpirySweeper {
    pub fn new(
        requests: Arc<dyn TravelRequestRepository>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self { requests, clock, dispatcher }
    }

    pub async fn run_once(&self) -> Result<SweepSummary, WorkflowError> {
        let now = self.clock.now();
        let mut summary = SweepSummary::default();

        let candidates = self.requests.list_code_expiry_candidates(now).await?;
        for (_, (requester, group)) in group_by_requester(candidates) {
            match self.expire_group(&group).await {
                Ok(original_codes) => {
                    summary.expired += group.len();
                    self.dispatcher
                        .dispatch(RequestEvent::CodesExpired {
                            requester: requester.clone(),
                            original_codes,
                        })
                        .await;
                }
                Err(error) => {
                    // One requester's failure must not starve the rest.
                    warn!(
                        event_name = "sweep_group_failed",
                        requester_id = %requester.id.0,
                        error = %error,
                        "skipping requester group after persistence failure"
                    );
                }
            }
        }

        // Fetched after the expiry pass persisted, so a request handled above
        // no longer carries a code and is not processed twice.
        let lapsed = self.requests.list_travel_window_lapsed(now).await?;
        for (_, (requester, group)) in group_by_requester(lapsed) {
            match self.complete_group(&group).await {
                Ok(()) => {
                    summary.cleared += group.len();
                    self.dispatcher
                        .dispatch(RequestEvent::TravelCompleted {
                            requester: requester.clone(),
                            request_count: group.len(),
                        })
                        .await;
                }
                Err(error) => {
                    warn!(
                        event_name = "sweep_group_failed",
                        requester_id = %requester.id.0,
                        error = %error,
                        "skipping requester group after persistence failure"
                    );
                }
            }
        }

        info!(
            event_name = "sweep_completed",
            expired = summary.expired,
            cleared = summary.cleared,
            "expiry sweep finished"
        );
        Ok(summary)
    }

    async fn expire_group(&self, group: &[TravelRequest]) -> Result<Vec<String>, WorkflowError> {
        let mut original_codes = Vec::new();
        for request in group {
            let mut request = request.clone();
            if let Some(code) = request.expire_code()? {
                original_codes.push(code);
            }
            self.requests.save(request).await?;
        }
        Ok(original_codes)
    }

    async fn complete_group(&self, group: &[TravelRequest]) -> Result<(), WorkflowError> {
        for request in group {
            let mut request = request.clone();
            request.complete_travel()?;
            self.requests.save(request).await?;
        }
        Ok(())
    }
}

/// Deterministic per-requester grouping, ordered by requester id.
fn group_by_requester(requests: Vec<TravelRequest>) -> BTreeMap<String, (User, Vec<TravelRequest>)> {
    let mut groups: BTreeMap<String, (User, Vec<TravelRequest>)> = BTreeMap::new();
    for request in requests {
        groups
            .entry(request.requester.id.0.clone())
            .or_insert_with(|| (request.requester.clone(), Vec::new()))
            .1
            .push(request);
    }
    groups
}

/// Spawns the periodic sweep. Errors from a run are logged and swallowed so
/// the timer loop keeps ticking.
pub fn spawn_scheduler(sweeper: Arc<ExpirySweeper>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        // The first tick fires immediately; skip it so startup is not a sweep.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweeper.run_once().await {
                Ok(summary) => {
                    info!(
                        event_name = "scheduled_sweep",
                        expired = summary.expired,
                        cleared = summary.cleared,
                        "scheduled sweep run finished"
                    );
                }
                Err(sweep_error) => {
                    error!(
                        event_name = "scheduled_sweep_failed",
                        error = %sweep_error,
                        "sweep run failed; will retry on the next tick"
                    );
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use travo_core::domain::travel_request::{
        CreateTravelRequest, RequestAction, RequestState, TravelRequest,
    };
    use travo_core::domain::user::{Role, User, UserId};
    use travo_core::hierarchy::ApprovalHierarchy;
    use travo_core::FixedClock;
    use travo_db::repositories::{
        InMemoryTravelRequestRepository, InMemoryUserRepository, TravelRequestRepository,
    };
    use travo_notify::RecordingGateway;

    use super::{ExpirySweeper, NotificationDispatcher};

    fn requester(id: &str) -> User {
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

    fn accepted_with_code(
        id_suffix: u32,
        owner: &User,
        code: &str,
        expiration: chrono::DateTime<chrono::Utc>,
    ) -> TravelRequest {
        let created_at = Utc.with_ymd_and_hms(2024, 4, 15, 8, 0, 0).unwrap();
        let mut request = TravelRequest::new(
            CreateTravelRequest {
                purpose: format!("Trip {id_suffix}"),
                start_date: created_at + Duration::days(2),
                end_date: created_at + Duration::days(60),
                departments: Vec::new(),
            },
            owner.clone(),
            created_at + Duration::minutes(i64::from(id_suffix)),
        );
        request.transition(RequestAction::Submit).expect("submit");
        request.transition(RequestAction::Validate).expect("validate");
        request.assign_code(code.to_string(), expiration).expect("assign");
        request
    }

    fn sweeper(
        repo: Arc<InMemoryTravelRequestRepository>,
        clock: Arc<FixedClock>,
        gateway: Arc<RecordingGateway>,
    ) -> ExpirySweeper {
        let dispatcher = NotificationDispatcher::new(
            gateway,
            Arc::new(InMemoryUserRepository::new()),
            ApprovalHierarchy::default(),
        );
        ExpirySweeper::new(repo, clock, Arc::new(dispatcher))
    }

    #[tokio::test]
    async fn batches_one_notification_per_requester() {
        let repo = Arc::new(InMemoryTravelRequestRepository::new());
        let gateway = Arc::new(RecordingGateway::new());
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));

        let alice = requester("u-alice");
        let bob = requester("u-bob");
        let lapsed = now - Duration::days(1);
        repo.save(accepted_with_code(1, &alice, "MD11111", lapsed)).await.expect("save");
        repo.save(accepted_with_code(2, &alice, "MD22222", lapsed)).await.expect("save");
        repo.save(accepted_with_code(3, &bob, "MD33333", lapsed)).await.expect("save");

        let summary =
            sweeper(repo.clone(), clock, gateway.clone()).run_once().await.expect("sweep");

        assert_eq!(summary.expired, 3);
        assert_eq!(gateway.sent_to("u-alice").await.len(), 1);
        assert_eq!(gateway.sent_to("u-bob").await.len(), 1);

        let alice_notice = gateway.sent_to("u-alice").await.remove(0);
        let metadata = alice_notice.metadata.expect("metadata present");
        assert_eq!(metadata.security_codes.len(), 2);
        assert_eq!(metadata.request_count, Some(2));
    }

    #[tokio::test]
    async fn reruns_pick_up_flagged_but_uncleared_rows() {
        let repo = Arc::new(InMemoryTravelRequestRepository::new());
        let gateway = Arc::new(RecordingGateway::new());
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(now));

        let alice = requester("u-alice");
        // Flagged by a previous run that crashed before clearing the code.
        let mut stuck = accepted_with_code(1, &alice, "MD11111", now + Duration::days(30));
        stuck.is_code_expired = true;
        repo.save(stuck.clone()).await.expect("save");

        let summary =
            sweeper(repo.clone(), clock, gateway.clone()).run_once().await.expect("sweep");

        assert_eq!(summary.expired, 1);
        let healed = repo.find_by_id(&stuck.id).await.expect("find").expect("row exists");
        assert_eq!(healed.state, RequestState::Expired);
        assert!(healed.security_code.is_none());
    }

    #[tokio::test]
    async fn empty_database_sweeps_to_a_zero_summary() {
        let repo = Arc::new(InMemoryTravelRequestRepository::new());
        let gateway = Arc::new(RecordingGateway::new());
        let clock =
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 15, 8, 0, 0).unwrap()));

        let summary = sweeper(repo, clock, gateway.clone()).run_once().await.expect("sweep");

        assert_eq!(summary.expired, 0);
        assert_eq!(summary.cleared, 0);
        assert!(gateway.sent().await.is_empty());
    }
}

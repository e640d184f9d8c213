use crate::error::Result;
use crate::events::{EventBus, NavPhase, ScreeningEvent};
use crate::session::{ReportId, SessionState, SessionStore, SubmissionStatus};
use crate::submission::SubmissionGateway;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Outcome of a forward move
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the step at this index
    Moved(usize),
    /// The last step was confirmed and the report stored
    Submitted(ReportId),
    /// Gating refused the move, nothing changed
    Blocked,
    /// The report was stored, but the session was reset while it was in
    /// flight. The current session is left as the reset made it.
    Discarded(ReportId),
}

enum Plan {
    Blocked,
    Move(usize),
    Submit(SessionState),
}

/// Moves through the session and triggers submission after the last step.
///
/// Only this controller changes the step index and the submission status.
pub struct NavigationController {
    store: Arc<SessionStore>,
    gateway: Arc<SubmissionGateway>,
    events: EventBus,
    user_id: String,
}

impl NavigationController {
    pub fn new(
        store: Arc<SessionStore>,
        gateway: Arc<SubmissionGateway>,
        events: EventBus,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            events,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Forward is allowed once the current step has a result, unless a
    /// submission is running or already went through.
    pub fn can_go_next(state: &SessionState) -> bool {
        state.current_result().is_some()
            && !matches!(
                state.submission_status(),
                SubmissionStatus::Submitting | SubmissionStatus::Submitted
            )
    }

    pub fn can_go_back(state: &SessionState) -> bool {
        state.current_step_index() > 0
            && state.submission_status() != SubmissionStatus::Submitting
    }

    pub fn phase_of(state: &SessionState) -> NavPhase {
        match state.submission_status() {
            SubmissionStatus::Submitting => NavPhase::Submitting,
            SubmissionStatus::Submitted => NavPhase::Done,
            SubmissionStatus::NotSubmitted | SubmissionStatus::Failed => {
                NavPhase::Viewing(state.current_step_index())
            }
        }
    }

    pub fn phase(&self) -> NavPhase {
        Self::phase_of(&self.store.snapshot())
    }

    /// Move to the next step, or submit when on the last one.
    ///
    /// A refused move is a no-op. A failed submission leaves the session in
    /// `Failed` with every result kept, so calling `advance` again retries.
    pub async fn advance(&self) -> Result<Advance> {
        let plan = self.store.apply(|state| -> Result<Plan> {
            if !Self::can_go_next(state) {
                return Ok(Plan::Blocked);
            }
            if !state.is_last_step() {
                let next = state.current_step_index() + 1;
                state.set_index(next);
                return Ok(Plan::Move(next));
            }
            state.transition(SubmissionStatus::Submitting)?;
            Ok(Plan::Submit(state.clone()))
        })?;

        match plan {
            Plan::Blocked => {
                debug!("Advance blocked at {}", self.phase());
                Ok(Advance::Blocked)
            }
            Plan::Move(next) => {
                self.publish_phase(NavPhase::Advancing);
                self.publish_phase(NavPhase::Viewing(next));
                debug!("Advanced to step {}", next);
                Ok(Advance::Moved(next))
            }
            Plan::Submit(snapshot) => self.submit(snapshot).await,
        }
    }

    async fn submit(&self, snapshot: SessionState) -> Result<Advance> {
        let epoch = snapshot.epoch();
        self.publish_phase(NavPhase::Submitting);
        self.publish_status(SubmissionStatus::Submitting, None);

        let mut pending = PendingSubmission {
            controller: self,
            epoch,
            step_index: snapshot.current_step_index(),
            settled: false,
        };
        let outcome = self.gateway.submit(&snapshot, &self.user_id).await;
        pending.settled = true;

        match outcome {
            Ok(report_id) => {
                if !self.store.finish_submission(epoch, Some(report_id.clone()))? {
                    warn!(
                        "Report {} stored for a session that was reset meanwhile",
                        report_id
                    );
                    return Ok(Advance::Discarded(report_id));
                }
                self.publish_status(SubmissionStatus::Submitted, Some(report_id.clone()));
                self.publish_phase(NavPhase::Done);
                info!("Screening submitted as report {}", report_id);
                Ok(Advance::Submitted(report_id))
            }
            Err(e) => {
                if self.store.finish_submission(epoch, None)? {
                    self.publish_status(SubmissionStatus::Failed, None);
                    self.publish_phase(NavPhase::Viewing(snapshot.current_step_index()));
                }
                warn!("Submission failed, results kept for retry: {}", e);
                Err(e)
            }
        }
    }

    /// Step back one step when allowed. Returns the index afterwards.
    pub fn retreat(&self) -> usize {
        let moved = self.store.apply(|state| {
            if !Self::can_go_back(state) {
                return None;
            }
            let previous = state.current_step_index() - 1;
            state.set_index(previous);
            Some(previous)
        });

        match moved {
            Some(previous) => {
                self.publish_phase(NavPhase::Viewing(previous));
                debug!("Went back to step {}", previous);
                previous
            }
            None => self.store.snapshot().current_step_index(),
        }
    }

    fn publish_phase(&self, phase: NavPhase) {
        self.events.notify(ScreeningEvent::PhaseChanged {
            phase,
            timestamp: SystemTime::now(),
        });
    }

    fn publish_status(&self, status: SubmissionStatus, report_id: Option<ReportId>) {
        self.events.notify(ScreeningEvent::SubmissionStatusChanged {
            status,
            report_id,
            timestamp: SystemTime::now(),
        });
    }
}

/// Live while the gateway call of `submit` is awaited. Dropping it before
/// the outcome is in, e.g. because the `advance` future was dropped, moves
/// the session from `Submitting` to `Failed` so it can be retried.
struct PendingSubmission<'a> {
    controller: &'a NavigationController,
    epoch: u64,
    step_index: usize,
    settled: bool,
}

impl Drop for PendingSubmission<'_> {
    fn drop(&mut self) {
        if self.settled || !self.controller.store.abandon_submission(self.epoch) {
            return;
        }
        warn!("Submission abandoned before it finished, results kept for retry");
        self.controller.publish_status(SubmissionStatus::Failed, None);
        self.controller.publish_phase(NavPhase::Viewing(self.step_index));
    }
}

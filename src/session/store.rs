use super::state::{ReportId, SessionState, SubmissionStatus};
use crate::error::{CaptureError, Result};
use crate::results::StepResult;
use crate::steps::{StepId, StepRegistry};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Single source of truth for one screening session.
///
/// Every operation takes the lock for the duration of a plain state update
/// and never across an await, so updates are serialized without blocking
/// the async caller.
pub struct SessionStore {
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            state: RwLock::new(SessionState::new(registry)),
        }
    }

    /// Store the result for `step`, replacing any earlier one.
    ///
    /// Fails without touching the state when the step is not in the registry,
    /// the result belongs to another step, or the session is submitting or
    /// already submitted.
    pub fn set_step_result(&self, step: StepId, result: StepResult) -> Result<()> {
        let mut state = self.state.write();
        record(&mut state, step, result)
    }

    /// Store a result captured while the session was at `epoch`. Returns
    /// false, leaving the state alone, when the session was reset since.
    pub(crate) fn set_step_result_for(
        &self,
        epoch: u64,
        step: StepId,
        result: StepResult,
    ) -> Result<bool> {
        let mut state = self.state.write();
        if state.epoch() != epoch {
            debug!(
                "Dropping {} result captured before a reset (epoch {})",
                step, epoch
            );
            return Ok(false);
        }
        record(&mut state, step, result)?;
        Ok(true)
    }

    /// Store a result addressed by step name
    pub fn set_step_result_named(&self, step: &str, result: StepResult) -> Result<()> {
        let step = step.parse::<StepId>()?;
        self.set_step_result(step, result)
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn progress_percent(&self) -> f64 {
        self.state.read().progress_percent()
    }

    pub fn submission_status(&self) -> SubmissionStatus {
        self.state.read().submission_status()
    }

    /// Restore the empty initial state. In-flight captures are not touched.
    pub fn reset_session(&self) {
        let mut state = self.state.write();
        let next_epoch = state.epoch() + 1;
        *state = SessionState::with_epoch(state.registry_handle(), next_epoch);
        info!("Screening session reset (epoch {})", next_epoch);
    }

    /// Run `f` against the state under the write lock. Used by the navigation
    /// controller for index and submission status changes.
    pub(crate) fn apply<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.write();
        f(&mut state)
    }

    /// Move a submission of `epoch` that never produced an outcome from
    /// `Submitting` to `Failed`. Returns false when there was nothing to do.
    pub(crate) fn abandon_submission(&self, epoch: u64) -> bool {
        let mut state = self.state.write();
        if state.epoch() != epoch || state.submission_status() != SubmissionStatus::Submitting {
            return false;
        }
        state.transition(SubmissionStatus::Failed).is_ok()
    }

    /// Record the outcome of a submission started in `epoch`. Outcomes for a
    /// session that has since been reset are dropped.
    pub(crate) fn finish_submission(
        &self,
        epoch: u64,
        outcome: Option<ReportId>,
    ) -> Result<bool> {
        let mut state = self.state.write();
        if state.epoch() != epoch {
            warn!(
                "Dropping submission outcome for epoch {} (session is at epoch {})",
                epoch,
                state.epoch()
            );
            return Ok(false);
        }

        match outcome {
            Some(report_id) => {
                state.transition(SubmissionStatus::Submitted)?;
                state.attach_report_id(report_id);
            }
            None => state.transition(SubmissionStatus::Failed)?,
        }
        Ok(true)
    }
}

fn record(state: &mut SessionState, step: StepId, result: StepResult) -> Result<()> {
    if !state.accepts_results() {
        warn!(
            "Rejected {} result, session is {}",
            step,
            state.submission_status()
        );
        return Err(state.locked(step));
    }

    let index = match state.registry().index_of(step) {
        Ok(index) => index,
        Err(e) => {
            warn!("Rejected result for step outside the registry: {}", step);
            return Err(e.into());
        }
    };

    if result.step() != step {
        return Err(CaptureError::InvalidPayload {
            step,
            reason: format!("result belongs to step '{}'", result.step()),
        }
        .into());
    }

    state.put_result(index, result);
    debug!(
        "Recorded result for {} ({:.0}% complete)",
        step,
        state.progress_percent()
    );
    Ok(())
}

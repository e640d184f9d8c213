use crate::error::{Result, ScreeningError};
use crate::results::StepResult;
use crate::steps::{StepId, StepRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Server-issued identifier for a stored report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    NotSubmitted,
    Submitting,
    Submitted,
    Failed,
}

impl SubmissionStatus {
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (NotSubmitted, Submitting)
                | (Submitting, Submitted)
                | (Submitting, Failed)
                | (Failed, Submitting)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Progress of one user through the screening steps.
///
/// `results` holds one slot per registry entry, so the key set always
/// equals the registry. Progress is derived from the slots on demand.
#[derive(Debug, Clone)]
pub struct SessionState {
    registry: Arc<StepRegistry>,
    session_id: Uuid,
    epoch: u64,
    current_step_index: usize,
    results: Vec<Option<StepResult>>,
    submission_status: SubmissionStatus,
    report_id: Option<ReportId>,
}

impl SessionState {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self::with_epoch(registry, 0)
    }

    pub(crate) fn with_epoch(registry: Arc<StepRegistry>, epoch: u64) -> Self {
        let results = vec![None; registry.len()];
        Self {
            registry,
            session_id: Uuid::new_v4(),
            epoch,
            current_step_index: 0,
            results,
            submission_status: SubmissionStatus::NotSubmitted,
            report_id: None,
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub(crate) fn registry_handle(&self) -> Arc<StepRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn current_step(&self) -> StepId {
        // The index is kept within bounds by every mutation
        self.registry
            .iter()
            .nth(self.current_step_index)
            .unwrap_or(StepId::Questionnaire)
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step_index == self.registry.last_index()
    }

    pub fn submission_status(&self) -> SubmissionStatus {
        self.submission_status
    }

    /// Results are frozen while a submission runs and once it went through
    pub fn accepts_results(&self) -> bool {
        !matches!(
            self.submission_status,
            SubmissionStatus::Submitting | SubmissionStatus::Submitted
        )
    }

    /// Error for a write refused by `accepts_results`
    pub(crate) fn locked(&self, step: StepId) -> ScreeningError {
        ScreeningError::SessionLocked {
            step,
            status: self.submission_status.to_string(),
        }
    }

    pub fn report_id(&self) -> Option<&ReportId> {
        self.report_id.as_ref()
    }

    /// Result for `step`, None when absent or not part of this registry
    pub fn result(&self, step: StepId) -> Option<&StepResult> {
        let index = self.registry.index_of(step).ok()?;
        self.results[index].as_ref()
    }

    pub fn current_result(&self) -> Option<&StepResult> {
        self.results[self.current_step_index].as_ref()
    }

    /// Every registry step with its slot, in order
    pub fn results(&self) -> impl Iterator<Item = (StepId, Option<&StepResult>)> + '_ {
        self.registry
            .iter()
            .zip(self.results.iter().map(Option::as_ref))
    }

    pub fn completed_count(&self) -> usize {
        self.results.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn missing_steps(&self) -> Vec<StepId> {
        self.results()
            .filter(|(_, slot)| slot.is_none())
            .map(|(step, _)| step)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(Option::is_some)
    }

    pub fn progress_percent(&self) -> f64 {
        100.0 * self.completed_count() as f64 / self.results.len() as f64
    }

    /// Progress rounded to a whole percent, as shown in the progress bar
    pub fn progress_rounded(&self) -> u32 {
        self.progress_percent().round() as u32
    }

    pub(crate) fn put_result(&mut self, index: usize, result: StepResult) {
        self.results[index] = Some(result);
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        debug_assert!(index < self.results.len());
        self.current_step_index = index.min(self.results.len() - 1);
    }

    pub(crate) fn transition(&mut self, next: SubmissionStatus) -> Result<()> {
        if !self.submission_status.can_transition_to(next) {
            return Err(ScreeningError::InvalidTransition {
                from: self.submission_status.to_string(),
                to: next.to_string(),
            });
        }
        self.submission_status = next;
        Ok(())
    }

    pub(crate) fn attach_report_id(&mut self, report_id: ReportId) {
        self.report_id = Some(report_id);
    }
}

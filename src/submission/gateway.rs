use super::report::ReportDocument;
use super::sink::ReportSink;
use crate::error::{Result, SubmissionCause, SubmissionError};
use crate::session::{ReportId, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Hands complete sessions to the report sink, one at a time
pub struct SubmissionGateway {
    sink: Arc<dyn ReportSink>,
    in_flight: AtomicBool,
    timeout: Option<Duration>,
}

impl SubmissionGateway {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            in_flight: AtomicBool::new(false),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Persist the session as a report.
    ///
    /// An incomplete session fails before the sink is contacted. A call made
    /// while another is in flight fails with `InProgress`. Failures are not
    /// retried here.
    pub async fn submit(&self, state: &SessionState, user_id: &str) -> Result<ReportId> {
        let document = ReportDocument::from_state(state, user_id)?;
        let _guard = InFlight::enter(&self.in_flight)?;

        info!(
            "Submitting session {} (risk: {})",
            document.session_id, document.risk_level
        );

        let store = self.sink.store(&document);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, store).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SubmissionError::Failed {
                    cause: SubmissionCause::Timeout,
                }
                .into()),
            },
            None => store.await,
        };

        match &outcome {
            Ok(id) => info!("Session {} stored as report {}", document.session_id, id),
            Err(e) => error!("Submission of session {} failed: {}", document.session_id, e),
        }
        outcome
    }
}

struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SubmissionError::InProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

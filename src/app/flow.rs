use super::auth::AuthState;
use crate::capture::CaptureAdapter;
use crate::error::{Result, ScreeningError};
use crate::events::{EventBus, NavPhase, ScreeningEvent};
use crate::navigation::{Advance, NavigationController};
use crate::results::StepResult;
use crate::session::{SessionState, SessionStore, SubmissionStatus};
use crate::steps::{StepId, StepRegistry};
use crate::submission::SubmissionGateway;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owner of one screening session.
///
/// Captures run under child tokens of the flow's token, so `restart` and
/// `cancel_captures` stop every capture that is still running.
pub struct ScreeningFlow {
    store: Arc<SessionStore>,
    controller: NavigationController,
    capture: Arc<dyn CaptureAdapter>,
    events: EventBus,
    cancel: Mutex<CancellationToken>,
}

/// Builder for `ScreeningFlow`
pub struct ScreeningFlowBuilder {
    registry: Arc<StepRegistry>,
    capture: Option<Arc<dyn CaptureAdapter>>,
    gateway: Option<Arc<SubmissionGateway>>,
    events: Option<EventBus>,
}

impl ScreeningFlowBuilder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(StepRegistry::standard()),
            capture: None,
            gateway: None,
            events: None,
        }
    }

    pub fn registry(mut self, registry: StepRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn capture(mut self, capture: Arc<dyn CaptureAdapter>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn gateway(mut self, gateway: Arc<SubmissionGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Start a session for the signed-in user
    pub fn start(self, auth: &AuthState) -> Result<ScreeningFlow> {
        let user_id = auth.require_user()?;

        let capture = self
            .capture
            .ok_or_else(|| ScreeningError::system("Screening flow needs a capture adapter"))?;
        let gateway = self
            .gateway
            .ok_or_else(|| ScreeningError::system("Screening flow needs a submission gateway"))?;
        let events = self.events.unwrap_or_else(|| EventBus::new(64));

        let store = Arc::new(SessionStore::new(self.registry));
        let controller =
            NavigationController::new(Arc::clone(&store), gateway, events.clone(), user_id);

        info!(
            "Screening session {} started for user {} ({} steps)",
            store.snapshot().session_id(),
            user_id,
            store.snapshot().registry().len()
        );
        events.notify(ScreeningEvent::PhaseChanged {
            phase: NavPhase::Viewing(0),
            timestamp: SystemTime::now(),
        });

        Ok(ScreeningFlow {
            store,
            controller,
            capture,
            events,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }
}

impl Default for ScreeningFlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreeningFlow {
    pub fn builder() -> ScreeningFlowBuilder {
        ScreeningFlowBuilder::new()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn snapshot(&self) -> SessionState {
        self.store.snapshot()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn user_id(&self) -> &str {
        self.controller.user_id()
    }

    pub fn phase(&self) -> NavPhase {
        self.controller.phase()
    }

    pub fn can_go_next(&self) -> bool {
        NavigationController::can_go_next(&self.store.snapshot())
    }

    pub fn can_go_back(&self) -> bool {
        NavigationController::can_go_back(&self.store.snapshot())
    }

    /// Capture the step the session is currently on
    pub async fn capture_current(&self) -> Result<()> {
        let step = self.store.snapshot().current_step();
        self.capture_step(step).await
    }

    /// Run the capture for `step` and record its result.
    ///
    /// A failed or cancelled capture records nothing. A capture that
    /// finishes after a restart is discarded. Nothing is captured while the
    /// session is submitting or submitted.
    pub async fn capture_step(&self, step: StepId) -> Result<()> {
        let (epoch, registry) = {
            let state = self.store.snapshot();
            if !state.accepts_results() {
                return Err(state.locked(step));
            }
            (state.epoch(), state.registry_handle())
        };
        registry.index_of(step)?;

        let token = self.cancel.lock().child_token();
        self.events.notify(ScreeningEvent::CaptureStarted {
            step,
            timestamp: SystemTime::now(),
        });

        let result = match self.capture.capture(step, &token).await {
            Ok(result) => result,
            Err(e) => {
                self.events.notify(ScreeningEvent::CaptureFailed {
                    step,
                    error: e.to_string(),
                    timestamp: SystemTime::now(),
                });
                return Err(e);
            }
        };

        self.record(epoch, step, result)
    }

    fn record(&self, epoch: u64, step: StepId, result: StepResult) -> Result<()> {
        if !self.store.set_step_result_for(epoch, step, result)? {
            warn!("Session was restarted during the {} capture", step);
            return Ok(());
        }

        self.events.notify(ScreeningEvent::StepRecorded {
            step,
            progress_percent: self.store.progress_percent(),
            timestamp: SystemTime::now(),
        });
        Ok(())
    }

    /// Next button: advance, or submit on the last step
    pub async fn next(&self) -> Result<Advance> {
        self.controller.advance().await
    }

    /// Back button
    pub fn back(&self) -> usize {
        self.controller.retreat()
    }

    /// Stop every running capture. The session keeps its results.
    pub fn cancel_captures(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
        debug!("Cancelled running captures");
    }

    /// Drop the session and begin an empty one
    pub fn restart(&self) {
        self.cancel_captures();
        self.store.reset_session();
        self.events.notify(ScreeningEvent::SessionReset {
            timestamp: SystemTime::now(),
        });
        self.events.notify(ScreeningEvent::PhaseChanged {
            phase: NavPhase::Viewing(0),
            timestamp: SystemTime::now(),
        });
    }

    /// Close a submitted session and begin the next one
    pub fn acknowledge_submission(&self) -> Result<()> {
        let status = self.store.submission_status();
        if status != SubmissionStatus::Submitted {
            return Err(ScreeningError::InvalidTransition {
                from: status.to_string(),
                to: SubmissionStatus::NotSubmitted.to_string(),
            });
        }

        info!("Submission acknowledged, starting a new session");
        self.restart();
        Ok(())
    }
}

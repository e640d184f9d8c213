use crate::error::EventBusError;
use crate::session::{ReportId, SubmissionStatus};
use crate::steps::StepId;
use serde::Serialize;
use std::fmt;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Navigation phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavPhase {
    Viewing(usize),
    Advancing,
    Submitting,
    Done,
}

impl fmt::Display for NavPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavPhase::Viewing(index) => write!(f, "viewing step {}", index + 1),
            NavPhase::Advancing => f.write_str("advancing"),
            NavPhase::Submitting => f.write_str("submitting"),
            NavPhase::Done => f.write_str("done"),
        }
    }
}

/// Events that can occur during a screening session
#[derive(Debug, Clone, Serialize)]
pub enum ScreeningEvent {
    /// A capture adapter started acquiring input for a step
    CaptureStarted { step: StepId, timestamp: SystemTime },
    /// A capture finished with a result that was stored
    StepRecorded {
        step: StepId,
        progress_percent: f64,
        timestamp: SystemTime,
    },
    /// A capture ended without a result
    CaptureFailed {
        step: StepId,
        error: String,
        timestamp: SystemTime,
    },
    /// The navigation phase changed
    PhaseChanged { phase: NavPhase, timestamp: SystemTime },
    /// The submission status changed
    SubmissionStatusChanged {
        status: SubmissionStatus,
        report_id: Option<ReportId>,
        timestamp: SystemTime,
    },
    /// The session was cleared
    SessionReset { timestamp: SystemTime },
}

impl ScreeningEvent {
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ScreeningEvent::CaptureStarted { timestamp, .. } => *timestamp,
            ScreeningEvent::StepRecorded { timestamp, .. } => *timestamp,
            ScreeningEvent::CaptureFailed { timestamp, .. } => *timestamp,
            ScreeningEvent::PhaseChanged { timestamp, .. } => *timestamp,
            ScreeningEvent::SubmissionStatusChanged { timestamp, .. } => *timestamp,
            ScreeningEvent::SessionReset { timestamp } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScreeningEvent::CaptureStarted { step, .. } => format!("Capture started: {}", step),
            ScreeningEvent::StepRecorded {
                step,
                progress_percent,
                ..
            } => format!("Recorded {} ({:.0}% complete)", step, progress_percent),
            ScreeningEvent::CaptureFailed { step, error, .. } => {
                format!("Capture failed for {}: {}", step, error)
            }
            ScreeningEvent::PhaseChanged { phase, .. } => format!("Phase: {}", phase),
            ScreeningEvent::SubmissionStatusChanged {
                status, report_id, ..
            } => match report_id {
                Some(id) => format!("Submission {} (report {})", status, id),
                None => format!("Submission {}", status),
            },
            ScreeningEvent::SessionReset { .. } => "Session reset".to_string(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScreeningEvent::CaptureStarted { .. } => "capture_started",
            ScreeningEvent::StepRecorded { .. } => "step_recorded",
            ScreeningEvent::CaptureFailed { .. } => "capture_failed",
            ScreeningEvent::PhaseChanged { .. } => "phase_changed",
            ScreeningEvent::SubmissionStatusChanged { .. } => "submission_status_changed",
            ScreeningEvent::SessionReset { .. } => "session_reset",
        }
    }
}

/// Async event bus for session observers using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<ScreeningEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ScreeningEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ScreeningEvent) -> Result<usize, EventBusError> {
        debug!("Publishing event: {}", event.description());

        match &event {
            ScreeningEvent::CaptureFailed { step, error, .. } => {
                warn!("Capture failed for {}: {}", step, error);
            }
            ScreeningEvent::SubmissionStatusChanged {
                status: SubmissionStatus::Failed,
                ..
            } => {
                error!("Submission failed");
            }
            ScreeningEvent::SubmissionStatusChanged {
                status: SubmissionStatus::Submitted,
                report_id,
                ..
            } => {
                info!(
                    "Submission accepted: {}",
                    report_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-")
                );
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish without caring whether anyone is listening
    pub fn notify(&self, event: ScreeningEvent) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.publish(event) {
            debug!("Event not delivered: {}", e);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Accept events concerning specific steps
    Steps(Vec<StepId>),
}

impl EventFilter {
    pub fn matches(&self, event: &ScreeningEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Steps(steps) => match event {
                ScreeningEvent::CaptureStarted { step, .. }
                | ScreeningEvent::StepRecorded { step, .. }
                | ScreeningEvent::CaptureFailed { step, .. } => steps.contains(step),
                _ => false,
            },
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScreeningEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<ScreeningEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<ScreeningEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<ScreeningEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

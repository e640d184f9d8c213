pub mod analyzer;
pub mod app;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod manifest;
pub mod navigation;
pub mod results;
pub mod session;
pub mod steps;
pub mod submission;

#[cfg(test)]
pub(crate) mod test_support;

pub use app::{AuthState, ScreeningFlow, ScreeningFlowBuilder};
pub use config::ScreeningConfig;
pub use error::{Result, ScreeningError};
pub use events::{EventBus, EventFilter, EventReceiver, NavPhase, ScreeningEvent};
pub use navigation::{Advance, NavigationController};
pub use results::{RiskLevel, StepResult};
pub use session::{ReportId, SessionState, SessionStore, SubmissionStatus};
pub use steps::{StepId, StepRegistry};
pub use submission::{ReportDocument, ReportSink, SubmissionGateway};

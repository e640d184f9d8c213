mod state;
mod store;

pub use state::{ReportId, SessionState, SubmissionStatus};
pub use store::SessionStore;

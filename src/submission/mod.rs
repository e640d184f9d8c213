mod gateway;
mod report;
mod sink;

pub use gateway::SubmissionGateway;
pub use report::ReportDocument;
pub use sink::{HttpReportSink, ReportSink};

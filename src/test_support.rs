//! Fixtures shared by the unit tests of several modules.

use crate::results::{ImageAnalysis, QuestionnaireResult, StepResult, TranscriptResult, WearableResult};
use crate::steps::StepId;
use serde_json::{json, Map, Value};

pub(crate) fn questionnaire_answers() -> Map<String, Value> {
    let mut answers = Map::new();
    answers.insert("Age".to_string(), json!(52));
    answers.insert("Gender".to_string(), json!("Female"));
    answers.insert("Height".to_string(), json!(164));
    answers.insert("Weight".to_string(), json!(81));
    answers.insert("Blood Glucose".to_string(), json!(118));
    answers.insert("HbA1c".to_string(), json!(6.1));
    answers
}

pub(crate) fn sample_result(step: StepId) -> StepResult {
    match step {
        StepId::Questionnaire => StepResult::Questionnaire(QuestionnaireResult {
            answers: questionnaire_answers(),
            assessment: None,
        }),
        StepId::Wearable => StepResult::Wearable(WearableResult {
            records: vec![json!({"steps": 5400, "resting_heart_rate": 71})],
        }),
        StepId::Transcript => StepResult::Transcript(TranscriptResult {
            text: "Fasting glucose 131 mg/dL, HbA1c 6.1%".to_string(),
            analysis: None,
        }),
        image_step => StepResult::image(
            image_step,
            ImageAnalysis::from_response(json!({"risk_level": "low"})),
        )
        .expect("image step"),
    }
}

/// Encoded image bytes of the given size for capture tests
#[cfg(feature = "image_validation")]
pub(crate) fn image_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::new(width, height);
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageOutputFormat::Png)
        .expect("encode test image");
    buffer.into_inner()
}

#[cfg(not(feature = "image_validation"))]
pub(crate) fn image_bytes(width: u32, height: u32) -> Vec<u8> {
    vec![0x5A; (width * height).max(1) as usize]
}

/// Serve `router` on an ephemeral local port and return its base URL
pub(crate) async fn serve_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Base URL of a port nothing listens on
pub(crate) async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind free port");
    let addr = listener.local_addr().expect("free port address");
    drop(listener);
    format!("http://{}", addr)
}

/// In-process analyzer that answers with a fixed reply after `delay`
pub(crate) struct MockAnalyzer {
    reply: Value,
    delay: std::time::Duration,
    healthy: bool,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockAnalyzer {
    pub(crate) fn new(reply: Value) -> Self {
        Self {
            reply,
            delay: std::time::Duration::ZERO,
            healthy: true,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl crate::analyzer::ImageAnalyzer for MockAnalyzer {
    async fn analyze(&self, _step: StepId, _frame: &crate::camera::Frame) -> crate::Result<Value> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }

    async fn health(&self, step: StepId) -> crate::Result<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(crate::error::CaptureError::DeviceUnavailable {
                step,
                reason: "health check returned 503".to_string(),
            }
            .into())
        }
    }
}

/// A frame for every image step
pub(crate) fn image_frames() -> crate::camera::StaticFrameSource {
    StepId::ALL
        .iter()
        .filter(|step| step.is_image_step())
        .fold(crate::camera::StaticFrameSource::new(), |source, step| {
            source.with_frame(
                *step,
                crate::camera::Frame::new(image_bytes(64, 64), format!("{}.png", step)),
            )
        })
}

/// Valid input for every form step
pub(crate) fn form_inputs() -> crate::capture::StaticFormSource {
    use crate::capture::FormInput;

    crate::capture::StaticFormSource::new()
        .with_input(StepId::Questionnaire, FormInput::Answers(questionnaire_answers()))
        .with_input(
            StepId::Wearable,
            FormInput::Records(json!([{"steps": 5400, "resting_heart_rate": 71}])),
        )
        .with_input(
            StepId::Transcript,
            FormInput::Text("Fasting glucose 131 mg/dL".to_string()),
        )
}

/// Router covering all seven steps, backed by `analyzer`
pub(crate) fn full_router(
    analyzer: std::sync::Arc<MockAnalyzer>,
) -> (crate::capture::CaptureRouter, crate::camera::DeviceSlot) {
    use std::sync::Arc;

    let slot = crate::camera::DeviceSlot::new("test-camera");
    let camera = crate::capture::CameraCapture::new(slot.clone(), Arc::new(image_frames()), analyzer);
    let forms = crate::capture::FormCapture::new(Arc::new(form_inputs()));

    let router = crate::capture::CaptureRouter::new()
        .with_adapter(Arc::new(camera))
        .with_adapter(Arc::new(forms));
    (router, slot)
}

/// Report sink that counts calls and can be told to fail
pub(crate) struct CountingSink {
    calls: std::sync::atomic::AtomicUsize,
    failing: std::sync::atomic::AtomicBool,
    delay: std::time::Duration,
    stored: parking_lot::Mutex<Vec<crate::submission::ReportDocument>>,
}

impl CountingSink {
    pub(crate) fn new() -> Self {
        Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
            failing: std::sync::atomic::AtomicBool::new(false),
            delay: std::time::Duration::ZERO,
            stored: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub(crate) fn stored(&self) -> Vec<crate::submission::ReportDocument> {
        self.stored.lock().clone()
    }
}

#[async_trait::async_trait]
impl crate::submission::ReportSink for CountingSink {
    async fn store(
        &self,
        report: &crate::submission::ReportDocument,
    ) -> crate::Result<crate::session::ReportId> {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;

        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::error::SubmissionError::Failed {
                cause: crate::error::SubmissionCause::Transport("connection reset".to_string()),
            }
            .into());
        }

        self.stored.lock().push(report.clone());
        Ok(crate::session::ReportId(format!("report-{}", call)))
    }

    async fn fetch(&self, id: &crate::session::ReportId) -> crate::Result<Value> {
        Ok(json!({"id": id.0}))
    }

    async fn list_for_user(&self, user_id: &str) -> crate::Result<Vec<Value>> {
        Ok(self
            .stored()
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| json!({"sessionId": r.session_id}))
            .collect())
    }
}

/// Store whose session already holds a result for every step
pub(crate) fn complete_store() -> crate::session::SessionStore {
    let store = crate::session::SessionStore::new(std::sync::Arc::new(
        crate::steps::StepRegistry::standard(),
    ));
    for step in StepId::ALL {
        store
            .set_step_result(step, sample_result(step))
            .expect("fixture result");
    }
    store
}

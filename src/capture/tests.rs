use super::*;
use crate::camera::{DeviceSlot, Frame, FrameLimits, StaticFrameSource};
use crate::error::{CaptureError, ScreeningError};
use crate::results::{RiskLevel, StepResult};
use crate::steps::StepId;
use crate::analyzer::TranscriptAnalyzer;
use crate::test_support::{
    form_inputs, full_router, image_frames, questionnaire_answers, serve_stub, MockAnalyzer,
};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn camera_with(analyzer: Arc<MockAnalyzer>) -> CameraCapture {
    CameraCapture::new(
        DeviceSlot::new("test-camera"),
        Arc::new(image_frames()),
        analyzer,
    )
}

#[tokio::test]
async fn test_camera_capture_produces_image_result() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({
        "analysis": {"severity_level": "Severe"},
        "recommendations": ["See an ophthalmologist"]
    })));
    let capture = camera_with(analyzer.clone());

    let result = capture
        .capture(StepId::Eye, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.step(), StepId::Eye);
    assert_eq!(result.risk_level(), Some(RiskLevel::High));
    assert_eq!(analyzer.calls(), 1);
    assert!(!capture.is_device_held());
}

#[tokio::test]
async fn test_camera_capture_busy_device() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({})).with_delay(Duration::from_millis(200)));
    let capture = Arc::new(camera_with(analyzer));
    let cancel = CancellationToken::new();

    let first = {
        let capture = capture.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { capture.capture(StepId::Skin, &cancel).await })
    };

    while !capture.is_device_held() {
        tokio::task::yield_now().await;
    }

    let err = capture.capture(StepId::Body, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::DeviceBusy { .. })
    ));

    assert!(first.await.unwrap().is_ok());
    assert!(!capture.is_device_held());
}

#[tokio::test]
async fn test_cancelled_capture_releases_device() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({})).with_delay(Duration::from_secs(30)));
    let capture = Arc::new(camera_with(analyzer));
    let cancel = CancellationToken::new();

    let pending = {
        let capture = capture.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { capture.capture(StepId::Metabolic, &cancel).await })
    };

    while !capture.is_device_held() {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::Cancelled { step: StepId::Metabolic })
    ));
    assert!(!capture.is_device_held());
}

#[tokio::test]
async fn test_already_cancelled_token_never_acquires() {
    let capture = camera_with(Arc::new(MockAnalyzer::new(json!({}))));
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(capture.capture(StepId::Skin, &cancel).await.is_err());
    assert!(!capture.is_device_held());
}

#[tokio::test]
async fn test_capture_timeout() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({})).with_delay(Duration::from_secs(30)));
    let capture = camera_with(analyzer).with_timeout(Duration::from_millis(50));

    let err = capture
        .capture(StepId::Skin, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::Timeout { step: StepId::Skin, .. })
    ));
    assert!(!capture.is_device_held());
}

#[tokio::test]
async fn test_unhealthy_analyzer_skips_upload() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({})).unhealthy());
    let capture = camera_with(analyzer.clone());

    let err = capture
        .capture(StepId::Eye, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::DeviceUnavailable { .. })
    ));
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_empty_frame_is_not_uploaded() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({})));
    let frames = StaticFrameSource::new().with_frame(StepId::Skin, Frame::new(Vec::new(), "skin.jpg"));
    let capture = CameraCapture::new(DeviceSlot::new("cam"), Arc::new(frames), analyzer.clone())
        .with_limits(FrameLimits::default());

    let err = capture
        .capture(StepId::Skin, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::InvalidPayload { .. })
    ));
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_form_capture_questionnaire() {
    let capture = FormCapture::new(Arc::new(form_inputs()));

    let result = capture
        .capture(StepId::Questionnaire, &CancellationToken::new())
        .await
        .unwrap();

    match result {
        StepResult::Questionnaire(q) => {
            assert_eq!(q.answers.len(), REQUIRED_ANSWERS.len());
            assert!(q.assessment.is_none());
        }
        other => panic!("Expected questionnaire result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_form_capture_analyzes_transcript() {
    let router = Router::new().route(
        "/analyze",
        post(|| async { Json(json!({"analysis_report": {"summary": "elevated fasting glucose"}})) }),
    );
    let base = serve_stub(router).await;
    let analyzer =
        TranscriptAnalyzer::new(format!("{}/analyze", base), Duration::from_secs(2)).unwrap();
    let capture =
        FormCapture::new(Arc::new(form_inputs())).with_transcript_analyzer(Arc::new(analyzer));

    let result = capture
        .capture(StepId::Transcript, &CancellationToken::new())
        .await
        .unwrap();

    match result {
        StepResult::Transcript(t) => {
            assert_eq!(t.text, "Fasting glucose 131 mg/dL");
            let analysis = t.analysis.expect("transcript analysis");
            assert_eq!(analysis["analysis_report"]["summary"], "elevated fasting glucose");
        }
        other => panic!("Expected transcript result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unhealthy_transcript_analyzer_fails_capture() {
    let router = Router::new().route(
        "/health",
        get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "loading") }),
    );
    let base = serve_stub(router).await;
    let analyzer = TranscriptAnalyzer::new(format!("{}/analyze", base), Duration::from_secs(2))
        .unwrap()
        .with_health_url(format!("{}/health", base));
    let capture =
        FormCapture::new(Arc::new(form_inputs())).with_transcript_analyzer(Arc::new(analyzer));

    let err = capture
        .capture(StepId::Transcript, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::DeviceUnavailable {
            step: StepId::Transcript,
            ..
        })
    ));
}

#[tokio::test]
async fn test_form_capture_rejects_missing_answers() {
    let mut answers = questionnaire_answers();
    answers.remove("HbA1c");
    answers.insert("Gender".to_string(), json!("  "));
    let source = StaticFormSource::new().with_input(StepId::Questionnaire, FormInput::Answers(answers));
    let capture = FormCapture::new(Arc::new(source));

    match capture
        .capture(StepId::Questionnaire, &CancellationToken::new())
        .await
    {
        Err(ScreeningError::Capture(CaptureError::InvalidPayload { reason, .. })) => {
            assert!(reason.contains("Gender"));
            assert!(reason.contains("HbA1c"));
        }
        other => panic!("Expected InvalidPayload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_form_capture_input_rules() {
    let source = StaticFormSource::new()
        .with_input(StepId::Transcript, FormInput::Text("   ".to_string()))
        .with_input(StepId::Wearable, FormInput::Records(json!({"steps": 10})));
    let capture = FormCapture::new(Arc::new(source));
    let cancel = CancellationToken::new();

    assert!(capture.capture(StepId::Transcript, &cancel).await.is_err());
    assert!(capture.capture(StepId::Wearable, &cancel).await.is_err());
    assert!(!capture.handles(StepId::Skin));

    let empty = StaticFormSource::new().with_input(StepId::Wearable, FormInput::Records(json!([])));
    let capture = FormCapture::new(Arc::new(empty));
    assert!(capture.capture(StepId::Wearable, &cancel).await.is_ok());
}

#[tokio::test]
async fn test_router_dispatches_every_step() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({"risk_level": "low"})));
    let (router, slot) = full_router(analyzer.clone());
    let cancel = CancellationToken::new();

    for step in StepId::ALL {
        assert!(router.handles(step));
        let result = router.capture(step, &cancel).await.unwrap();
        assert_eq!(result.step(), step);
    }

    assert_eq!(analyzer.calls(), 4);
    assert!(!slot.is_held());
}

#[tokio::test]
async fn test_router_without_adapter() {
    let router = CaptureRouter::new().with_adapter(Arc::new(FormCapture::new(Arc::new(form_inputs()))));

    let err = router
        .capture(StepId::Skin, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::DeviceUnavailable { step: StepId::Skin, .. })
    ));
}

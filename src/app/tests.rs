use super::*;
use crate::config::ScreeningConfig;
use crate::error::{CaptureError, RegistryError, ScreeningError};
use crate::events::{EventBus, EventFilter, NavPhase, ScreeningEvent};
use crate::navigation::Advance;
use crate::session::{ReportId, SubmissionStatus};
use crate::steps::{StepId, StepRegistry};
use crate::submission::SubmissionGateway;
use crate::test_support::{form_inputs, full_router, image_frames, CountingSink, MockAnalyzer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn signed_in() -> AuthState {
    AuthState::signed_in("user_42", "/sign-in")
}

fn create_flow(analyzer: MockAnalyzer, sink: Arc<CountingSink>) -> (ScreeningFlow, crate::camera::DeviceSlot) {
    let (router, slot) = full_router(Arc::new(analyzer));
    let flow = ScreeningFlow::builder()
        .capture(Arc::new(router))
        .gateway(Arc::new(SubmissionGateway::new(sink)))
        .events(EventBus::new(64))
        .start(&signed_in())
        .unwrap();
    (flow, slot)
}

#[test]
fn test_unauthenticated_start_redirects() {
    let (router, _) = full_router(Arc::new(MockAnalyzer::new(json!({}))));
    let result = ScreeningFlow::builder()
        .capture(Arc::new(router))
        .gateway(Arc::new(SubmissionGateway::new(Arc::new(CountingSink::new()))))
        .start(&AuthState::signed_out("/sign-in"));

    match result {
        Err(ScreeningError::Unauthenticated { redirect }) => assert_eq!(redirect, "/sign-in"),
        Err(e) => panic!("Expected Unauthenticated, got {}", e),
        Ok(_) => panic!("Flow started without a user"),
    }
}

#[test]
fn test_auth_state_requires_user_id() {
    let mut auth = signed_in();
    assert_eq!(auth.require_user().unwrap(), "user_42");

    auth.user_id = None;
    assert!(auth.require_user().is_err());
}

#[test]
fn test_start_requires_collaborators() {
    let result = ScreeningFlow::builder().start(&signed_in());
    assert!(matches!(result, Err(ScreeningError::System { .. })));
}

#[tokio::test]
async fn test_full_session_submits_and_acknowledges() {
    let sink = Arc::new(CountingSink::new());
    let (flow, slot) = create_flow(MockAnalyzer::new(json!({"risk_level": "high"})), sink.clone());

    for index in 0..StepId::ALL.len() {
        assert_eq!(flow.phase(), NavPhase::Viewing(index));
        assert!(!flow.can_go_next());
        flow.capture_current().await.unwrap();

        let outcome = flow.next().await.unwrap();
        if index + 1 < StepId::ALL.len() {
            assert_eq!(outcome, Advance::Moved(index + 1));
        } else {
            assert_eq!(outcome, Advance::Submitted(ReportId("report-1".to_string())));
        }
    }

    assert_eq!(flow.phase(), NavPhase::Done);
    assert!(!slot.is_held());
    let stored = sink.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].user_id, "user_42");
    assert_eq!(stored[0].risk_level, crate::results::RiskLevel::High);

    let submitted_session = flow.snapshot().session_id();
    flow.acknowledge_submission().unwrap();

    let state = flow.snapshot();
    assert_ne!(state.session_id(), submitted_session);
    assert_eq!(state.completed_count(), 0);
    assert_eq!(state.submission_status(), SubmissionStatus::NotSubmitted);
    assert_eq!(flow.phase(), NavPhase::Viewing(0));
}

#[tokio::test]
async fn test_acknowledge_requires_submission() {
    let (flow, _) = create_flow(MockAnalyzer::new(json!({})), Arc::new(CountingSink::new()));

    assert!(matches!(
        flow.acknowledge_submission(),
        Err(ScreeningError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_capture_leaves_step_empty() {
    let analyzer = MockAnalyzer::new(json!({})).with_delay(Duration::from_secs(30));
    let (flow, slot) = create_flow(analyzer, Arc::new(CountingSink::new()));
    let flow = Arc::new(flow);

    let pending = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.capture_step(StepId::Skin).await })
    };
    while !slot.is_held() {
        tokio::task::yield_now().await;
    }

    flow.cancel_captures();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::Capture(CaptureError::Cancelled { step: StepId::Skin })
    ));
    assert!(!slot.is_held());
    assert!(flow.snapshot().result(StepId::Skin).is_none());

    // A fresh token is in place for the next capture
    flow.capture_step(StepId::Questionnaire).await.unwrap();
    assert_eq!(flow.snapshot().completed_count(), 1);
}

#[tokio::test]
async fn test_restart_cancels_and_clears() {
    let analyzer = MockAnalyzer::new(json!({})).with_delay(Duration::from_secs(30));
    let (flow, slot) = create_flow(analyzer, Arc::new(CountingSink::new()));
    let flow = Arc::new(flow);

    flow.capture_step(StepId::Questionnaire).await.unwrap();
    let epoch = flow.snapshot().epoch();

    let pending = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.capture_step(StepId::Eye).await })
    };
    while !slot.is_held() {
        tokio::task::yield_now().await;
    }

    flow.restart();

    assert!(pending.await.unwrap().is_err());
    let state = flow.snapshot();
    assert_eq!(state.epoch(), epoch + 1);
    assert_eq!(state.completed_count(), 0);
    assert!(!slot.is_held());
}

#[tokio::test]
async fn test_capture_events() {
    let (flow, _) = create_flow(MockAnalyzer::new(json!({})), Arc::new(CountingSink::new()));
    let mut receiver = flow
        .events()
        .subscribe_filtered(EventFilter::Steps(vec![StepId::Questionnaire]), "test");

    flow.capture_step(StepId::Questionnaire).await.unwrap();

    match receiver.try_recv().unwrap() {
        Some(ScreeningEvent::CaptureStarted { step, .. }) => assert_eq!(step, StepId::Questionnaire),
        other => panic!("Expected CaptureStarted, got {:?}", other),
    }
    match receiver.try_recv().unwrap() {
        Some(ScreeningEvent::StepRecorded {
            progress_percent, ..
        }) => assert!((progress_percent - 100.0 / 7.0).abs() < 1e-9),
        other => panic!("Expected StepRecorded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_capture_outside_registry_is_rejected() {
    let (router, _) = full_router(Arc::new(MockAnalyzer::new(json!({}))));
    let analyzer_free = StepRegistry::new(vec![StepId::Questionnaire, StepId::Transcript]).unwrap();
    let flow = ScreeningFlow::builder()
        .registry(analyzer_free)
        .capture(Arc::new(router))
        .gateway(Arc::new(SubmissionGateway::new(Arc::new(CountingSink::new()))))
        .start(&signed_in())
        .unwrap();

    let err = flow.capture_step(StepId::Skin).await.unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::Registry(RegistryError::UnknownStep { .. })
    ));

    flow.capture_current().await.unwrap();
    assert_eq!(flow.next().await.unwrap(), Advance::Moved(1));
    flow.capture_current().await.unwrap();
    assert!(matches!(flow.next().await.unwrap(), Advance::Submitted(_)));
}

#[tokio::test]
async fn test_flow_from_default_config() {
    let flow = ScreeningFlowBuilder::from_config(
        &ScreeningConfig::default(),
        Arc::new(image_frames()),
        Arc::new(form_inputs()),
    )
    .unwrap()
    .start(&signed_in())
    .unwrap();

    assert_eq!(flow.snapshot().registry().len(), 7);
    assert_eq!(flow.user_id(), "user_42");
}

#[tokio::test]
async fn test_capture_refused_after_submission() {
    let analyzer = Arc::new(MockAnalyzer::new(json!({"risk_level": "low"})));
    let (router, slot) = full_router(analyzer.clone());
    let flow = ScreeningFlow::builder()
        .capture(Arc::new(router))
        .gateway(Arc::new(SubmissionGateway::new(Arc::new(CountingSink::new()))))
        .start(&signed_in())
        .unwrap();

    for _ in 0..StepId::ALL.len() {
        flow.capture_current().await.unwrap();
        flow.next().await.unwrap();
    }
    assert_eq!(flow.phase(), NavPhase::Done);
    let submitted_skin = flow.snapshot().result(StepId::Skin).cloned();
    let uploads = analyzer.calls();

    let err = flow.capture_step(StepId::Skin).await.unwrap_err();
    assert!(matches!(
        err,
        ScreeningError::SessionLocked { step: StepId::Skin, .. }
    ));
    assert_eq!(analyzer.calls(), uploads);
    assert!(!slot.is_held());
    assert_eq!(flow.snapshot().result(StepId::Skin).cloned(), submitted_skin);
}

#[tokio::test]
async fn test_capture_refused_while_submitting() {
    let sink = Arc::new(CountingSink::new().with_delay(Duration::from_millis(200)));
    let (flow, _) = create_flow(MockAnalyzer::new(json!({})), sink.clone());
    let flow = Arc::new(flow);

    for _ in 0..StepId::ALL.len() - 1 {
        flow.capture_current().await.unwrap();
        flow.next().await.unwrap();
    }
    flow.capture_current().await.unwrap();

    let pending = {
        let flow = flow.clone();
        tokio::spawn(async move { flow.next().await })
    };
    while flow.snapshot().submission_status() != SubmissionStatus::Submitting {
        tokio::task::yield_now().await;
    }

    let err = flow.capture_step(StepId::Questionnaire).await.unwrap_err();
    assert!(matches!(err, ScreeningError::SessionLocked { .. }));

    assert!(matches!(pending.await.unwrap(), Ok(Advance::Submitted(_))));
    assert_eq!(sink.stored()[0].results.len(), 7);
}

#[test]
fn test_from_config_rejects_invalid_config() {
    let mut config = ScreeningConfig::default();
    config.camera.capture_timeout_ms = 0;

    let result = ScreeningFlowBuilder::from_config(
        &config,
        Arc::new(image_frames()),
        Arc::new(form_inputs()),
    );
    assert!(matches!(result, Err(ScreeningError::Config(_))));
}

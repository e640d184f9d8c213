use super::flow::ScreeningFlowBuilder;
use crate::analyzer::{HttpAnalyzer, QuestionnairePredictor, TranscriptAnalyzer};
use crate::camera::FrameSource;
use crate::capture::{CameraCapture, CaptureRouter, FormCapture, FormSource};
use crate::config::ScreeningConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::submission::{HttpReportSink, SubmissionGateway};
use std::sync::Arc;
use tracing::info;

impl ScreeningFlowBuilder {
    /// Wire the HTTP analyzers, report API and capture adapters described by
    /// `config` around the given input sources. Invalid configuration is
    /// refused before anything is built.
    pub fn from_config(
        config: &ScreeningConfig,
        frames: Arc<dyn FrameSource>,
        forms: Arc<dyn FormSource>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = config.registry()?;

        let analyzer = Arc::new(HttpAnalyzer::new(&config.analyzers)?);
        let camera = CameraCapture::from_config(&config.camera, frames, analyzer);

        let mut form = FormCapture::new(forms);
        if let Some(url) = &config.questionnaire.predictor_url {
            info!("Questionnaire answers will be scored by {}", url);
            let predictor =
                QuestionnairePredictor::new(url.clone(), config.analyzers.request_timeout())?;
            form = form.with_predictor(Arc::new(predictor));
        }
        if let Some(analyzer) =
            TranscriptAnalyzer::from_config(&config.transcript, config.analyzers.request_timeout())?
        {
            info!("Transcripts will be analyzed before they are stored");
            form = form.with_transcript_analyzer(Arc::new(analyzer));
        }

        let router = CaptureRouter::new()
            .with_adapter(Arc::new(camera))
            .with_adapter(Arc::new(form));

        let sink = Arc::new(HttpReportSink::new(&config.report)?);
        let gateway = SubmissionGateway::new(sink).with_timeout(config.report.submit_timeout());

        Ok(Self::new()
            .registry(registry)
            .capture(Arc::new(router))
            .gateway(Arc::new(gateway))
            .events(EventBus::new(config.system.event_bus_capacity)))
    }
}

use crate::steps::{StepId, StepRegistry};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_SKIN_URL: &str = "http://localhost:8001/predict";
const DEFAULT_BODY_URL: &str = "http://localhost:8002/predict";
const DEFAULT_METABOLIC_URL: &str = "http://localhost:8003/analyze";
const DEFAULT_EYE_URL: &str = "http://localhost:8004/analyze";
const DEFAULT_EYE_HEALTH_URL: &str = "http://localhost:8004/health";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScreeningConfig {
    pub session: SessionConfig,
    pub auth: AuthConfig,
    pub camera: CameraConfig,
    pub analyzers: AnalyzersConfig,
    #[serde(default)]
    pub questionnaire: QuestionnaireConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
    pub report: ReportConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Ordered step names the session walks through
    #[serde(default = "default_session_steps")]
    pub steps: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// Where unauthenticated users are sent
    #[serde(default = "default_sign_in_url")]
    pub sign_in_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Label of the capture device, used in busy errors and logs
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Upper bound for one capture attempt, analysis upload included
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Decode image headers and check dimensions before uploading
    #[serde(default = "default_validate_images")]
    pub validate_images: bool,

    /// Smallest accepted image side in pixels
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Largest accepted image side in pixels
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyzerEndpoint {
    /// URL the image is posted to
    pub url: String,

    /// Multipart field carrying the image
    #[serde(default = "default_upload_field")]
    pub field: String,

    /// Optional availability probe, checked before each capture
    #[serde(default)]
    pub health_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyzersConfig {
    pub skin: AnalyzerEndpoint,
    pub body: AnalyzerEndpoint,
    pub metabolic: AnalyzerEndpoint,
    pub eye: AnalyzerEndpoint,

    /// Per-request timeout for analyzer calls
    #[serde(default = "default_analyzer_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct QuestionnaireConfig {
    /// Risk predictor the answers are posted to; answers are stored as-is when unset
    #[serde(default)]
    pub predictor_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TranscriptConfig {
    /// Document analyzer the transcript is uploaded to; stored unanalyzed when unset
    #[serde(default)]
    pub analyzer_url: Option<String>,

    /// Optional availability probe, checked before each upload
    #[serde(default)]
    pub health_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReportConfig {
    /// Base URL of the report storage API
    #[serde(default = "default_report_base_url")]
    pub base_url: String,

    /// Upper bound for one submission attempt
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Per-request timeout of the HTTP client
    #[serde(default = "default_report_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl AnalyzersConfig {
    pub fn endpoint(&self, step: StepId) -> Option<&AnalyzerEndpoint> {
        match step {
            StepId::Skin => Some(&self.skin),
            StepId::Body => Some(&self.body),
            StepId::Metabolic => Some(&self.metabolic),
            StepId::Eye => Some(&self.eye),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl CameraConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

impl ReportConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ScreeningConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("diascreen.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("session.steps", default_session_steps())?
            .set_default("auth.sign_in_url", default_sign_in_url())?
            .set_default("camera.device", default_camera_device())?
            .set_default(
                "camera.capture_timeout_ms",
                default_capture_timeout_ms() as i64,
            )?
            .set_default("camera.validate_images", default_validate_images())?
            .set_default("camera.min_dimension", default_min_dimension())?
            .set_default("camera.max_dimension", default_max_dimension())?
            .set_default("analyzers.skin.url", DEFAULT_SKIN_URL)?
            .set_default("analyzers.body.url", DEFAULT_BODY_URL)?
            .set_default("analyzers.metabolic.url", DEFAULT_METABOLIC_URL)?
            .set_default("analyzers.eye.url", DEFAULT_EYE_URL)?
            .set_default("analyzers.eye.health_url", DEFAULT_EYE_HEALTH_URL)?
            .set_default(
                "analyzers.request_timeout_ms",
                default_analyzer_timeout_ms() as i64,
            )?
            .set_default("report.base_url", default_report_base_url())?
            .set_default(
                "report.submit_timeout_ms",
                default_submit_timeout_ms() as i64,
            )?
            .set_default(
                "report.request_timeout_ms",
                default_report_request_timeout_ms() as i64,
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. DIASCREEN_REPORT__BASE_URL
            .add_source(
                Environment::with_prefix("DIASCREEN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScreeningConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Step registry described by `session.steps`
    pub fn registry(&self) -> crate::error::Result<StepRegistry> {
        StepRegistry::from_names(&self.session.steps)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = self.registry() {
            return Err(ConfigError::Message(format!(
                "Invalid session steps: {}",
                e
            )));
        }

        if self.camera.capture_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera capture_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.min_dimension == 0 || self.camera.min_dimension > self.camera.max_dimension
        {
            return Err(ConfigError::Message(
                "Camera min_dimension must be positive and not exceed max_dimension".to_string(),
            ));
        }

        for step in StepId::ALL.iter().filter(|s| s.is_image_step()) {
            if let Some(endpoint) = self.analyzers.endpoint(*step) {
                if endpoint.url.trim().is_empty() {
                    return Err(ConfigError::Message(format!(
                        "Analyzer url for step '{}' must not be empty",
                        step
                    )));
                }
                if endpoint.field.trim().is_empty() {
                    return Err(ConfigError::Message(format!(
                        "Analyzer upload field for step '{}' must not be empty",
                        step
                    )));
                }
            }
        }

        let optional_urls = [
            ("Questionnaire predictor_url", &self.questionnaire.predictor_url),
            ("Transcript analyzer_url", &self.transcript.analyzer_url),
            ("Transcript health_url", &self.transcript.health_url),
        ];
        for (name, url) in optional_urls {
            if matches!(url, Some(url) if url.trim().is_empty()) {
                return Err(ConfigError::Message(format!(
                    "{} must not be empty when set",
                    name
                )));
            }
        }

        if self.analyzers.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Analyzer request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.report.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Report base_url must not be empty".to_string(),
            ));
        }

        if self.report.submit_timeout_ms == 0 || self.report.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Report timeouts must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                steps: default_session_steps(),
            },
            auth: AuthConfig {
                sign_in_url: default_sign_in_url(),
            },
            camera: CameraConfig {
                device: default_camera_device(),
                capture_timeout_ms: default_capture_timeout_ms(),
                validate_images: default_validate_images(),
                min_dimension: default_min_dimension(),
                max_dimension: default_max_dimension(),
            },
            analyzers: AnalyzersConfig {
                skin: analyzer(DEFAULT_SKIN_URL, None),
                body: analyzer(DEFAULT_BODY_URL, None),
                metabolic: analyzer(DEFAULT_METABOLIC_URL, None),
                eye: analyzer(DEFAULT_EYE_URL, Some(DEFAULT_EYE_HEALTH_URL)),
                request_timeout_ms: default_analyzer_timeout_ms(),
            },
            questionnaire: QuestionnaireConfig::default(),
            transcript: TranscriptConfig::default(),
            report: ReportConfig {
                base_url: default_report_base_url(),
                submit_timeout_ms: default_submit_timeout_ms(),
                request_timeout_ms: default_report_request_timeout_ms(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

fn analyzer(url: &str, health_url: Option<&str>) -> AnalyzerEndpoint {
    AnalyzerEndpoint {
        url: url.to_string(),
        field: default_upload_field(),
        health_url: health_url.map(str::to_string),
    }
}

// Default value functions
fn default_session_steps() -> Vec<String> {
    StepId::ALL.iter().map(|s| s.as_str().to_string()).collect()
}
fn default_sign_in_url() -> String {
    "/sign-in".to_string()
}

fn default_camera_device() -> String {
    "camera0".to_string()
}
fn default_capture_timeout_ms() -> u64 {
    30_000
}
fn default_validate_images() -> bool {
    true
}
fn default_min_dimension() -> u32 {
    50
}
fn default_max_dimension() -> u32 {
    4000
}

fn default_upload_field() -> String {
    "file".to_string()
}
fn default_analyzer_timeout_ms() -> u64 {
    20_000
}

fn default_report_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_submit_timeout_ms() -> u64 {
    15_000
}
fn default_report_request_timeout_ms() -> u64 {
    10_000
}

fn default_event_bus_capacity() -> usize {
    64
}

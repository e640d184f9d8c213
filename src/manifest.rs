//! Session manifests: the inputs for one unattended screening run.
//!
//! ```toml
//! user = "user_2fQ"
//! questionnaire = "answers.json"   # JSON object
//! wearable = "wearable.json"       # JSON array
//! transcript = "Fasting glucose 131 mg/dL"
//!
//! [images]
//! skin = "photos/skin.jpg"
//! eye = "photos/retina.png"
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use crate::camera::FileFrameSource;
use crate::capture::{FormInput, StaticFormSource};
use crate::error::{Result, ScreeningError};
use crate::steps::StepId;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionManifest {
    /// User the report is stored for
    #[serde(default)]
    pub user: Option<String>,

    /// JSON file with the questionnaire answers
    #[serde(default)]
    pub questionnaire: Option<PathBuf>,

    /// JSON file with the wearable records
    #[serde(default)]
    pub wearable: Option<PathBuf>,

    /// Transcript text, inline
    #[serde(default)]
    pub transcript: Option<String>,

    /// Transcript text, read from a file
    #[serde(default)]
    pub transcript_file: Option<PathBuf>,

    /// Image file per image step, keyed by step name
    #[serde(default)]
    pub images: BTreeMap<String, PathBuf>,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl SessionManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut manifest: SessionManifest = toml::from_str(&content)?;
        for name in manifest.images.keys() {
            name.parse::<StepId>()?;
        }

        manifest.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        debug!(
            "Loaded manifest {} ({} images)",
            path.display(),
            manifest.images.len()
        );
        Ok(manifest)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn frame_source(&self) -> FileFrameSource {
        self.images
            .iter()
            .filter_map(|(name, path)| name.parse::<StepId>().ok().map(|step| (step, path)))
            .fold(FileFrameSource::new(), |source, (step, path)| {
                source.with_file(step, self.resolve(path))
            })
    }

    /// Read every form input the manifest names
    pub fn form_source(&self) -> Result<StaticFormSource> {
        let mut source = StaticFormSource::new();

        if let Some(path) = &self.questionnaire {
            match read_json(&self.resolve(path))? {
                Value::Object(answers) => {
                    source = source.with_input(StepId::Questionnaire, FormInput::Answers(answers));
                }
                _ => {
                    return Err(ScreeningError::system(format!(
                        "{} must hold a JSON object of answers",
                        path.display()
                    )))
                }
            }
        }

        if let Some(path) = &self.wearable {
            let records = read_json(&self.resolve(path))?;
            source = source.with_input(StepId::Wearable, FormInput::Records(records));
        }

        let transcript = match (&self.transcript, &self.transcript_file) {
            (Some(text), _) => Some(text.clone()),
            (None, Some(path)) => Some(std::fs::read_to_string(self.resolve(path))?),
            (None, None) => None,
        };
        if let Some(text) = transcript {
            source = source.with_input(StepId::Transcript, FormInput::Text(text));
        }

        Ok(source)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

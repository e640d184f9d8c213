use crate::error::{RegistryError, Result, ScreeningError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One discrete screening activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Questionnaire,
    Wearable,
    Skin,
    Body,
    Metabolic,
    Eye,
    Transcript,
}

impl StepId {
    pub const ALL: [StepId; 7] = [
        StepId::Questionnaire,
        StepId::Wearable,
        StepId::Skin,
        StepId::Body,
        StepId::Metabolic,
        StepId::Eye,
        StepId::Transcript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::Questionnaire => "questionnaire",
            StepId::Wearable => "wearable",
            StepId::Skin => "skin",
            StepId::Body => "body",
            StepId::Metabolic => "metabolic",
            StepId::Eye => "eye",
            StepId::Transcript => "transcript",
        }
    }

    /// Steps whose input is a camera frame or image file
    pub fn is_image_step(&self) -> bool {
        matches!(
            self,
            StepId::Skin | StepId::Body | StepId::Metabolic | StepId::Eye
        )
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = RegistryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StepId::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownStep {
                step: s.to_string(),
            })
    }
}

/// Ordered, read-only list of the steps a session walks through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRegistry {
    steps: Vec<StepId>,
}

impl StepRegistry {
    /// The full seven-step screening order
    pub fn standard() -> Self {
        Self {
            steps: StepId::ALL.to_vec(),
        }
    }

    /// Build a registry from a custom ordered subset of steps
    pub fn new(steps: Vec<StepId>) -> Result<Self> {
        if steps.is_empty() {
            return Err(ScreeningError::system("Step registry must not be empty"));
        }

        for (i, step) in steps.iter().enumerate() {
            if steps[..i].contains(step) {
                return Err(ScreeningError::system(format!(
                    "Step '{}' appears more than once in the registry",
                    step
                )));
            }
        }

        Ok(Self { steps })
    }

    /// Build a registry from step names, e.g. from configuration
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let steps = names
            .iter()
            .map(|name| name.as_ref().parse::<StepId>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(steps)
    }

    pub fn step_at(&self, index: usize) -> std::result::Result<StepId, RegistryError> {
        self.steps
            .get(index)
            .copied()
            .ok_or(RegistryError::IndexOutOfRange {
                index,
                len: self.steps.len(),
            })
    }

    pub fn index_of(&self, step: StepId) -> std::result::Result<usize, RegistryError> {
        self.steps
            .iter()
            .position(|s| *s == step)
            .ok_or_else(|| RegistryError::UnknownStep {
                step: step.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = StepId> + '_ {
        self.steps.iter().copied()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

use serde::{Deserialize, Serialize};

/// Score used whenever a source omits one or reports a non-positive value.
pub const DEFAULT_SCORE: f64 = 85.0;

/// One ordered step of a generated piece (a scene, slide, tweet, frame...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Spoken/written text for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Visual direction (shot, layout, image prompt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<String>,
}

impl Step {
    pub fn script(script: impl Into<String>) -> Self {
        Self {
            script: Some(script.into()),
            visual: None,
        }
    }

    pub fn with_visual(mut self, visual: impl Into<String>) -> Self {
        self.visual = Some(visual.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_none() && self.visual.is_none()
    }
}

/// Canonical generation output, independent of which tier produced it.
///
/// Collections are always present (possibly empty) so callers can iterate
/// unconditionally, and `score` is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedArtifact {
    pub steps: Vec<Step>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub score: f64,
}

impl NormalizedArtifact {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            keywords: Vec::new(),
            hooks: Vec::new(),
            hashtags: Vec::new(),
            score: DEFAULT_SCORE,
        }
    }

    /// First script line, handy for list previews.
    pub fn headline(&self) -> Option<&str> {
        self.steps.iter().find_map(|s| s.script.as_deref())
    }
}

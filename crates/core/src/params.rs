//! Generation parameters shared by every generation tier.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DomainError, DomainResult};

/// Semantic parameters of a generation request.
///
/// The same value is sent to the external workflow, the secondary provider and
/// the template builder, so every tier answers the same question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub topic: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Free-form extra inputs forwarded verbatim (niche, language, duration...).
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationParams {
    pub fn new(topic: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            platform: platform.into(),
            tone: None,
            audience: None,
            extra: Map::new(),
        }
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Parsed platform label.
    pub fn platform_kind(&self) -> Platform {
        Platform::from_label(&self.platform)
    }

    /// Reject parameters no tier could do anything useful with.
    pub fn validate(&self) -> DomainResult<()> {
        if self.topic.trim().is_empty() {
            return Err(DomainError::validation("topic must not be empty"));
        }
        if self.platform.trim().is_empty() {
            return Err(DomainError::validation("platform must not be empty"));
        }
        Ok(())
    }
}

/// Publishing platform, parsed leniently from a user-facing label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    TikTok,
    Instagram,
    YouTube,
    Twitter,
    LinkedIn,
    Other,
}

impl Platform {
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "tiktok" => Platform::TikTok,
            "instagram" | "ig" | "reels" | "instagramreels" => Platform::Instagram,
            "youtube" | "youtubeshorts" | "shorts" => Platform::YouTube,
            "twitter" | "x" | "xtwitter" | "twitterx" => Platform::Twitter,
            "linkedin" => Platform::LinkedIn,
            _ => Platform::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::TikTok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::YouTube => "youtube",
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Other => "other",
        }
    }
}

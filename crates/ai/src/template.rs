//! Deterministic last-resort generation.
//!
//! Built from the request parameters alone: no network, no randomness. The
//! output is the flat raw shape, so it travels through the normalizer exactly
//! like every other tier and lands as a single-step artifact.

use serde_json::{json, Value};

use genflow_core::{GenerationParams, Platform};

use crate::artifact::{NormalizedArtifact, Step};
use crate::normalize::normalize;

const FALLBACK_TOPIC: &str = "your niche";

/// Raw flat-shape response for `params`.
pub fn template_response(params: &GenerationParams) -> Value {
    let topic = display_topic(params);
    let platform = params.platform_kind();

    let hooks = vec![
        format!("Nobody talks about this side of {topic}"),
        format!("3 things I wish I knew about {topic} sooner"),
        format!("Stop scrolling if {topic} is on your mind"),
    ];

    json!({
        "hooks": hooks,
        "keywords": keywords(params, &topic),
        "hashtags": hashtags(&topic, platform),
    })
}

/// Normalized template artifact; never empty.
pub fn template_artifact(params: &GenerationParams) -> NormalizedArtifact {
    let raw = template_response(params);
    normalize(&raw).unwrap_or_else(|| {
        NormalizedArtifact::new(vec![Step::script(format!(
            "Nobody talks about this side of {}",
            display_topic(params)
        ))])
    })
}

fn display_topic(params: &GenerationParams) -> String {
    let topic = params.topic.trim();
    if topic.is_empty() {
        FALLBACK_TOPIC.to_string()
    } else {
        topic.to_string()
    }
}

fn keywords(params: &GenerationParams, topic: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let candidates = topic
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(str::to_lowercase)
        .chain(params.tone.iter().map(|t| t.trim().to_lowercase()))
        .chain(std::iter::once(params.platform.trim().to_lowercase()));

    for word in candidates {
        if !word.is_empty() && !keywords.contains(&word) {
            keywords.push(word);
        }
    }

    if keywords.is_empty() {
        keywords.push(topic.to_lowercase());
    }
    keywords
}

fn hashtags(topic: &str, platform: Platform) -> Vec<String> {
    let compact: String = topic
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();

    let mut tags = Vec::new();
    if !compact.is_empty() {
        tags.push(format!("#{compact}"));
    }

    let platform_tags: &[&str] = match platform {
        Platform::TikTok => &["#fyp", "#foryou"],
        Platform::Instagram => &["#reels", "#explore"],
        Platform::YouTube => &["#shorts"],
        Platform::Twitter => &["#thread"],
        Platform::LinkedIn => &["#careers"],
        Platform::Other => &["#contentcreator"],
    };
    tags.extend(platform_tags.iter().map(|t| t.to_string()));
    tags
}

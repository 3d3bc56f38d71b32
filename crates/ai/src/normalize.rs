//! Response normalization.
//!
//! Workflows and providers answer in whatever shape their prompt produced:
//! scene lists for short video, slides for carousels, tweet threads, story
//! frames, caption sections, or a flat bag of hooks and hashtags. Everything is
//! collapsed here into one [`NormalizedArtifact`].
//!
//! Responses are frequently wrapped (`[{"output": "```json ...```"}]`), so an
//! envelope pass runs first: arrays yield their first element, strings are
//! parsed as JSON, and `output`/`data`/`result`/`response` keys are descended.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::artifact::{NormalizedArtifact, Step, DEFAULT_SCORE};

const MAX_ENVELOPE_DEPTH: u8 = 4;

const WRAPPER_KEYS: &[&str] = &["output", "data", "result", "response"];
const SCORE_KEYS: &[&str] = &["score", "viral_score", "virality_score"];
const KEYWORD_KEYS: &[&str] = &["keywords"];
const HOOK_KEYS: &[&str] = &["hooks", "hook"];
const HASHTAG_KEYS: &[&str] = &["hashtags"];

/// The raw shape a response was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    /// Already in canonical `steps` form.
    Normalized,
    Scenes,
    Slides,
    Thread,
    Frames,
    CaptionSections,
    /// Hooks/keywords/hashtags/score at the top level, no step list.
    Flat,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("response carried no data")]
    Empty,

    #[error("response shape not recognized")]
    UnrecognizedShape,

    #[error("{0:?} response contained no usable steps")]
    EmptyShape(ShapeKind),
}

/// Normalize a raw response, returning `None` for unknown or empty shapes.
pub fn normalize(raw: &Value) -> Option<NormalizedArtifact> {
    match try_normalize(raw) {
        Ok(artifact) => Some(artifact),
        Err(err) => {
            tracing::debug!(error = %err, "response did not normalize");
            None
        }
    }
}

/// Normalize a raw response, reporting why it could not be used.
pub fn try_normalize(raw: &Value) -> Result<NormalizedArtifact, NormalizationError> {
    let body = unwrap_envelope(raw, 0).ok_or(NormalizationError::Empty)?;
    let obj = body
        .as_object()
        .ok_or(NormalizationError::UnrecognizedShape)?;
    let shape = shape_of(obj).ok_or(NormalizationError::UnrecognizedShape)?;

    let keywords = list_field(obj, KEYWORD_KEYS);
    let hooks = list_field(obj, HOOK_KEYS);
    let hashtags = list_field(obj, HASHTAG_KEYS);

    let steps: Vec<Step> = match shape {
        ShapeKind::Flat => flat_step(&hooks, &keywords, &hashtags).into_iter().collect(),
        _ => collect_steps(obj, shape),
    };

    if steps.is_empty() {
        return Err(NormalizationError::EmptyShape(shape));
    }

    Ok(NormalizedArtifact {
        steps,
        keywords,
        hooks,
        hashtags,
        score: score_field(obj),
    })
}

/// Recognize the shape of a raw response without building the artifact.
pub fn detect_shape(raw: &Value) -> Option<ShapeKind> {
    let body = unwrap_envelope(raw, 0)?;
    shape_of(body.as_object()?)
}

fn unwrap_envelope(raw: &Value, depth: u8) -> Option<Value> {
    if depth > MAX_ENVELOPE_DEPTH {
        return None;
    }

    match raw {
        Value::Array(items) => items.first().and_then(|v| unwrap_envelope(v, depth + 1)),
        Value::String(text) => {
            parse_embedded_json(text).and_then(|v| unwrap_envelope(&v, depth + 1))
        }
        Value::Object(map) => {
            if shape_of(map).is_some() {
                return Some(raw.clone());
            }
            WRAPPER_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|inner| unwrap_envelope(inner, depth + 1))
                .or_else(|| (!map.is_empty()).then(|| raw.clone()))
        }
        _ => None,
    }
}

/// Parse JSON embedded in model text: plain, fenced, or surrounded by prose.
fn parse_embedded_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unfenced = strip_code_fence(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find(['{', '['])?;
    let end = unfenced.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&unfenced[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string (`json`, `JSON`, ...) up to the first newline.
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn shape_of(obj: &Map<String, Value>) -> Option<ShapeKind> {
    let is_list = |key: &str| obj.get(key).is_some_and(Value::is_array);

    if is_list("steps") {
        Some(ShapeKind::Normalized)
    } else if is_list("scenes") {
        Some(ShapeKind::Scenes)
    } else if is_list("slides") {
        Some(ShapeKind::Slides)
    } else if is_list("thread") || is_list("tweets") {
        Some(ShapeKind::Thread)
    } else if is_list("frames") {
        Some(ShapeKind::Frames)
    } else if is_list("caption_sections")
        || is_list("sections")
        || obj.get("caption").is_some_and(Value::is_object)
    {
        Some(ShapeKind::CaptionSections)
    } else if HOOK_KEYS
        .iter()
        .chain(KEYWORD_KEYS)
        .chain(HASHTAG_KEYS)
        .any(|key| obj.get(*key).is_some_and(|v| !v.is_null()))
    {
        Some(ShapeKind::Flat)
    } else {
        None
    }
}

fn collect_steps(obj: &Map<String, Value>, shape: ShapeKind) -> Vec<Step> {
    let items = |keys: &[&str]| -> Vec<Value> {
        keys.iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .cloned()
            .unwrap_or_default()
    };

    let steps: Vec<Step> = match shape {
        ShapeKind::Normalized => items(&["steps"])
            .iter()
            .map(|item| item_step(item, &["script", "text"], &["visual"]))
            .collect(),
        ShapeKind::Scenes => items(&["scenes"])
            .iter()
            .map(|item| {
                item_step(
                    item,
                    &["script", "voiceover", "dialogue", "narration", "text"],
                    &["visual", "visual_direction", "shot", "b_roll"],
                )
            })
            .collect(),
        ShapeKind::Slides => items(&["slides"]).iter().map(slide_step).collect(),
        ShapeKind::Thread => items(&["thread", "tweets"])
            .iter()
            .map(|item| {
                item_step(item, &["text", "content", "tweet"], &["media", "visual", "image"])
            })
            .collect(),
        ShapeKind::Frames => items(&["frames"])
            .iter()
            .map(|item| {
                item_step(
                    item,
                    &["text", "caption", "overlay_text", "script"],
                    &["visual", "image_prompt", "description", "visual_direction"],
                )
            })
            .collect(),
        ShapeKind::CaptionSections => caption_steps(obj),
        ShapeKind::Flat => Vec::new(),
    };

    steps.into_iter().filter(|s| !s.is_empty()).collect()
}

fn item_step(item: &Value, script_keys: &[&str], visual_keys: &[&str]) -> Step {
    match item {
        Value::Object(fields) => Step {
            script: text_field(fields, script_keys),
            visual: text_field(fields, visual_keys),
        },
        other => Step {
            script: scalar_text(other),
            visual: None,
        },
    }
}

fn slide_step(item: &Value) -> Step {
    let Value::Object(fields) = item else {
        return item_step(item, &[], &[]);
    };

    let script = text_field(fields, &["text", "content", "caption"]).or_else(|| {
        match (
            text_field(fields, &["headline", "title"]),
            text_field(fields, &["body"]),
        ) {
            (Some(headline), Some(body)) => Some(format!("{headline}\n{body}")),
            (headline, body) => headline.or(body),
        }
    });

    Step {
        script,
        visual: text_field(
            fields,
            &["visual", "design", "image", "visual_direction", "image_prompt"],
        ),
    }
}

fn caption_steps(obj: &Map<String, Value>) -> Vec<Step> {
    if let Some(sections) = ["caption_sections", "sections"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
    {
        return sections
            .iter()
            .map(|item| item_step(item, &["text", "content", "body", "heading"], &["visual"]))
            .collect();
    }

    let Some(caption) = obj.get("caption").and_then(Value::as_object) else {
        return Vec::new();
    };

    ["hook", "body", "cta"]
        .iter()
        .filter_map(|key| caption.get(*key).and_then(scalar_text))
        .map(Step::script)
        .collect()
}

/// The flat shape has no step list; synthesize exactly one step.
fn flat_step(hooks: &[String], keywords: &[String], hashtags: &[String]) -> Option<Step> {
    let script = hooks
        .first()
        .or_else(|| keywords.first())
        .cloned()
        .or_else(|| (!hashtags.is_empty()).then(|| hashtags.join(" ")))?;
    Some(Step::script(script))
}

fn text_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(scalar_text)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Bare string → one element, absent/null → empty, arrays keep scalar entries.
fn list_field(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys
        .iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
    else {
        return Vec::new();
    };

    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other).into_iter().collect(),
    }
}

fn score_field(obj: &Map<String, Value>) -> f64 {
    let raw = SCORE_KEYS.iter().find_map(|key| match obj.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    });

    match raw {
        Some(score) if score.is_finite() && score > 0.0 => score,
        _ => DEFAULT_SCORE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn assert_non_empty(raw: Value, expected: ShapeKind) -> NormalizedArtifact {
        assert_eq!(detect_shape(&raw), Some(expected));
        let artifact = normalize(&raw).expect("shape should normalize");
        assert!(!artifact.steps.is_empty());
        assert!(artifact.score > 0.0);
        artifact
    }

    #[test]
    fn scene_breakdown() {
        let artifact = assert_non_empty(
            json!({
                "scenes": [
                    {"voiceover": "Open on the problem", "visual_direction": "close-up"},
                    {"script": "Show the fix", "shot": "screen recording"}
                ],
                "hooks": ["You are doing X wrong"],
                "viral_score": 91
            }),
            ShapeKind::Scenes,
        );

        assert_eq!(
            artifact.steps,
            vec![
                Step::script("Open on the problem").with_visual("close-up"),
                Step::script("Show the fix").with_visual("screen recording"),
            ]
        );
        assert_eq!(artifact.hooks, vec!["You are doing X wrong"]);
        assert_eq!(artifact.score, 91.0);
    }

    #[test]
    fn slide_breakdown_joins_headline_and_body() {
        let artifact = assert_non_empty(
            json!({"slides": [
                {"headline": "Why X", "body": "Because Y", "design": "bold type"},
                {"text": "Save this post"}
            ]}),
            ShapeKind::Slides,
        );

        assert_eq!(artifact.steps[0].script.as_deref(), Some("Why X\nBecause Y"));
        assert_eq!(artifact.steps[0].visual.as_deref(), Some("bold type"));
        assert_eq!(artifact.steps[1].script.as_deref(), Some("Save this post"));
    }

    #[test]
    fn thread_accepts_bare_strings_and_objects() {
        let artifact = assert_non_empty(
            json!({
                "tweets": ["1/ X is underrated", {"content": "2/ here is why", "media": "chart"}]
            }),
            ShapeKind::Thread,
        );

        assert_eq!(artifact.steps.len(), 2);
        assert_eq!(artifact.steps[1].visual.as_deref(), Some("chart"));
    }

    #[test]
    fn frame_breakdown() {
        let artifact = assert_non_empty(
            json!({"frames": [{"overlay_text": "Poll time", "image_prompt": "split screen"}]}),
            ShapeKind::Frames,
        );
        assert_eq!(
            artifact.steps,
            vec![Step::script("Poll time").with_visual("split screen")]
        );
    }

    #[test]
    fn caption_object_keeps_hook_body_cta_order() {
        let artifact = assert_non_empty(
            json!({
                "caption": {"cta": "Follow for more", "hook": "Wait for it", "body": "X explained"}
            }),
            ShapeKind::CaptionSections,
        );

        let scripts: Vec<_> = artifact
            .steps
            .iter()
            .filter_map(|s| s.script.as_deref())
            .collect();
        assert_eq!(scripts, vec!["Wait for it", "X explained", "Follow for more"]);
    }

    #[test]
    fn caption_section_list() {
        assert_non_empty(
            json!({"caption_sections": [{"heading": "Intro"}, {"text": "Details"}]}),
            ShapeKind::CaptionSections,
        );
    }

    #[test]
    fn flat_shape_becomes_one_synthetic_step() {
        let artifact = assert_non_empty(
            json!({
                "hooks": ["Hook A", "Hook B"],
                "keywords": "x",
                "hashtags": ["#x"],
                "score": 77
            }),
            ShapeKind::Flat,
        );

        assert_eq!(artifact.steps, vec![Step::script("Hook A")]);
        assert_eq!(artifact.keywords, vec!["x"]);
        assert_eq!(artifact.score, 77.0);
    }

    #[test]
    fn envelopes_are_unwrapped() {
        let fenced = "Here you go:\n```json\n{\"scenes\": [{\"script\": \"hi\"}]}\n```";
        let raw = json!([{ "output": fenced }]);

        assert_eq!(detect_shape(&raw), Some(ShapeKind::Scenes));
        let artifact = normalize(&raw).unwrap();
        assert_eq!(artifact.steps, vec![Step::script("hi")]);

        let prose = json!({"data": "Sure! {\"slides\": [{\"text\": \"one\"}]} Enjoy."});
        assert_eq!(detect_shape(&prose), Some(ShapeKind::Slides));
    }

    #[test]
    fn unknown_and_empty_shapes_are_none() {
        for raw in [
            Value::Null,
            json!({}),
            json!([]),
            json!(""),
            json!("plain prose, no json"),
            json!(42),
            json!({"unexpected": {"nested": true}}),
            json!({"scenes": []}),
            json!({"scenes": [{"script": "   "}]}),
            json!({"hooks": [], "keywords": null}),
        ] {
            assert_eq!(normalize(&raw), None, "{raw} should not normalize");
        }
    }

    #[test]
    fn errors_explain_the_failure() {
        assert_eq!(try_normalize(&Value::Null), Err(NormalizationError::Empty));
        assert_eq!(
            try_normalize(&json!({"what": 1})),
            Err(NormalizationError::UnrecognizedShape)
        );
        assert_eq!(
            try_normalize(&json!({"frames": []})),
            Err(NormalizationError::EmptyShape(ShapeKind::Frames))
        );
    }

    #[test]
    fn missing_or_non_positive_score_uses_default() {
        for score in [json!(null), json!(0), json!(-3), json!("n/a")] {
            let raw = json!({"hooks": ["h"], "score": score});
            assert_eq!(normalize(&raw).unwrap().score, DEFAULT_SCORE);
        }
        let raw = json!({"hooks": ["h"], "score": "92%"});
        assert_eq!(normalize(&raw).unwrap().score, 92.0);
    }

    #[test]
    fn absent_lists_are_empty_not_missing() {
        let artifact = normalize(&json!({"scenes": [{"script": "s"}]})).unwrap();
        assert!(artifact.keywords.is_empty());
        assert!(artifact.hooks.is_empty());
        assert!(artifact.hashtags.is_empty());

        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value["hashtags"], json!([]));
    }

    #[test]
    fn normalizing_normalized_output_is_identity() {
        let artifact = normalize(&json!({
            "slides": [{"headline": "A", "visual": "v"}],
            "hashtags": "#one",
            "score": 64.5
        }))
        .unwrap();

        let again = normalize(&serde_json::to_value(&artifact).unwrap()).unwrap();
        assert_eq!(again, artifact);
    }

    fn arb_text() -> impl Strategy<Value = Option<String>> {
        prop::option::of("[ a-zA-Z0-9#]{0,12}")
    }

    fn arb_raw() -> impl Strategy<Value = Value> {
        let step = (arb_text(), arb_text()).prop_map(|(s, v)| json!({"script": s, "visual": v}));
        let steps = prop::collection::vec(step, 0..5);
        let list = prop::collection::vec("[ a-z#]{0,8}", 0..4);
        let key = prop::sample::select(vec!["steps", "scenes", "frames", "slides", "tweets"]);
        let score = prop::option::of(-50i64..150);

        (key, steps, list.clone(), list, score).prop_map(|(key, steps, hooks, tags, score)| {
            json!({ key: steps, "hooks": hooks, "hashtags": tags, "score": score })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: normalizing an already-normalized artifact changes nothing.
        #[test]
        fn normalize_is_idempotent(raw in arb_raw()) {
            if let Some(first) = normalize(&raw) {
                let second = normalize(&serde_json::to_value(&first).unwrap());
                prop_assert_eq!(second, Some(first));
            }
        }

        /// Property: a normalized artifact never carries empty steps or a non-positive score.
        #[test]
        fn artifacts_are_always_usable(raw in arb_raw()) {
            if let Some(artifact) = normalize(&raw) {
                prop_assert!(!artifact.steps.is_empty());
                prop_assert!(artifact.steps.iter().all(|s| !s.is_empty()));
                prop_assert!(artifact.score > 0.0);
            }
        }

        /// Property: a bare string list field always becomes at most one element.
        #[test]
        fn bare_string_lists_wrap(word in "[a-z]{1,10}") {
            let artifact = normalize(&json!({"keywords": word.clone()})).unwrap();
            prop_assert_eq!(artifact.keywords, vec![word]);
        }
    }
}

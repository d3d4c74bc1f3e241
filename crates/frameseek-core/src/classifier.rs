//! Query classification
//!
//! Splits a raw query into chronological scenes. Classification never fails:
//! any gateway or shape problem degrades to [`Classification::fallback`].

use crate::error::ClassificationError;
use crate::gateway::LlmGateway;
use crate::parser::parse_text;
use crate::prompts::classification_prompt;
use crate::types::{Classification, Scene};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Classifies raw queries into scenes
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `raw_query`; never fails
    async fn classify(&self, raw_query: &str) -> Classification;
}

/// Classifier backed by a text-generation model
#[derive(Clone)]
pub struct LlmQueryClassifier {
    gateway: Arc<dyn LlmGateway>,
}

impl LlmQueryClassifier {
    /// Create classifier
    #[must_use]
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    async fn try_classify(&self, raw_query: &str) -> Result<Classification, ClassificationError> {
        let text = self
            .gateway
            .generate_text(&classification_prompt(raw_query))
            .await?;
        parse_classification(&text)
    }
}

#[async_trait]
impl Classifier for LlmQueryClassifier {
    async fn classify(&self, raw_query: &str) -> Classification {
        match self.try_classify(raw_query).await {
            Ok(classification) => {
                tracing::info!(
                    temporal = classification.temporal,
                    question = classification.question,
                    scenes = classification.scenes.len(),
                    "query classified"
                );
                classification
            }
            Err(e) => {
                tracing::warn!(error = %e, "classification degraded to single scene");
                Classification::fallback(raw_query)
            }
        }
    }
}

/// Read a classification from model output
///
/// Booleans default to false when absent. A scene without an index takes
/// its 1-based position; `number_of_scenes` is always recomputed.
///
/// # Errors
/// [`ClassificationError`] when no object is recoverable, the scene list is
/// empty, or a scene lacks a description or repeats an index.
pub fn parse_classification(text: &str) -> Result<Classification, ClassificationError> {
    let object = parse_text(text)?;

    let scenes = match object.get("scenes") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        _ => return Err(ClassificationError::NoScenes),
    };

    let mut seen = HashSet::new();
    let mut parsed = Vec::with_capacity(scenes.len());
    for (position, entry) in scenes.iter().enumerate() {
        let scene = parse_scene(entry, position)?;
        if !seen.insert(scene.index) {
            return Err(ClassificationError::InvalidScene {
                position,
                reason: format!("duplicate scene index {}", scene.index),
            });
        }
        parsed.push(scene);
    }

    let question = flag(&object, "question") || parsed.iter().any(|s| s.has_question);
    Ok(Classification::new(flag(&object, "temporal"), question, parsed))
}

fn parse_scene(entry: &Value, position: usize) -> Result<Scene, ClassificationError> {
    let invalid = |reason: &str| ClassificationError::InvalidScene {
        position,
        reason: reason.to_string(),
    };
    let map = entry.as_object().ok_or_else(|| invalid("not an object"))?;

    let index = match map.get("scene").or_else(|| map.get("index")) {
        None | Some(Value::Null) => u32::try_from(position + 1).map_err(|_| invalid("too many scenes"))?,
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| invalid("scene index must be a positive integer"))?,
    };

    let description = map
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| invalid("missing description"))?;

    let specific_question = map
        .get("specific_question")
        .or_else(|| map.get("specificQuestion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let mut scene = Scene::new(index, description);
    let has_question = flag(map, "question") || flag(map, "hasQuestion");
    if let Some(question) = specific_question {
        scene = scene.with_question(question);
    }
    scene.has_question = has_question || scene.has_question;
    Ok(scene)
}

/// Boolean flag, accepting "true"/"false" strings
fn flag(map: &Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::gateway::MockLlmGateway;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_temporal_classification() {
        let text = r#"```json
        {"temporal": true, "question": false, "number_of_scenes": 5, "scenes": [
            {"scene": 1, "description": "woman enters bank", "question": false, "specific_question": null},
            {"scene": 2, "description": "woman at counter", "question": true, "specific_question": "what color is her bag?"}
        ]}
        ```"#;
        let c = parse_classification(text).unwrap();
        assert!(c.temporal);
        assert!(c.question);
        assert_eq!(c.number_of_scenes, 2);
        assert_eq!(c.scenes[1].question(), Some("what color is her bag?"));
        assert!(c.is_well_formed());
    }

    #[test]
    fn missing_index_uses_position() {
        let c = parse_classification(r#"{"scenes": [{"description": "a"}, {"description": "b"}]}"#)
            .unwrap();
        assert_eq!(c.scenes.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 2]);
        assert!(!c.temporal);
    }

    #[test]
    fn rejects_structural_problems() {
        assert_eq!(
            parse_classification(r#"{"temporal": true}"#),
            Err(ClassificationError::NoScenes)
        );
        assert!(matches!(
            parse_classification(r#"{"scenes": [{"scene": 1}]}"#),
            Err(ClassificationError::InvalidScene { position: 0, .. })
        ));
        assert!(matches!(
            parse_classification(
                r#"{"scenes": [{"scene": 1, "description": "a"}, {"scene": 1, "description": "b"}]}"#
            ),
            Err(ClassificationError::InvalidScene { position: 1, .. })
        ));
        assert!(matches!(
            parse_classification("no json here"),
            Err(ClassificationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn gateway_failure_falls_back() {
        let mut gateway = MockLlmGateway::new();
        gateway
            .expect_generate_text()
            .times(1)
            .returning(|_| Err(GatewayError::Transport("down".into())));

        let c = LlmQueryClassifier::new(Arc::new(gateway))
            .classify("a red car at night")
            .await;
        assert_eq!(c, Classification::fallback("a red car at night"));
    }

    #[tokio::test]
    async fn classifies_through_gateway() {
        let mut gateway = MockLlmGateway::new();
        gateway.expect_generate_text().times(1).returning(|prompt| {
            assert!(prompt.contains("two dogs"));
            Ok(r#"{"temporal": false, "question": false, "scenes": [{"scene": 1, "description": "two dogs"}]}"#.to_string())
        });

        let c = LlmQueryClassifier::new(Arc::new(gateway)).classify("two dogs").await;
        assert_eq!(c.scenes, vec![Scene::new(1, "two dogs")]);
    }
}

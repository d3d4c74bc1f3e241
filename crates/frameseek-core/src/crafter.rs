//! Prompt crafting
//!
//! Turns a classification into per-scene search prompts. Unlike
//! classification, crafting failures are fatal for the query.

use crate::error::PromptCraftingError;
use crate::gateway::LlmGateway;
use crate::parser::parse_text;
use crate::prompts::crafting_prompt;
use crate::types::{Classification, CraftedPrompts, Modality, ScenePrompt};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Produces search prompts for a classification
#[async_trait]
pub trait PromptCrafter: Send + Sync {
    /// Craft prompts for every scene of `classification`
    ///
    /// # Errors
    /// [`PromptCraftingError`] when no usable prompts could be produced.
    async fn craft(&self, classification: &Classification)
        -> Result<CraftedPrompts, PromptCraftingError>;
}

/// Prompt crafter backed by a text-generation model
#[derive(Clone)]
pub struct LlmPromptCrafter {
    gateway: Arc<dyn LlmGateway>,
}

impl LlmPromptCrafter {
    /// Create crafter
    #[must_use]
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl PromptCrafter for LlmPromptCrafter {
    async fn craft(
        &self,
        classification: &Classification,
    ) -> Result<CraftedPrompts, PromptCraftingError> {
        let text = self
            .gateway
            .generate_text(&crafting_prompt(classification))
            .await?;
        let crafted = parse_crafted_prompts(&text)?;
        tracing::info!(
            clip = crafted.clip_prompts.len(),
            caption = crafted.caption_prompts.len(),
            question = crafted.question.is_some(),
            "prompts crafted"
        );
        Ok(crafted)
    }
}

/// Read crafted prompts from model output
///
/// `clip_prompts`, `caption_prompts` and `question` must all be present
/// (`question` may be null). Every entry must carry its scene index.
///
/// # Errors
/// [`PromptCraftingError`] describing the first violation found.
pub fn parse_crafted_prompts(text: &str) -> Result<CraftedPrompts, PromptCraftingError> {
    let object = parse_text(text)?;

    if let Some(reported) = object.get("error") {
        let message = reported
            .as_str()
            .map_or_else(|| reported.to_string(), str::to_string);
        return Err(PromptCraftingError::Reported(message));
    }

    let clip_prompts = scene_prompts(&object, "clip_prompts", "clipPrompts", Modality::Clip)?;
    let caption_prompts =
        scene_prompts(&object, "caption_prompts", "captionPrompts", Modality::Caption)?;

    let question = match object.get("question") {
        None => return Err(PromptCraftingError::MissingKey("question")),
        Some(Value::Null) => None,
        Some(Value::String(q)) => Some(q.trim().to_string()).filter(|q| !q.is_empty()),
        Some(_) => {
            return Err(PromptCraftingError::InvalidEntry {
                key: "question",
                reason: "expected a string or null".to_string(),
            })
        }
    };

    Ok(CraftedPrompts {
        clip_prompts,
        caption_prompts,
        question,
    })
}

fn scene_prompts(
    object: &Map<String, Value>,
    key: &'static str,
    alias: &str,
    modality: Modality,
) -> Result<Vec<ScenePrompt>, PromptCraftingError> {
    let entries = object
        .get(key)
        .or_else(|| object.get(alias))
        .ok_or(PromptCraftingError::MissingKey(key))?
        .as_array()
        .ok_or_else(|| PromptCraftingError::InvalidEntry {
            key,
            reason: "expected an array".to_string(),
        })?;

    entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let scene = entry
                .get("scene")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(PromptCraftingError::MissingSceneIndex { modality, position })?;
            let prompt = entry
                .get("prompt")
                .and_then(Value::as_str)
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| PromptCraftingError::InvalidEntry {
                    key,
                    reason: format!("entry #{position} has no prompt text"),
                })?;
            Ok(ScenePrompt::new(scene, prompt.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockLlmGateway;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_fenced_prompts() {
        let text = r#"```json
        {
          "clip_prompts": [{"scene": 2, "prompt": "woman at bank counter"}, {"scene": 1, "prompt": "woman entering bank"}],
          "caption_prompts": [{"scene": 1, "prompt": "người phụ nữ vào ngân hàng"}, {"scene": 2, "prompt": "người phụ nữ tại quầy"}],
          "question": null
        }
        ```"#;
        let crafted = parse_crafted_prompts(text).unwrap();
        assert_eq!(crafted.prompt_for(Modality::Clip, 1), Some("woman entering bank"));
        assert_eq!(crafted.prompt_for(Modality::Caption, 2), Some("người phụ nữ tại quầy"));
        assert_eq!(crafted.question, None);
    }

    #[test]
    fn missing_keys_are_fatal() {
        assert!(matches!(
            parse_crafted_prompts(r#"{"clip_prompts": [], "question": null}"#),
            Err(PromptCraftingError::MissingKey("caption_prompts"))
        ));
        assert!(matches!(
            parse_crafted_prompts(r#"{"clip_prompts": [], "caption_prompts": []}"#),
            Err(PromptCraftingError::MissingKey("question"))
        ));
    }

    #[test]
    fn entries_need_scene_index() {
        let err = parse_crafted_prompts(
            r#"{"clip_prompts": [{"scene": 1, "prompt": "a"}, {"prompt": "b"}], "caption_prompts": [], "question": null}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PromptCraftingError::MissingSceneIndex {
                modality: Modality::Clip,
                position: 1
            }
        ));
    }

    #[test]
    fn reported_error_is_surfaced() {
        let err = parse_crafted_prompts(r#"{"error": "cannot craft"}"#).unwrap_err();
        assert_eq!(err.to_string(), "model reported error: cannot craft");
    }

    #[tokio::test]
    async fn craft_propagates_gateway_failure() {
        let mut gateway = MockLlmGateway::new();
        gateway.expect_generate_text().times(1).returning(|_| {
            Err(crate::error::GatewayError::Provider {
                status: 503,
                message: "overloaded".into(),
            })
        });

        let err = LlmPromptCrafter::new(Arc::new(gateway))
            .craft(&Classification::fallback("a cat"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}

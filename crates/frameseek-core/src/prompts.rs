//! Prompt templates
//!
//! Wording is free to change; the JSON shapes requested here are the
//! contracts the parsers in this crate enforce.

use crate::types::{Classification, ValidatedResult};
use std::fmt::Write as _;

/// Prompt asking a vision model to judge one frame against a search prompt
#[must_use]
pub fn validation_prompt(image_path: &str, target: &str, question: Option<&str>) -> String {
    let mut prompt = format!(
        r#"You are an expert image analyst validating keyframes for a video search.

Image: "{image_path}"

Target description:
"{target}"

Compare the attached image to the target description and categorize it:
- "Exact Match": every aspect of the description is visible.
- "Near Match": close, with minor differences.
- "Weak Match": some elements match, significant details are missing.
- "No Match": the image does not match.

Give a confidence between 0 and 1 and a one or two sentence justification.
"#
    );

    if let Some(question) = question {
        let _ = write!(
            prompt,
            r#"
If the image is an Exact or Near Match, also answer this question from what is visible:
"{question}"
Use null for the answer when it cannot be read from the image.
"#
        );
    }

    let question_json = question.map_or_else(|| "null".to_string(), |q| format!("{q:?}"));
    let _ = write!(
        prompt,
        r#"
Respond with only this JSON object:
{{
  "imagePath": "{image_path}",
  "questionAnswer": {{"question": {question_json}, "answer": <string or null>, "confidence": <0..1>}},
  "matchAssessment": {{"category": "<Exact Match|Near Match|Weak Match|No Match>", "confidence": <0..1>}},
  "justification": "<brief explanation>"
}}
"#
    );
    prompt
}

/// Prompt asking a model to classify a raw query into scenes
#[must_use]
pub fn classification_prompt(raw_query: &str) -> String {
    format!(
        r#"You analyze queries for a keyframe retrieval system.

Classify the query:
1. "temporal": true when it describes a sequence of events over time, else false.
2. "question": true when it asks for information to be read from a frame, else false.
3. Break temporal queries into chronological scenes; non-temporal queries get one scene.
   Describe each scene with concise, objective visual language.

Query:
"{raw_query}"

Respond with only this JSON object:
{{
  "temporal": <true|false>,
  "question": <true|false>,
  "number_of_scenes": <integer>,
  "scenes": [
    {{"scene": <1-based integer>, "description": "<visual description>", "question": <true|false>, "specific_question": "<question or null>"}}
  ]
}}
"#
    )
}

/// Prompt asking a model to craft per-scene search prompts
#[must_use]
pub fn crafting_prompt(classification: &Classification) -> String {
    let classification_json =
        serde_json::to_string_pretty(classification).unwrap_or_else(|_| format!("{classification:?}"));
    format!(
        r#"You craft search prompts for a multi-modal keyframe retrieval system.

Search modalities:
- CLIP search: concise English description of visual elements (nouns, colors, actions, counts).
- Caption search: a faithful Vietnamese translation of the CLIP prompt.

For temporal queries write one prompt per scene and carry relevant details from earlier scenes.
For question queries describe the scene that answers the question; do not include the question itself.

Classification:
{classification_json}

Respond with only this JSON object; every entry must carry its scene index:
{{
  "clip_prompts": [{{"scene": <integer>, "prompt": "<english prompt>"}}],
  "caption_prompts": [{{"scene": <integer>, "prompt": "<vietnamese prompt>"}}],
  "question": "<question or null>"
}}
"#
    )
}

/// Prompt asking a model to revise a classification after an unsatisfying attempt
#[must_use]
pub fn refinement_prompt(
    raw_query: &str,
    previous: &Classification,
    results: &[ValidatedResult],
    attempt: u32,
) -> String {
    let previous_json =
        serde_json::to_string_pretty(previous).unwrap_or_else(|_| format!("{previous:?}"));

    let mut evidence = String::new();
    for result in results.iter().take(20) {
        let _ = writeln!(
            evidence,
            "- {} [{}, {:.2}]: {}",
            result.image_path,
            result.category(),
            result.confidence(),
            result.justification
        );
    }
    if evidence.is_empty() {
        evidence.push_str("- no candidates were found\n");
    }

    format!(
        r#"You support a keyframe retrieval system.

Attempt {attempt} to answer this query produced no satisfactory match:
"{raw_query}"

Classification used:
{previous_json}

Best validated candidates:
{evidence}
Work out why the search failed (overly specific details, rare elements, wrong scene split) and
write revised scene descriptions that keep the query's intent.

Respond with only this JSON object:
{{
  "temporal": <true|false>,
  "question": <true|false>,
  "number_of_scenes": <integer>,
  "scenes": [
    {{"scene": <1-based integer>, "description": "<revised description>", "question": <true|false>, "specific_question": "<question or null>"}}
  ]
}}
"#
    )
}

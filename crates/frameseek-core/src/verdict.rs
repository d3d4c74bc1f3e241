//! Verdict normalization
//!
//! Turns a parsed validator response into a [`ValidatedResult`], enforcing the
//! shape contract:
//! - `imagePath`, `questionAnswer`, `matchAssessment`, `justification` present
//! - `category` one of the four verdicts
//! - both confidences within `[0, 1]` (rejected, never clamped)
//!
//! A bare-string `matchAssessment` is accepted as `{category, confidence: 0}`.
//! snake_case spellings of the field names are accepted too.

use crate::error::VerdictError;
use crate::types::{MatchAssessment, MatchCategory, QuestionAnswer, ValidatedResult};
use serde_json::{Map, Value};

/// Normalize a parsed verdict for `image_path`
///
/// The requested path is kept on the result so callers can re-associate
/// verdicts even when the model echoes a different path.
///
/// # Errors
/// [`VerdictError`] on any shape violation.
pub fn normalize_verdict(
    object: &Map<String, Value>,
    image_path: &str,
) -> Result<ValidatedResult, VerdictError> {
    let echoed = field(object, "imagePath", "image_path").ok_or(VerdictError::MissingField("imagePath"))?;
    if !echoed.is_string() {
        return Err(VerdictError::WrongType {
            field: "imagePath",
            expected: "a string",
        });
    }

    let match_assessment = normalize_assessment(
        field(object, "matchAssessment", "match_assessment")
            .ok_or(VerdictError::MissingField("matchAssessment"))?,
    )?;

    let question_answer = normalize_question_answer(
        field(object, "questionAnswer", "question_answer")
            .ok_or(VerdictError::MissingField("questionAnswer"))?,
    )?;

    let justification = match object
        .get("justification")
        .ok_or(VerdictError::MissingField("justification"))?
    {
        Value::String(text) => text.clone(),
        _ => {
            return Err(VerdictError::WrongType {
                field: "justification",
                expected: "a string",
            })
        }
    };

    Ok(ValidatedResult {
        image_path: image_path.to_string(),
        scene: None,
        match_assessment,
        question_answer,
        justification,
        next_scene: None,
    })
}

fn field<'a>(object: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    object.get(camel).or_else(|| object.get(snake))
}

fn normalize_assessment(value: &Value) -> Result<MatchAssessment, VerdictError> {
    match value {
        Value::String(label) => Ok(MatchAssessment::new(parse_category(label)?, 0.0)),
        Value::Object(map) => {
            let category = match map.get("category") {
                Some(Value::String(label)) => parse_category(label)?,
                Some(_) => {
                    return Err(VerdictError::WrongType {
                        field: "matchAssessment.category",
                        expected: "a string",
                    })
                }
                None => return Err(VerdictError::MissingField("matchAssessment.category")),
            };
            let confidence = confidence(map.get("confidence"), "matchAssessment.confidence")?;
            Ok(MatchAssessment::new(category, confidence))
        }
        _ => Err(VerdictError::WrongType {
            field: "matchAssessment",
            expected: "an object or a category string",
        }),
    }
}

fn normalize_question_answer(value: &Value) -> Result<QuestionAnswer, VerdictError> {
    let map = value.as_object().ok_or(VerdictError::WrongType {
        field: "questionAnswer",
        expected: "an object",
    })?;

    let question = optional_text(
        map.get("question")
            .ok_or(VerdictError::MissingField("questionAnswer.question"))?,
        "questionAnswer.question",
    )?;
    let answer = optional_text(
        map.get("answer")
            .ok_or(VerdictError::MissingField("questionAnswer.answer"))?,
        "questionAnswer.answer",
    )?;
    let confidence = confidence(map.get("confidence"), "questionAnswer.confidence")?;

    Ok(QuestionAnswer {
        question,
        answer,
        confidence,
    })
}

fn parse_category(label: &str) -> Result<MatchCategory, VerdictError> {
    label
        .parse()
        .map_err(|_| VerdictError::UnknownCategory(label.to_string()))
}

fn confidence(value: Option<&Value>, field: &'static str) -> Result<f64, VerdictError> {
    let value = value.ok_or(VerdictError::MissingField(field))?;
    let number = value.as_f64().ok_or(VerdictError::WrongType {
        field,
        expected: "a number",
    })?;
    if !(0.0..=1.0).contains(&number) {
        return Err(VerdictError::ConfidenceOutOfRange {
            field,
            value: number,
        });
    }
    Ok(number)
}

/// Strings pass through; numbers and booleans are rendered; null is `None`
fn optional_text(value: &Value, field: &'static str) -> Result<Option<String>, VerdictError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(VerdictError::WrongType {
            field,
            expected: "a string or null",
        }),
    }
}

//! Core types for the retrieval pipeline
//!
//! Defines the data model shared by every stage:
//! - Query classification and scenes
//! - Crafted search prompts, keyed by explicit scene index
//! - Search candidates and validated verdicts
//! - Categorized match summaries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique query identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Ulid);

impl QueryId {
    /// Generate new query ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One chronological segment of a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// 1-based scene index
    #[serde(alias = "scene")]
    pub index: u32,
    /// Visual description of the scene
    pub description: String,
    /// Whether the scene carries an embedded question
    #[serde(alias = "hasQuestion", alias = "question")]
    pub has_question: bool,
    /// The embedded question, if any
    #[serde(alias = "specificQuestion")]
    pub specific_question: Option<String>,
}

impl Scene {
    /// Create a scene without a question
    #[inline]
    #[must_use]
    pub fn new(index: u32, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            has_question: false,
            specific_question: None,
        }
    }

    /// Attach an embedded question
    #[inline]
    #[must_use]
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.has_question = true;
        self.specific_question = Some(question.into());
        self
    }

    /// The question to ask validators for this scene, if any
    #[must_use]
    pub fn question(&self) -> Option<&str> {
        if self.has_question {
            self.specific_question.as_deref().filter(|q| !q.trim().is_empty())
        } else {
            None
        }
    }
}

/// Result of query classification
///
/// `number_of_scenes` always equals `scenes.len()` once built through
/// [`Classification::new`] or [`Classification::fallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Whether the query describes a sequence of scenes
    pub temporal: bool,
    /// Whether the query embeds a question
    pub question: bool,
    /// Number of scenes
    #[serde(alias = "numberOfScenes")]
    pub number_of_scenes: usize,
    /// Scenes in chronological order
    pub scenes: Vec<Scene>,
}

impl Classification {
    /// Build a classification, deriving `number_of_scenes` from `scenes`
    #[must_use]
    pub fn new(temporal: bool, question: bool, scenes: Vec<Scene>) -> Self {
        Self {
            temporal,
            question,
            number_of_scenes: scenes.len(),
            scenes,
        }
    }

    /// Safe default used when classification fails structurally
    ///
    /// A single non-temporal scene described by the raw query.
    #[must_use]
    pub fn fallback(raw_query: &str) -> Self {
        Self::new(false, false, vec![Scene::new(1, raw_query.trim())])
    }

    /// Check the scene-count invariant
    #[inline]
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.scenes.is_empty() && self.number_of_scenes == self.scenes.len()
    }

    /// Look up a scene by its 1-based index
    #[must_use]
    pub fn scene(&self, index: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.index == index)
    }
}

/// Search modality a prompt is crafted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Visual-embedding similarity search
    Clip,
    /// Descriptive-caption search
    Caption,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clip => f.write_str("clip"),
            Self::Caption => f.write_str("caption"),
        }
    }
}

/// A crafted prompt for one scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePrompt {
    /// 1-based scene index this prompt belongs to
    pub scene: u32,
    /// Prompt text
    pub prompt: String,
}

impl ScenePrompt {
    /// Create scene prompt
    #[inline]
    #[must_use]
    pub fn new(scene: u32, prompt: impl Into<String>) -> Self {
        Self {
            scene,
            prompt: prompt.into(),
        }
    }
}

/// Search prompts produced by the prompt crafter
///
/// Entries are always looked up by their `scene` field, never by position.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CraftedPrompts {
    /// Prompts for visual-embedding search
    #[serde(alias = "clipPrompts")]
    pub clip_prompts: Vec<ScenePrompt>,
    /// Prompts for caption search
    #[serde(alias = "captionPrompts")]
    pub caption_prompts: Vec<ScenePrompt>,
    /// Question extracted from the query, if any
    pub question: Option<String>,
}

impl CraftedPrompts {
    /// Prompt for a modality and scene
    #[must_use]
    pub fn prompt_for(&self, modality: Modality, scene: u32) -> Option<&str> {
        let prompts = match modality {
            Modality::Clip => &self.clip_prompts,
            Modality::Caption => &self.caption_prompts,
        };
        prompts
            .iter()
            .find(|p| p.scene == scene)
            .map(|p| p.prompt.as_str())
    }

    /// Every prompt variant across all scenes
    #[must_use]
    pub fn variants(&self) -> Vec<PromptVariant> {
        let clip = self.clip_prompts.iter().map(|p| (Modality::Clip, p));
        let caption = self.caption_prompts.iter().map(|p| (Modality::Caption, p));
        clip.chain(caption)
            .map(|(modality, p)| PromptVariant {
                scene: p.scene,
                modality,
                prompt: p.prompt.clone(),
                question: self.question.clone(),
            })
            .collect()
    }

    /// Question validators should answer for `scene`
    ///
    /// The scene's own question takes precedence over the crafted one.
    #[must_use]
    pub fn question_for(&self, scene: &Scene) -> Option<String> {
        scene
            .question()
            .map(str::to_string)
            .or_else(|| self.question.clone().filter(|_| scene.has_question))
    }

    /// Prompt variants for one scene
    #[must_use]
    pub fn variants_for(&self, scene: &Scene) -> Vec<PromptVariant> {
        let question = self.question_for(scene);

        [Modality::Clip, Modality::Caption]
            .into_iter()
            .filter_map(|modality| {
                self.prompt_for(modality, scene.index).map(|prompt| PromptVariant {
                    scene: scene.index,
                    modality,
                    prompt: prompt.to_string(),
                    question: question.clone(),
                })
            })
            .collect()
    }
}

/// One prompt a candidate is validated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptVariant {
    /// Scene the prompt belongs to
    pub scene: u32,
    /// Modality the prompt was crafted for
    pub modality: Modality,
    /// Prompt text
    pub prompt: String,
    /// Question to answer alongside validation
    pub question: Option<String>,
}

/// A frame returned by a search collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateImage {
    /// Path of the keyframe image
    #[serde(alias = "imagePath")]
    pub image_path: String,
    /// Embedding distance, present only for similarity search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

impl CandidateImage {
    /// Candidate without a distance score
    #[inline]
    #[must_use]
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            distance: None,
        }
    }

    /// Candidate from embedding search
    #[inline]
    #[must_use]
    pub fn with_distance(image_path: impl Into<String>, distance: f32) -> Self {
        Self {
            image_path: image_path.into(),
            distance: Some(distance),
        }
    }
}

/// Four-level categorical verdict, ordered by decreasing relevance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchCategory {
    /// Every aspect of the prompt matches
    #[serde(rename = "Exact Match")]
    ExactMatch,
    /// Close match with minor differences
    #[serde(rename = "Near Match")]
    NearMatch,
    /// Some elements match, significant details missing
    #[serde(rename = "Weak Match")]
    WeakMatch,
    /// Unrelated
    #[serde(rename = "No Match")]
    NoMatch,
}

impl MatchCategory {
    /// All categories in decreasing relevance
    pub const ALL: [Self; 4] = [
        Self::ExactMatch,
        Self::NearMatch,
        Self::WeakMatch,
        Self::NoMatch,
    ];

    /// Rank used when choosing chain candidates (lower is stronger)
    ///
    /// Weak and No matches share one rank.
    #[inline]
    #[must_use]
    pub fn chain_rank(self) -> u8 {
        match self {
            Self::ExactMatch => 0,
            Self::NearMatch => 1,
            Self::WeakMatch | Self::NoMatch => 2,
        }
    }

    /// Strict relevance order over all four categories
    #[inline]
    #[must_use]
    pub fn relevance_rank(self) -> u8 {
        match self {
            Self::ExactMatch => 0,
            Self::NearMatch => 1,
            Self::WeakMatch => 2,
            Self::NoMatch => 3,
        }
    }

    /// Exact or Near
    #[inline]
    #[must_use]
    pub fn is_promising(self) -> bool {
        matches!(self, Self::ExactMatch | Self::NearMatch)
    }

    /// Canonical display label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ExactMatch => "Exact Match",
            Self::NearMatch => "Near Match",
            Self::WeakMatch => "Weak Match",
            Self::NoMatch => "No Match",
        }
    }
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a category label is not one of the four verdicts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown match category: {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for MatchCategory {
    type Err = UnknownCategory;

    /// Accepts "Exact Match", "ExactMatch", "exact_match" and similar spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "exactmatch" => Ok(Self::ExactMatch),
            "nearmatch" => Ok(Self::NearMatch),
            "weakmatch" => Ok(Self::WeakMatch),
            "nomatch" => Ok(Self::NoMatch),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Category plus confidence in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchAssessment {
    /// Verdict category
    pub category: MatchCategory,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl MatchAssessment {
    /// Create assessment
    #[inline]
    #[must_use]
    pub fn new(category: MatchCategory, confidence: f64) -> Self {
        Self {
            category,
            confidence,
        }
    }
}

/// Answer to the question embedded in a query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuestionAnswer {
    /// Question asked
    pub question: Option<String>,
    /// Answer given, if any
    pub answer: Option<String>,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

/// Verdict for one image against one prompt
///
/// `next_scene` is the only field written after creation: the chain walker
/// backfills it with the confirmed continuation in the following scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedResult {
    /// Image the verdict is about
    pub image_path: String,
    /// Scene the verdict was produced for, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<u32>,
    /// Category and confidence
    pub match_assessment: MatchAssessment,
    /// Answer to the embedded question
    pub question_answer: QuestionAnswer,
    /// Model justification or failure cause
    pub justification: String,
    /// Confirmed continuation in the next scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<Box<ValidatedResult>>,
}

impl ValidatedResult {
    /// NoMatch verdict substituted when validation cannot complete
    #[must_use]
    pub fn sentinel(image_path: impl Into<String>, question: Option<&str>, cause: &str) -> Self {
        Self {
            image_path: image_path.into(),
            scene: None,
            match_assessment: MatchAssessment::new(MatchCategory::NoMatch, 0.0),
            question_answer: QuestionAnswer {
                question: question.map(str::to_string),
                answer: None,
                confidence: 0.0,
            },
            justification: format!("validation failed: {cause}"),
            next_scene: None,
        }
    }

    /// Tag with scene index
    #[inline]
    #[must_use]
    pub fn with_scene(mut self, scene: u32) -> Self {
        self.scene = Some(scene);
        self
    }

    /// Verdict category
    #[inline]
    #[must_use]
    pub fn category(&self) -> MatchCategory {
        self.match_assessment.category
    }

    /// Verdict confidence
    #[inline]
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.match_assessment.confidence
    }

    /// Whether this verdict is a validation-failure sentinel
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.category() == MatchCategory::NoMatch
            && self.confidence() == 0.0
            && self.justification.starts_with("validation failed:")
    }

    /// Number of links in the chain starting here (at least 1)
    #[must_use]
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut cursor = self.next_scene.as_deref();
        while let Some(next) = cursor {
            len += 1;
            cursor = next.next_scene.as_deref();
        }
        len
    }

    /// Iterate this result and its chained continuations
    pub fn chain(&self) -> impl Iterator<Item = &ValidatedResult> {
        std::iter::successors(Some(self), |r| r.next_scene.as_deref())
    }
}

/// Image paths grouped by verdict category
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchSummary {
    /// Exact matches
    pub exact_matches: Vec<String>,
    /// Near matches
    pub near_matches: Vec<String>,
    /// Weak matches
    pub weak_matches: Vec<String>,
    /// Non-matches, sentinels included
    pub no_matches: Vec<String>,
}

impl MatchSummary {
    /// Group results, following chained continuations
    ///
    /// A path appears once, under the strongest category it received.
    #[must_use]
    pub fn from_results(results: &[ValidatedResult]) -> Self {
        let mut best: indexmap::IndexMap<&str, MatchCategory> = indexmap::IndexMap::new();
        for result in results.iter().flat_map(ValidatedResult::chain) {
            best.entry(result.image_path.as_str())
                .and_modify(|c| {
                    if result.category().relevance_rank() < c.relevance_rank() {
                        *c = result.category();
                    }
                })
                .or_insert(result.category());
        }

        let mut summary = Self::default();
        for (path, category) in best {
            let bucket = match category {
                MatchCategory::ExactMatch => &mut summary.exact_matches,
                MatchCategory::NearMatch => &mut summary.near_matches,
                MatchCategory::WeakMatch => &mut summary.weak_matches,
                MatchCategory::NoMatch => &mut summary.no_matches,
            };
            bucket.push(path.to_string());
        }
        summary
    }

    /// At least one Exact or Near match
    #[inline]
    #[must_use]
    pub fn has_satisfactory_match(&self) -> bool {
        !self.exact_matches.is_empty() || !self.near_matches.is_empty()
    }
}

/// Best-confidence answer to `question` among Exact/Near verdicts
///
/// Chained continuations are searched too.
#[must_use]
pub fn extract_answer<'a>(results: &'a [ValidatedResult], question: &str) -> Option<&'a str> {
    results
        .iter()
        .flat_map(ValidatedResult::chain)
        .filter(|r| r.category().is_promising())
        .filter(|r| r.question_answer.question.as_deref() == Some(question))
        .filter_map(|r| {
            r.question_answer
                .answer
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .map(|a| (a, r.question_answer.confidence))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(answer, _)| answer)
}

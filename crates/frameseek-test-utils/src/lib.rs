//! Testing utilities for Frameseek workspace
//!
//! Scripted collaborators that record how they were called, plus fixture
//! builders for classifications, prompts and verdict payloads.

#![allow(missing_docs)]

use async_trait::async_trait;
use frameseek_core::{
    CandidateImage, Classification, Classifier, CraftedPrompts, GatewayError, LlmGateway,
    ModelResponse, Modality, PromptCrafter, PromptCraftingError, QueryRefiner, Scene, ScenePrompt,
    SearchError, SearchIndex, TemporalNeighborLookup, ValidatedResult,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Decides an image-analysis response from (image path, validation prompt,
/// 1-based attempt number for that path)
pub type ImageResponder =
    dyn Fn(&str, &str, usize) -> Result<ModelResponse, GatewayError> + Send + Sync;

/// Decides a text-generation response from (prompt, 1-based call number)
pub type TextResponder = dyn Fn(&str, usize) -> Result<String, GatewayError> + Send + Sync;

/// Gateway driven by closures, counting every call
pub struct ScriptedGateway {
    image: Box<ImageResponder>,
    text: Box<TextResponder>,
    image_calls: AtomicUsize,
    text_calls: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedGateway {
    /// Every image is a No Match; text generation fails
    pub fn new() -> Self {
        Self {
            image: Box::new(|path: &str, _: &str, _: usize| {
                Ok(verdict_response(path, "No Match", 0.9))
            }),
            text: Box::new(|_: &str, _: usize| {
                Err(GatewayError::Transport("no text script".into()))
            }),
            image_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn on_image<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &str, usize) -> Result<ModelResponse, GatewayError> + Send + Sync + 'static,
    {
        self.image = Box::new(responder);
        self
    }

    pub fn on_text<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, usize) -> Result<String, GatewayError> + Send + Sync + 'static,
    {
        self.text = Box::new(responder);
        self
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    /// Image-analysis calls made for one path
    pub fn calls_for(&self, image_path: &str) -> usize {
        self.attempts.lock().get(image_path).copied().unwrap_or(0)
    }

    /// (image path, validation prompt) of every image call, in call order
    pub fn image_requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError> {
        let call = self.text_calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.text)(prompt, call)
    }

    async fn analyze_image(
        &self,
        image_path: &str,
        prompt: &str,
    ) -> Result<ModelResponse, GatewayError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(image_path.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.requests
            .lock()
            .push((image_path.to_string(), prompt.to_string()));
        (self.image)(image_path, prompt, attempt)
    }
}

/// Search index answering from fixed prompt → candidates tables
#[derive(Default)]
pub struct StaticSearchIndex {
    clip: HashMap<String, Vec<CandidateImage>>,
    caption: HashMap<String, Vec<CandidateImage>>,
    queries: Mutex<Vec<(Modality, String)>>,
}

impl StaticSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clip results for `prompt`; distances grow by 0.1 per rank
    pub fn with_clip(mut self, prompt: &str, paths: &[&str]) -> Self {
        let candidates = paths
            .iter()
            .zip(1u8..)
            .map(|(path, rank)| CandidateImage::with_distance(*path, f32::from(rank) / 10.0))
            .collect();
        self.clip.insert(prompt.to_string(), candidates);
        self
    }

    pub fn with_caption(mut self, prompt: &str, paths: &[&str]) -> Self {
        let candidates = paths.iter().map(|path| CandidateImage::new(*path)).collect();
        self.caption.insert(prompt.to_string(), candidates);
        self
    }

    /// Every search made, in call order
    pub fn queries(&self) -> Vec<(Modality, String)> {
        self.queries.lock().clone()
    }

    pub fn was_queried(&self, prompt: &str) -> bool {
        self.queries.lock().iter().any(|(_, p)| p == prompt)
    }
}

#[async_trait]
impl SearchIndex for StaticSearchIndex {
    async fn search(&self, prompt: &str, top_k: usize) -> Result<Vec<CandidateImage>, SearchError> {
        self.queries.lock().push((Modality::Clip, prompt.to_string()));
        Ok(lookup(&self.clip, prompt, top_k))
    }

    async fn caption_search(
        &self,
        prompt: &str,
        top_k: usize,
    ) -> Result<Vec<CandidateImage>, SearchError> {
        self.queries
            .lock()
            .push((Modality::Caption, prompt.to_string()));
        Ok(lookup(&self.caption, prompt, top_k))
    }
}

fn lookup(table: &HashMap<String, Vec<CandidateImage>>, prompt: &str, top_k: usize) -> Vec<CandidateImage> {
    table
        .get(prompt)
        .map(|candidates| candidates.iter().take(top_k).cloned().collect())
        .unwrap_or_default()
}

/// Neighbor lookup from a fixed frame → following frames table
#[derive(Default)]
pub struct StaticNeighbors {
    frames: HashMap<String, Vec<CandidateImage>>,
    lookups: Mutex<Vec<String>>,
}

impl StaticNeighbors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, from: &str, following: &[&str]) -> Self {
        self.frames.insert(
            from.to_string(),
            following.iter().map(|p| CandidateImage::new(*p)).collect(),
        );
        self
    }

    /// Frames looked up, in call order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl TemporalNeighborLookup for StaticNeighbors {
    async fn neighbors(
        &self,
        image_path: &str,
        count: usize,
    ) -> Result<Vec<CandidateImage>, SearchError> {
        self.lookups.lock().push(image_path.to_string());
        self.frames
            .get(image_path)
            .map(|frames| frames.iter().take(count).cloned().collect())
            .ok_or_else(|| SearchError::UnknownFrame(image_path.to_string()))
    }
}

/// Classifier returning a fixed classification
pub struct FixedClassifier {
    classification: Classification,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(classification: Classification) -> Self {
        Self {
            classification,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _raw_query: &str) -> Classification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.classification.clone()
    }
}

/// Crafter deriving prompts from scene indices, or always failing
pub struct FixedCrafter {
    question: Option<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedCrafter {
    /// Crafts [`crafted_for`] prompts for every classification
    pub fn new() -> Self {
        Self {
            question: None,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_question(mut self, question: &str) -> Self {
        self.question = Some(question.to_string());
        self
    }

    /// Fails every call with a missing-key error
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FixedCrafter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PromptCrafter for FixedCrafter {
    async fn craft(
        &self,
        classification: &Classification,
    ) -> Result<CraftedPrompts, PromptCraftingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PromptCraftingError::MissingKey("clip_prompts"));
        }
        let mut crafted = crafted_for(classification);
        crafted.question.clone_from(&self.question);
        Ok(crafted)
    }
}

/// Refiner handing out a queue of revisions, then `None`
pub struct QueuedRefiner {
    revisions: Mutex<Vec<Classification>>,
    calls: AtomicUsize,
}

impl QueuedRefiner {
    pub fn new(revisions: Vec<Classification>) -> Self {
        Self {
            revisions: Mutex::new(revisions),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRefiner for QueuedRefiner {
    async fn refine(
        &self,
        _raw_query: &str,
        _previous: &Classification,
        _results: &[ValidatedResult],
        _attempt: u32,
    ) -> Option<Classification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut revisions = self.revisions.lock();
        (!revisions.is_empty()).then(|| revisions.remove(0))
    }
}

/// `n` scenes described "scene 1" .. "scene n"
pub fn classification(temporal: bool, n: u32) -> Classification {
    Classification::new(
        temporal,
        false,
        (1..=n).map(|i| Scene::new(i, format!("scene {i}"))).collect(),
    )
}

/// Prompts "clip {index}" and "caption {index}" for every scene
pub fn crafted_for(classification: &Classification) -> CraftedPrompts {
    let prompts = |prefix: &str| {
        classification
            .scenes
            .iter()
            .map(|s| ScenePrompt::new(s.index, format!("{prefix} {}", s.index)))
            .collect::<Vec<_>>()
    };
    CraftedPrompts {
        clip_prompts: prompts("clip"),
        caption_prompts: prompts("caption"),
        question: None,
    }
}

/// Well-formed validator payload
pub fn verdict_json(image_path: &str, category: &str, confidence: f64) -> String {
    serde_json::json!({
        "imagePath": image_path,
        "questionAnswer": {"question": null, "answer": null, "confidence": 0.0},
        "matchAssessment": {"category": category, "confidence": confidence},
        "justification": format!("{category} for test"),
    })
    .to_string()
}

/// [`verdict_json`] as a text response
pub fn verdict_response(image_path: &str, category: &str, confidence: f64) -> ModelResponse {
    ModelResponse::Text(verdict_json(image_path, category, confidence))
}

/// Validator payload carrying an answer
pub fn answer_response(image_path: &str, question: &str, answer: &str, confidence: f64) -> ModelResponse {
    ModelResponse::Structured(serde_json::json!({
        "imagePath": image_path,
        "questionAnswer": {"question": question, "answer": answer, "confidence": confidence},
        "matchAssessment": {"category": "Exact Match", "confidence": 0.9},
        "justification": "answer visible",
    }))
}

/// Which scene a validation prompt targets, for prompts built by [`crafted_for`]
pub fn targeted_scene(validation_prompt: &str) -> Option<u32> {
    ["clip", "caption"].iter().find_map(|prefix| {
        let start = validation_prompt.find(&format!("\"{prefix} "))? + prefix.len() + 2;
        let digits: String = validation_prompt[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}

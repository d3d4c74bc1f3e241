use frameseek_core::{
    Classification, MatchCategory, ModelResponse, PipelineConfig, PipelineError,
    QueryPipelineOrchestrator, QueryRefiner, RetryPolicy, Scene, ValidatorConfig,
};
use frameseek_test_utils::{
    answer_response, classification, targeted_scene, verdict_response, FixedClassifier,
    FixedCrafter, QueuedRefiner, ScriptedGateway, StaticNeighbors, StaticSearchIndex,
};
use std::sync::Arc;

struct Harness {
    gateway: Arc<ScriptedGateway>,
    index: Arc<StaticSearchIndex>,
    neighbors: Arc<StaticNeighbors>,
    classifier: Arc<FixedClassifier>,
    crafter: Arc<FixedCrafter>,
}

impl Harness {
    fn new(
        gateway: ScriptedGateway,
        index: StaticSearchIndex,
        neighbors: StaticNeighbors,
        classification: Classification,
    ) -> Self {
        Self {
            gateway: Arc::new(gateway),
            index: Arc::new(index),
            neighbors: Arc::new(neighbors),
            classifier: Arc::new(FixedClassifier::new(classification)),
            crafter: Arc::new(FixedCrafter::new()),
        }
    }

    fn with_crafter(mut self, crafter: FixedCrafter) -> Self {
        self.crafter = Arc::new(crafter);
        self
    }

    fn orchestrator(&self, config: PipelineConfig) -> QueryPipelineOrchestrator {
        let config = config.with_validator(ValidatorConfig::new().with_retry(RetryPolicy::immediate(3)));
        QueryPipelineOrchestrator::new(
            self.gateway.clone(),
            self.index.clone(),
            self.neighbors.clone(),
            config,
        )
        .with_classifier(self.classifier.clone())
        .with_crafter(self.crafter.clone())
        .with_refiner(None)
    }
}

/// Scene 1 finds v1/0100.jpg; v1/0150.jpg continues it into scene 2
fn two_scene_index() -> StaticSearchIndex {
    StaticSearchIndex::new()
        .with_clip("clip 1", &["v1/0100.jpg"])
        .with_caption("caption 1", &["v1/0100.jpg"])
        .with_clip("clip 2", &["v9/0900.jpg"])
        .with_caption("caption 2", &[])
}

fn two_scene_neighbors() -> StaticNeighbors {
    StaticNeighbors::new().with("v1/0100.jpg", &["v1/0125.jpg", "v1/0150.jpg", "v1/0175.jpg"])
}

fn scene_scripted(continuation: &'static str) -> ScriptedGateway {
    ScriptedGateway::new().on_image(move |path, prompt, _| {
        let verdict = match (path, targeted_scene(prompt)) {
            ("v1/0100.jpg", Some(1)) => verdict_response(path, "Exact Match", 0.8),
            (p, Some(2)) if p == continuation => verdict_response(path, "Exact Match", 0.9),
            _ => verdict_response(path, "No Match", 0.9),
        };
        Ok(verdict)
    })
}

#[tokio::test]
async fn test_two_scene_chain_stops_after_first_scene() {
    let harness = Harness::new(
        scene_scripted("v1/0150.jpg"),
        two_scene_index(),
        two_scene_neighbors(),
        classification(true, 2),
    );

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("a car parks, then a man walks away", 500, None)
        .await
        .unwrap();

    assert!(report.chain_complete);
    assert!(!harness.index.was_queried("clip 2"));
    assert!(!harness.index.was_queried("caption 2"));
    assert_eq!(harness.neighbors.lookups(), vec!["v1/0100.jpg"]);

    // one candidate against the clip and caption variants of scene 1
    assert_eq!(report.results.len(), 2);
    let chained: Vec<_> = report.results.iter().filter(|r| r.next_scene.is_some()).collect();
    assert_eq!(chained.len(), 1);

    let head = chained[0];
    assert_eq!(head.image_path, "v1/0100.jpg");
    assert_eq!(head.scene, Some(1));
    let next = head.next_scene.as_deref().unwrap();
    assert_eq!(next.image_path, "v1/0150.jpg");
    assert_eq!(next.scene, Some(2));
    assert_eq!(next.category(), MatchCategory::ExactMatch);

    assert_eq!(report.summary.exact_matches, vec!["v1/0100.jpg", "v1/0150.jpg"]);
}

#[tokio::test]
async fn test_broken_chain_searches_next_scene() {
    let harness = Harness::new(
        scene_scripted("none"),
        two_scene_index(),
        two_scene_neighbors(),
        classification(true, 2),
    );

    let results = harness
        .orchestrator(PipelineConfig::new())
        .process_query("a car parks, then a man walks away", 500, None)
        .await
        .unwrap();

    assert!(harness.index.was_queried("clip 2"));
    assert!(results.iter().all(|r| r.next_scene.is_none()));
    // 2 verdicts for scene 1, 2 for scene 2
    assert_eq!(results.len(), 4);
    assert_eq!(
        results.iter().filter(|r| r.scene == Some(2)).count(),
        2
    );
    assert!(results
        .iter()
        .filter(|r| r.scene == Some(2))
        .all(|r| r.category() == MatchCategory::NoMatch));
}

#[tokio::test]
async fn test_head_matched_by_both_variants_is_walked_once() {
    let harness = Harness::new(
        scene_scripted("none"),
        two_scene_index(),
        two_scene_neighbors(),
        classification(true, 2),
    );

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("a car parks, then a man walks away", 500, None)
        .await
        .unwrap();

    assert!(!report.chain_complete);
    assert_eq!(harness.neighbors.lookups(), vec!["v1/0100.jpg"]);
    assert_eq!(harness.gateway.calls_for("v1/0125.jpg"), 1);
}

#[tokio::test]
async fn test_tie_break_prefers_exact_over_confident_near() {
    let gateway = ScriptedGateway::new().on_image(|path, prompt, _| {
        let verdict = match (path, targeted_scene(prompt)) {
            ("v1/near.jpg", Some(1)) => verdict_response(path, "Near Match", 0.9),
            ("v1/exact.jpg", Some(1)) => verdict_response(path, "Exact Match", 0.5),
            ("v1/after-exact.jpg" | "v1/after-near.jpg", Some(2)) => {
                verdict_response(path, "Exact Match", 0.9)
            }
            _ => verdict_response(path, "No Match", 0.9),
        };
        Ok(verdict)
    });
    let index = StaticSearchIndex::new()
        .with_clip("clip 1", &["v1/near.jpg", "v1/exact.jpg"])
        .with_caption("caption 1", &[]);
    let neighbors = StaticNeighbors::new()
        .with("v1/near.jpg", &["v1/after-near.jpg"])
        .with("v1/exact.jpg", &["v1/after-exact.jpg"]);
    let harness = Harness::new(gateway, index, neighbors, classification(true, 2));

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("two scenes", 500, None)
        .await
        .unwrap();

    assert_eq!(harness.neighbors.lookups(), vec!["v1/exact.jpg"]);
    let head = report
        .results
        .iter()
        .find(|r| r.next_scene.is_some())
        .unwrap();
    assert_eq!(head.image_path, "v1/exact.jpg");
}

#[tokio::test]
async fn test_non_temporal_query_never_chains() {
    let harness = Harness::new(
        scene_scripted("v1/0150.jpg"),
        two_scene_index(),
        two_scene_neighbors(),
        classification(false, 2),
    );

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("a car and a man", 500, None)
        .await
        .unwrap();

    assert!(!report.chain_complete);
    assert!(harness.neighbors.lookups().is_empty());
    assert!(harness.index.was_queried("clip 2"));
}

#[tokio::test]
async fn test_prompt_crafting_failure_is_loud() {
    let harness = Harness::new(
        ScriptedGateway::new(),
        two_scene_index(),
        StaticNeighbors::new(),
        classification(false, 1),
    )
    .with_crafter(FixedCrafter::failing());

    let err = harness
        .orchestrator(PipelineConfig::new())
        .process_query("a red car", 500, None)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::PromptCrafting(_)));
    assert!(harness.index.queries().is_empty());
    assert_eq!(harness.gateway.image_calls(), 0);
}

#[tokio::test]
async fn test_verified_classification_skips_classifier() {
    let harness = Harness::new(
        scene_scripted("none"),
        two_scene_index(),
        StaticNeighbors::new(),
        classification(true, 2),
    );
    let mut verified = classification(false, 1);
    verified.number_of_scenes = 7;

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("a red car", 500, Some(verified))
        .await
        .unwrap();

    assert_eq!(harness.classifier.calls(), 0);
    assert_eq!(report.classification.number_of_scenes, 1);
    assert_eq!(report.summary.exact_matches, vec!["v1/0100.jpg"]);
}

#[tokio::test]
async fn test_classification_without_scenes_is_rejected() {
    let harness = Harness::new(
        ScriptedGateway::new(),
        StaticSearchIndex::new(),
        StaticNeighbors::new(),
        classification(false, 1),
    );
    let empty = Classification::new(false, false, Vec::new());

    let err = harness
        .orchestrator(PipelineConfig::new())
        .process_query("", 500, Some(empty))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NoScenes));
    assert_eq!(harness.crafter.calls(), 0);
}

#[tokio::test]
async fn test_no_match_is_not_an_error() {
    let harness = Harness::new(
        ScriptedGateway::new(),
        StaticSearchIndex::new(),
        StaticNeighbors::new(),
        classification(false, 1),
    );

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("something that is not there", 500, None)
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert!(!report.summary.has_satisfactory_match());
    assert_eq!(report.attempts, 1);
}

#[tokio::test]
async fn test_refinement_retries_until_match() {
    let gateway = ScriptedGateway::new().on_image(|path, prompt, _| {
        let category = if targeted_scene(prompt) == Some(2) { "Exact Match" } else { "No Match" };
        Ok(verdict_response(path, category, 0.8))
    });
    let harness = Harness::new(
        gateway,
        StaticSearchIndex::new()
            .with_clip("clip 1", &["v1/0001.jpg"])
            .with_clip("clip 2", &["v1/0100.jpg"])
            .with_caption("caption 2", &[]),
        StaticNeighbors::new(),
        classification(false, 1),
    );
    // scene 1 matches nothing; the revision targets scene 2, whose prompts hit
    let revised = Classification::new(false, false, vec![Scene::new(2, "revised scene")]);
    let refiner = Arc::new(QueuedRefiner::new(vec![revised.clone()]));

    let report = harness
        .orchestrator(PipelineConfig::new().with_max_query_attempts(3))
        .with_refiner(Some(refiner.clone() as Arc<dyn QueryRefiner>))
        .execute("a red car", 500, None)
        .await
        .unwrap();

    assert_eq!(refiner.calls(), 1);
    assert_eq!(report.attempts, 2);
    assert_eq!(report.classification, revised);
    assert_eq!(report.summary.exact_matches, vec!["v1/0100.jpg"]);
    assert_eq!(harness.crafter.calls(), 2);
}

#[tokio::test]
async fn test_refinement_stops_at_attempt_limit() {
    let harness = Harness::new(
        ScriptedGateway::new(),
        StaticSearchIndex::new(),
        StaticNeighbors::new(),
        classification(false, 1),
    );
    let revision = |n: u32| Classification::new(false, false, vec![Scene::new(1, format!("revision {n}"))]);
    let refiner = Arc::new(QueuedRefiner::new(vec![revision(1), revision(2), revision(3)]));

    let report = harness
        .orchestrator(PipelineConfig::new().with_max_query_attempts(2))
        .with_refiner(Some(refiner.clone() as Arc<dyn QueryRefiner>))
        .execute("a red car", 500, None)
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(refiner.calls(), 1);
    assert_eq!(report.classification, revision(1));
}

#[tokio::test]
async fn test_unchanged_refinement_ends_loop() {
    let harness = Harness::new(
        ScriptedGateway::new(),
        StaticSearchIndex::new(),
        StaticNeighbors::new(),
        classification(false, 1),
    );
    let refiner = Arc::new(QueuedRefiner::new(vec![classification(false, 1), classification(false, 1)]));

    let report = harness
        .orchestrator(PipelineConfig::new().with_max_query_attempts(3))
        .with_refiner(Some(refiner.clone() as Arc<dyn QueryRefiner>))
        .execute("a red car", 500, None)
        .await
        .unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(refiner.calls(), 1);
    assert_eq!(harness.crafter.calls(), 1);
}

#[tokio::test]
async fn test_zero_top_k_uses_configured_default() {
    let harness = Harness::new(
        ScriptedGateway::new(),
        StaticSearchIndex::new()
            .with_clip("clip 1", &["v1/0001.jpg", "v1/0002.jpg", "v1/0003.jpg"])
            .with_caption("caption 1", &[]),
        StaticNeighbors::new(),
        classification(false, 1),
    );

    let report = harness
        .orchestrator(PipelineConfig::new().with_top_k(2))
        .execute("a red car", 0, None)
        .await
        .unwrap();

    // two candidates, each against the clip and caption variants
    assert_eq!(report.results.len(), 4);
    assert_eq!(harness.gateway.calls_for("v1/0003.jpg"), 0);

    let explicit = harness
        .orchestrator(PipelineConfig::new().with_top_k(2))
        .execute("a red car", 1, None)
        .await
        .unwrap();
    assert_eq!(explicit.results.len(), 2);
}

#[tokio::test]
async fn test_answer_is_extracted_from_best_match() {
    let gateway = ScriptedGateway::new().on_image(|path, prompt, _| {
        Ok(if prompt.contains("what plate?") && path == "v1/0100.jpg" {
            answer_response(path, "what plate?", "29A-12345", 0.8)
        } else {
            ModelResponse::Text(frameseek_test_utils::verdict_json(path, "No Match", 0.5))
        })
    });
    let question_scene = Classification::new(
        false,
        true,
        vec![Scene::new(1, "red car").with_question("what plate?")],
    );
    let harness = Harness::new(
        gateway,
        two_scene_index(),
        StaticNeighbors::new(),
        question_scene,
    )
    .with_crafter(FixedCrafter::new().with_question("what plate?"));

    let report = harness
        .orchestrator(PipelineConfig::new())
        .execute("what plate does the red car have?", 500, None)
        .await
        .unwrap();

    assert_eq!(report.answer(), Some("29A-12345"));
}

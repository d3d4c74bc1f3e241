use frameseek_core::{
    CandidateImage, CraftedPrompts, GatewayError, ImageValidator, MatchCategory, ModelResponse,
    RetryPolicy, ScenePrompt, ValidatorConfig,
};
use frameseek_test_utils::{verdict_json, verdict_response, ScriptedGateway};
use std::sync::Arc;
use std::time::Duration;

fn config() -> ValidatorConfig {
    ValidatorConfig::new().with_retry(RetryPolicy::immediate(3))
}

#[tokio::test]
async fn test_fails_twice_then_succeeds() {
    let gateway = Arc::new(ScriptedGateway::new().on_image(|path, _, attempt| {
        if attempt <= 2 {
            Err(GatewayError::Provider {
                status: 502,
                message: "bad gateway".into(),
            })
        } else {
            Ok(verdict_response(path, "Near Match", 0.7))
        }
    }));
    let validator = ImageValidator::new(gateway.clone(), config());

    let result = validator
        .validate_one(&CandidateImage::new("v1/0001.jpg"), "red car", None)
        .await;

    assert_eq!(gateway.image_calls(), 3);
    assert!(!result.is_sentinel());
    assert_eq!(result.category(), MatchCategory::NearMatch);
    assert_eq!(result.confidence(), 0.7);
}

#[tokio::test]
async fn test_retry_exhaustion_returns_sentinel() {
    let gateway = Arc::new(
        ScriptedGateway::new().on_image(|_, _, _| Err(GatewayError::Transport("reset".into()))),
    );
    let validator = ImageValidator::new(gateway.clone(), config());

    let result = validator
        .validate_one(&CandidateImage::new("v1/0001.jpg"), "red car", None)
        .await;

    assert_eq!(gateway.image_calls(), 3);
    assert_eq!(result.category(), MatchCategory::NoMatch);
    assert_eq!(result.confidence(), 0.0);
    assert_eq!(result.justification, "validation failed: transport error: reset");
}

#[tokio::test]
async fn test_backoff_delays_between_attempts() {
    let gateway = Arc::new(
        ScriptedGateway::new().on_image(|_, _, _| Err(GatewayError::Transport("reset".into()))),
    );
    let retry = RetryPolicy::new(3, Duration::from_millis(20), Duration::from_millis(30));
    let validator = ImageValidator::new(gateway.clone(), ValidatorConfig::new().with_retry(retry));

    let started = std::time::Instant::now();
    let result = validator
        .validate_one(&CandidateImage::new("v1/0001.jpg"), "red car", None)
        .await;

    // 20ms after the first failure, 30ms (capped) after the second
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(result.is_sentinel());
    assert_eq!(gateway.image_calls(), 3);
}

#[tokio::test]
async fn test_empty_path_never_calls_gateway() {
    let gateway = Arc::new(ScriptedGateway::new());
    let validator = ImageValidator::new(gateway.clone(), config());

    let result = validator
        .validate_one(&CandidateImage::new(""), "red car", Some("what plate?"))
        .await;

    assert_eq!(gateway.image_calls(), 0);
    assert!(result.is_sentinel());
}

#[tokio::test]
async fn test_not_json_at_all_becomes_sentinel() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .on_image(|_, _, _| Ok(ModelResponse::Text("not json at all".to_string()))),
    );
    let validator = ImageValidator::new(gateway.clone(), config());

    let result = validator
        .validate_one(&CandidateImage::new("v1/0001.jpg"), "red car", None)
        .await;

    assert_eq!(gateway.image_calls(), 3);
    assert!(result.is_sentinel());
}

#[tokio::test]
async fn test_confidence_above_one_is_not_clamped() {
    let gateway = Arc::new(ScriptedGateway::new().on_image(|path, _, _| {
        Ok(ModelResponse::Text(verdict_json(path, "Exact Match", 1.5)))
    }));
    let validator = ImageValidator::new(gateway.clone(), config());

    let result = validator
        .validate_one(&CandidateImage::new("v1/0001.jpg"), "red car", None)
        .await;

    assert!(result.is_sentinel());
    assert_ne!(result.confidence(), 1.0);
}

#[tokio::test]
async fn test_bare_string_assessment_is_accepted() {
    let gateway = Arc::new(ScriptedGateway::new().on_image(|path, _, _| {
        Ok(ModelResponse::Structured(serde_json::json!({
            "imagePath": path,
            "questionAnswer": {"question": null, "answer": null, "confidence": 0.0},
            "matchAssessment": "Weak Match",
            "justification": "partly visible",
        })))
    }));
    let validator = ImageValidator::new(gateway.clone(), config());

    let result = validator
        .validate_one(&CandidateImage::new("v1/0001.jpg"), "red car", None)
        .await;

    assert_eq!(gateway.image_calls(), 1);
    assert_eq!(result.category(), MatchCategory::WeakMatch);
    assert_eq!(result.confidence(), 0.0);
}

#[tokio::test]
async fn test_one_bad_image_does_not_abort_batch() {
    let gateway = Arc::new(ScriptedGateway::new().on_image(|path, _, _| {
        if path.contains("broken") {
            Err(GatewayError::InvalidImage {
                path: path.to_string(),
                reason: "truncated file".into(),
            })
        } else {
            Ok(verdict_response(path, "Exact Match", 0.8))
        }
    }));
    let validator = ImageValidator::new(gateway.clone(), config());
    let crafted = CraftedPrompts {
        clip_prompts: vec![ScenePrompt::new(1, "red car")],
        caption_prompts: vec![ScenePrompt::new(1, "xe hơi màu đỏ")],
        question: None,
    };
    let images = vec![
        CandidateImage::new("v1/0001.jpg"),
        CandidateImage::new("v1/broken.jpg"),
        CandidateImage::new(""),
    ];

    let results = validator.validate_many(&images, &crafted).await;

    assert_eq!(results.len(), 6);
    let sentinels = results.iter().filter(|r| r.is_sentinel()).count();
    assert_eq!(sentinels, 4);
    assert_eq!(gateway.calls_for("v1/broken.jpg"), 6);
    assert_eq!(gateway.calls_for("v1/0001.jpg"), 2);
}

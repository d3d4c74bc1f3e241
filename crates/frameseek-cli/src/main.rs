//! `frameseek` command line

mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frameseek_core::{
    CandidateImage, Classifier, FrameDirectoryNeighbors, ImageValidator, LlmGateway,
    LlmPromptCrafter, LlmQueryClassifier, PromptCrafter, TemporalNeighborLookup,
};
use frameseek_gateway::OpenAiCompatibleGateway;
use serde::Serialize;
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "frameseek", version, about = "LLM-driven keyframe retrieval")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
    /// TOML settings with [gateway] and [pipeline] tables
    #[arg(long, global = true, env = "FRAMESEEK_CONFIG")]
    config: Option<PathBuf>,
    /// Override the gateway model
    #[arg(long, global = true)]
    model: Option<String>,
    /// Override the gateway base URL
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Split a query into scenes
    Classify {
        query: String,
    },
    /// Classify a query, then craft per-scene search prompts
    Craft {
        query: String,
    },
    /// Ask the vision model whether a frame matches a prompt
    Validate {
        #[arg(long)]
        image: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        question: Option<String>,
    },
    /// List frames after (or around) a keyframe
    Neighbors {
        image: String,
        #[arg(long, default_value_t = 3)]
        count: usize,
        #[arg(long, default_value_t = frameseek_core::frames::DEFAULT_MIN_DISTANCE)]
        min_distance: u64,
        /// Include earlier frames as well
        #[arg(long)]
        surrounding: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        settings.gateway = settings.gateway.with_model(model);
    }
    if let Some(base_url) = cli.base_url {
        settings.gateway = settings.gateway.with_base_url(base_url);
    }

    match cli.cmd {
        Cmd::Classify { query } => {
            let classifier = LlmQueryClassifier::new(gateway(&settings)?);
            print_json(&classifier.classify(&query).await)
        }
        Cmd::Craft { query } => {
            let gateway = gateway(&settings)?;
            let classification = LlmQueryClassifier::new(Arc::clone(&gateway))
                .classify(&query)
                .await;
            let crafted = LlmPromptCrafter::new(gateway)
                .craft(&classification)
                .await
                .context("prompt crafting failed")?;
            print_json(&serde_json::json!({
                "classification": classification,
                "crafted": crafted,
            }))
        }
        Cmd::Validate {
            image,
            prompt,
            question,
        } => {
            let validator = ImageValidator::new(gateway(&settings)?, settings.pipeline.validator);
            let result = validator
                .validate_one(&CandidateImage::new(image), &prompt, question.as_deref())
                .await;
            print_json(&result)
        }
        Cmd::Neighbors {
            image,
            count,
            min_distance,
            surrounding,
        } => {
            let frames = FrameDirectoryNeighbors::new(min_distance);
            let found = if surrounding {
                frames.surrounding(&image, count).await?
            } else {
                frames.neighbors(&image, count).await?
            };
            print_json(&found)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn gateway(settings: &Settings) -> Result<Arc<dyn LlmGateway>> {
    let gateway = OpenAiCompatibleGateway::from_env(settings.gateway.clone())?;
    tracing::debug!(model = %settings.gateway.model, endpoint = %settings.gateway.endpoint(), "gateway ready");
    Ok(Arc::new(gateway))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

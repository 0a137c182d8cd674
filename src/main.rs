mod character;
mod config;
mod core;
mod error;
mod memory;
mod models;
mod providers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::character::load_character_config;
use crate::config::Settings;
use crate::core::agent::RigTextGenerator;
use crate::core::classifier::{Classifier, ClassifierConfig, ThreadRandom};
use crate::core::composer::ResponseComposer;
use crate::core::dedupe::DedupeTracker;
use crate::core::poller::{PollerConfig, TimelinePoller};
use crate::core::poster::Poster;
use crate::core::runtime::{CycleOutcome, InteractionOrchestrator};
use crate::memory::{open_cache, CacheKeys, DurableCache};
use crate::providers::heurist::HeuristImageGenerator;
use crate::providers::storage::HttpObjectStorage;
use crate::providers::twitter::TwitterClient;
use crate::providers::{ClientRegistry, ImageGenerator, ObjectStorage, TextGenerator};

#[derive(Debug, Parser)]
#[command(version, about = "Answers mentions on the timeline, with generated images on request")]
struct Cli {
    /// Character directory name under ./characters (overrides CHARACTER_NAME)
    #[arg(long)]
    character: Option<String>,

    /// Run a single interaction cycle and exit
    #[arg(long)]
    once: bool,

    /// Log replies instead of posting them (overrides TWITTER_DRY_RUN)
    #[arg(long)]
    dry_run: bool,

    /// Load environment from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Directory holding character profiles
    #[arg(long, default_value = "characters")]
    characters_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let env_loaded = match &cli.env_file {
        Some(path) => dotenv::from_path(path).map(|_| ()),
        None => dotenv::dotenv().map(|_| ()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = env_loaded {
        warn!("No .env file loaded: {}", e);
    }

    let mut settings = Settings::from_env()?;
    if let Some(character) = cli.character {
        settings.character_name = character;
    }
    settings.dry_run |= cli.dry_run;

    let character = load_character_config(&cli.characters_dir, &settings.character_name)?;

    info!("=== Starting mention agent ===");
    info!("Account: @{}", settings.twitter_username);
    info!("Character: {}", character.name);
    info!("Dry run: {}", settings.dry_run);
    info!("Poll interval: {:?}", settings.poll_interval);

    let cache = open_cache(&settings.cache).await;

    let credentials = settings
        .twitter_credentials
        .clone()
        .context("TWITTER_CONSUMER_KEY, TWITTER_CONSUMER_SECRET, TWITTER_ACCESS_TOKEN and TWITTER_ACCESS_TOKEN_SECRET must all be set")?;
    let mut registry = ClientRegistry::new();
    let account = registry.register(
        &settings.twitter_username,
        Arc::new(TwitterClient::new(credentials, &settings.twitter_username)?),
    );

    // API keys only decide which collaborators exist
    let text: Option<Arc<dyn TextGenerator>> = match &settings.anthropic_api_key {
        Some(key) => Some(Arc::new(RigTextGenerator::new(key, &character.prompt))),
        None => {
            warn!("ANTHROPIC_API_KEY not set, replies use the character's fallback template");
            None
        }
    };
    let images: Option<Arc<dyn ImageGenerator>> = match &settings.heurist {
        Some(h) => Some(Arc::new(HeuristImageGenerator::new(&h.api_key, &h.model_id)?)),
        None => None,
    };
    let storage: Option<Arc<dyn ObjectStorage>> = match &settings.storage {
        Some(s) => Some(Arc::new(HttpObjectStorage::new(
            &s.upload_url,
            &s.public_url,
            s.token.clone(),
        )?)),
        None => None,
    };
    if images.is_none() || storage.is_none() {
        warn!("Image generation or storage not configured, image requests get text replies");
    }

    let keys = CacheKeys::new("twitter", &settings.twitter_username);
    let dedupe = Arc::new(DedupeTracker::new(
        Arc::clone(&cache),
        keys.clone(),
        settings.dedupe_capacity,
    ));
    info!(watermark_ms = dedupe.watermark_ms(), "Ignoring items created before startup");

    let poller = TimelinePoller::new(
        Arc::clone(&account),
        Arc::clone(&dedupe),
        &settings.twitter_username,
        PollerConfig {
            window: settings.search_window,
            timeout: settings.poll_timeout,
            ..PollerConfig::mentions_of(&settings.twitter_username)
        },
    );

    let classifier = Classifier::new(
        ClassifierConfig {
            handle: settings.twitter_username.clone(),
            keywords: character
                .keywords()
                .map(str::to_string)
                .chain(settings.topic_keywords.iter().cloned())
                .collect(),
            engagement_probability: settings.engagement_probability,
            topic_action: settings.topic_action,
        },
        Arc::new(ThreadRandom),
    )?;

    let composer = ResponseComposer::new(character, text, images, storage, settings.image.clone())?;

    let poster = Poster::new(
        Arc::clone(&account),
        Arc::clone(&cache),
        keys,
        settings.min_post_spacing,
    )
    .dry_run(settings.dry_run);

    let orchestrator = Arc::new(InteractionOrchestrator::new(
        poller, classifier, composer, poster, dedupe,
    ));

    if cli.once {
        if let CycleOutcome::Completed(report) = orchestrator.run_cycle().await {
            info!(?report, "Single cycle complete");
        }
    } else {
        tokio::select! {
            _ = Arc::clone(&orchestrator).run_periodically(settings.poll_interval) => {}
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutting down");
            }
        }
    }

    if let Err(e) = cache.flush().await {
        warn!("Failed to flush cache on exit: {}", e);
    }
    Ok(())
}

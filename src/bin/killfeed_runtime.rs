//! Killfeed Runtime
//!
//! Polls every enabled server's snapshot directory, keeps the PvP ranking up
//! to date and logs each classified death.
//!
//! Usage:
//!   cargo run --release --bin killfeed_runtime
//!
//! Environment variables:
//!   KILLFEED_SOURCES_PATH - Sources file (default: config/sources.json)
//!   RANKING_DB_PATH - Ranking database (default: data/ranking.db)
//!   SPAWNS_DB_PATH - Creature names database (optional)
//!   FEED_CHANNEL_BUFFER - Outcome feed size (default: 1000)

use chrono::DateTime;
use dotenv::dotenv;
use killfeed::pipeline::{
    config::PipelineConfig,
    creatures::CreatureNames,
    db::{ScoreStore, SqliteScoreStore},
    engine::PipelineEngine,
    scheduler::spawn_source_task,
    types::FeedEvent,
    watermark::{FileWatermarkStore, WatermarkStore},
};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Killfeed Runtime");

    let config = PipelineConfig::from_env()?;
    info!("✅ Configuration loaded");
    info!("   ├─ Sources: {}", config.sources.len());
    info!("   ├─ Ranking database: {}", config.ranking_db_path.display());
    info!("   └─ Feed buffer: {} outcomes", config.feed_buffer);

    info!("🔧 Initializing ranking database...");
    let scores: Arc<dyn ScoreStore> = Arc::new(SqliteScoreStore::open(&config.ranking_db_path)?);
    info!("✅ Ranking database ready");

    let creatures = match &config.spawns_db_path {
        Some(path) => match CreatureNames::load(path) {
            Ok(names) => {
                info!("✅ Loaded {} creature names from {}", names.len(), path.display());
                names
            }
            Err(e) => {
                warn!("⚠️  Cannot load creature names from {}: {}", path.display(), e);
                warn!("   └─ Environment kills will show as 'unknown'");
                CreatureNames::empty()
            }
        },
        None => {
            info!("ℹ️  SPAWNS_DB_PATH not set, environment kills will show as 'unknown'");
            CreatureNames::empty()
        }
    };

    let watermarks: Arc<dyn WatermarkStore> = Arc::new(FileWatermarkStore::new());
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(config.feed_buffer);

    let engine = Arc::new(
        PipelineEngine::new(scores, watermarks, Arc::new(creatures)).with_feed(feed_tx),
    );

    let feed_task = tokio::spawn(log_feed(feed_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    for source in config.sources.iter().filter(|s| !s.enabled) {
        info!("⏭️  {} is disabled, skipping", source.name);
    }

    info!("🚀 Spawning source tasks...");
    for source in config.enabled_sources() {
        tasks.push(spawn_source_task(
            engine.clone(),
            source.clone(),
            shutdown_rx.clone(),
        ));
    }

    if tasks.is_empty() {
        warn!("⚠️  No enabled sources, nothing to do");
        return Ok(());
    }
    info!("✅ {} source task(s) running", tasks.len());
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
        Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
    }

    // Stop scheduling; in-flight cycles run to completion
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!("❌ Source task ended abnormally: {}", e);
        }
    }

    // Last sender goes with the engine, which lets the feed drain and stop
    drop(engine);
    if let Err(e) = feed_task.await {
        error!("❌ Feed task ended abnormally: {}", e);
    }

    info!("✅ Killfeed runtime stopped");
    Ok(())
}

async fn log_feed(mut rx: mpsc::Receiver<FeedEvent>) {
    while let Some(event) = rx.recv().await {
        let when = DateTime::from_timestamp(event.world_time, 0)
            .map(|t| t.format("%d/%m/%Y at %H:%M:%S").to_string())
            .unwrap_or_else(|| event.world_time.to_string());

        let icon = if event.outcome.is_pvp() { "⚔️ " } else { "💀" };
        info!("{} [{}] {} {}", icon, event.source, when, event.outcome);
    }
}

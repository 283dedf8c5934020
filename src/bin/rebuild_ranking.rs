//! Rebuild a server's ranking from its latest snapshot
//!
//! Wipes the server's rows and replays every death in the newest backup.
//! The watermark file is left untouched.
//!
//! Usage:
//!   rebuild_ranking <ServerName>

use dotenv::dotenv;
use killfeed::pipeline::{
    config::PipelineConfig,
    creatures::CreatureNames,
    db::SqliteScoreStore,
    engine::PipelineEngine,
    watermark::FileWatermarkStore,
};
use std::env;
use std::process;
use std::sync::Arc;

fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <ServerName>", args[0]);
        eprintln!("Example: {} \"Exiled Lands\"", args[0]);
        process::exit(1);
    }

    if let Err(e) = run(&args[1]) {
        eprintln!("❌ Rebuild failed: {}", e);
        process::exit(1);
    }
}

fn run(server_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = PipelineConfig::from_env()?;

    let source = config.find_source(server_name).ok_or_else(|| {
        let known: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
        format!("unknown server '{}' (configured: {})", server_name, known.join(", "))
    })?;

    let creatures = match &config.spawns_db_path {
        Some(path) => CreatureNames::load(path).unwrap_or_else(|e| {
            log::warn!("⚠️  Cannot load creature names from {}: {}", path.display(), e);
            CreatureNames::empty()
        }),
        None => CreatureNames::empty(),
    };

    let engine = PipelineEngine::new(
        Arc::new(SqliteScoreStore::open(&config.ranking_db_path)?),
        Arc::new(FileWatermarkStore::new()),
        Arc::new(creatures),
    );

    let report = engine.rebuild(source)?;

    println!("✅ Ranking rebuilt for {}", source.name);
    println!("   ├─ Snapshot: {}", report.snapshot.display());
    println!("   ├─ Death events: {}", report.events);
    println!("   ├─ PvP kills processed: {}", report.pvp_kills);
    println!("   └─ Players ranked: {}", report.players);
    Ok(())
}

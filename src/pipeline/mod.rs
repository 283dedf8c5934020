//! # Killfeed Ranking Pipeline
//!
//! Tails the game's periodic SQLite backups and folds player-vs-player deaths
//! into a persistent per-server ranking.
//!
//! ## Data flow
//!
//! 1. `locator` picks the newest snapshot matching the source's glob
//! 2. `snapshot_reader` streams death events past the source's watermark
//! 3. `classifier` turns each event into a `KillOutcome`
//! 4. `db` applies PvP kills to the ranking (one transaction per event)
//! 5. `watermark` advances only after every event up to it is applied
//!
//! Classified outcomes are optionally published on an mpsc channel for
//! downstream notifiers (see `killfeed_runtime`).
//!
//! ## Idempotency
//!
//! Every applied kill is recorded in the `applied_events` ledger under
//! `(server, worldTime, slot)`. Re-reading an event after a crash, a failed
//! watermark write, or a rebuild is a no-op.
//!
//! ## Module Organization
//!
//! - `types` - DeathEvent, KillOutcome, FeedEvent, ScoreRow
//! - `config` - Sources file and environment configuration
//! - `locator` - Latest-snapshot discovery
//! - `snapshot_reader` - Paged death event stream over a snapshot
//! - `creatures` - Spawn id to creature name lookup
//! - `classifier` - Pure event classification
//! - `watermark` - Per-source cursor persistence
//! - `db` - Ranking store and schema migrations
//! - `engine` - Ingestion cycle and rebuild
//! - `scheduler` - Per-source polling tasks

pub mod classifier;
pub mod config;
pub mod creatures;
pub mod db;
pub mod engine;
pub mod locator;
pub mod scheduler;
pub mod snapshot_reader;
pub mod types;
pub mod watermark;

// Re-export commonly used types
pub use classifier::{classify, should_publish};
pub use config::{PipelineConfig, SourceConfig};
pub use creatures::CreatureNames;
pub use db::{ScoreStore, SqliteScoreStore};
pub use engine::{CycleReport, EngineError, PipelineEngine, RebuildReport};
pub use scheduler::spawn_source_task;
pub use snapshot_reader::SnapshotEventSource;
pub use types::{DeathEvent, EventKey, FeedEvent, KillOutcome, ScoreRow};
pub use watermark::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};

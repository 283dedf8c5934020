//! Pipeline Engine - ingestion cycle and rebuild orchestration
//!
//! ```text
//! WatermarkStore::read ─► SnapshotEventSource::events_since
//!                              │ (DeathEvent, ascending worldTime)
//!                              ▼
//!                         classify() ─► ScoreStore::apply ─► feed channel
//!                              │
//!                              ▼
//!                   WatermarkStore::write(max_seen)
//! ```
//!
//! One engine is shared by every source task. Each call is parameterized by a
//! `SourceConfig` record; no per-source state lives in the engine besides the
//! lock registry.
//!
//! Ordering rule: the watermark is written only after every event up to it has
//! been applied. Any error aborts the cycle before the write, and the ledger in
//! the ranking store turns the re-read events into no-ops on the next attempt.

use super::classifier::{classify, should_publish};
use super::config::SourceConfig;
use super::creatures::CreatureNames;
use super::db::{ApplyResult, ScoreStore, StoreError};
use super::snapshot_reader::{SnapshotEventSource, SourceError};
use super::types::{EventKey, FeedEvent, KillOutcome};
use super::watermark::{WatermarkError, WatermarkStore};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Phases of one ingestion cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePhase {
    /// No snapshot to read
    #[default]
    Idle,
    Fetching,
    Classifying,
    Applying,
    Advancing,
}

#[derive(Debug)]
pub enum EngineError {
    WatermarkRead(WatermarkError),
    Source(SourceError),
    Store(StoreError),
    /// Events were applied but the new watermark could not be persisted
    WatermarkWrite { value: i64, error: WatermarkError },
    /// Rebuild requested for a source without any snapshot
    NoSnapshot,
}

impl EngineError {
    /// Phase the cycle was in when it failed
    pub fn phase(&self) -> CyclePhase {
        match self {
            EngineError::WatermarkRead(_) | EngineError::NoSnapshot => CyclePhase::Fetching,
            EngineError::Source(_) => CyclePhase::Classifying,
            EngineError::Store(_) => CyclePhase::Applying,
            EngineError::WatermarkWrite { .. } => CyclePhase::Advancing,
        }
    }
}

impl From<SourceError> for EngineError {
    fn from(err: SourceError) -> Self {
        EngineError::Source(err)
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Store(err)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::WatermarkRead(e) => write!(f, "reading watermark: {}", e),
            EngineError::Source(e) => write!(f, "reading events: {}", e),
            EngineError::Store(e) => write!(f, "applying events: {}", e),
            EngineError::WatermarkWrite { value, error } => {
                write!(f, "advancing watermark to {}: {}", value, error)
            }
            EngineError::NoSnapshot => write!(f, "no snapshot found"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Summary of one ingestion cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Furthest phase the cycle reached
    pub phase: CyclePhase,
    /// Snapshot read, `None` if the source had none
    pub snapshot: Option<PathBuf>,
    pub watermark_before: i64,
    pub watermark_after: i64,
    /// Death events read past the watermark
    pub events: usize,
    pub pvp_kills: usize,
    /// PvP kills already in the ledger
    pub duplicates: usize,
    pub environment_kills: usize,
    pub ignored: usize,
    /// Outcomes sent on the feed
    pub published: usize,
}

impl CycleReport {
    pub fn advanced(&self) -> bool {
        self.watermark_after > self.watermark_before
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ({} pvp, {} dup, {} env, {} ignored), {} published, watermark {} → {}",
            self.events,
            self.pvp_kills,
            self.duplicates,
            self.environment_kills,
            self.ignored,
            self.published,
            self.watermark_before,
            self.watermark_after
        )
    }
}

/// Summary of a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    pub snapshot: PathBuf,
    pub events: usize,
    pub pvp_kills: usize,
    pub players: usize,
}

/// Per-source mutual exclusion between cycles and rebuilds
#[derive(Debug, Default)]
pub struct SourceLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a source (shared by every spelling of its name)
    pub fn handle(&self, source: &SourceConfig) -> Arc<Mutex<()>> {
        // The registry only maps names to handles, a poisoned map is still consistent
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(source.key()).or_default().clone()
    }
}

/// Ingestion engine shared by all source tasks
pub struct PipelineEngine {
    events: SnapshotEventSource,
    creatures: Arc<CreatureNames>,
    scores: Arc<dyn ScoreStore>,
    watermarks: Arc<dyn WatermarkStore>,
    feed: Option<mpsc::Sender<FeedEvent>>,
    locks: SourceLocks,
}

impl PipelineEngine {
    pub fn new(
        scores: Arc<dyn ScoreStore>,
        watermarks: Arc<dyn WatermarkStore>,
        creatures: Arc<CreatureNames>,
    ) -> Self {
        Self {
            events: SnapshotEventSource::new(),
            creatures,
            scores,
            watermarks,
            feed: None,
            locks: SourceLocks::new(),
        }
    }

    /// Publish classified outcomes on `tx`
    pub fn with_feed(mut self, tx: mpsc::Sender<FeedEvent>) -> Self {
        self.feed = Some(tx);
        self
    }

    /// Run one ingestion cycle for a source
    ///
    /// Blocking: performs SQLite and file I/O and may wait on the feed channel.
    /// Call from a blocking context (`spawn_blocking`), never from inside an async task.
    ///
    /// Feed delivery is at-least-once: a cycle that fails after publishing (for
    /// example on the watermark write) re-reads the same events on retry and
    /// publishes them again, even though the ledger keeps the scores exact.
    pub fn run_cycle(&self, source: &SourceConfig) -> Result<CycleReport, EngineError> {
        let lock = self.locks.handle(source);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Fetching
        let watermark = self
            .watermarks
            .read(source)
            .map_err(EngineError::WatermarkRead)?;

        let mut report = CycleReport {
            watermark_before: watermark,
            watermark_after: watermark,
            ..Default::default()
        };

        let stream = match self.events.events_since(source, watermark)? {
            Some(stream) => stream,
            None => {
                log::debug!(
                    "💤 [{}] No snapshot found in {}",
                    source.name,
                    source.saved_path.display()
                );
                return Ok(report);
            }
        };
        report.snapshot = Some(stream.snapshot_path().to_path_buf());
        report.phase = CyclePhase::Fetching;

        // Classifying / Applying
        let mut max_seen = watermark;
        for event in stream {
            let event = event?;
            report.phase = CyclePhase::Classifying;
            let outcome = classify(&event, &self.creatures);

            report.phase = CyclePhase::Applying;
            match self.scores.apply(&source.name, event.key(), &outcome)? {
                ApplyResult::Applied => report.pvp_kills += 1,
                ApplyResult::Duplicate => {
                    log::debug!(
                        "♻️  [{}] Event {:?} already applied, skipping",
                        source.name,
                        event.key()
                    );
                    report.duplicates += 1;
                }
                ApplyResult::NoChange => match outcome {
                    KillOutcome::EnvironmentKill { .. } => report.environment_kills += 1,
                    _ => report.ignored += 1,
                },
            }

            if should_publish(&outcome, source.pvp_only)
                && self.publish(source, event.world_time, outcome)
            {
                report.published += 1;
            }

            max_seen = max_seen.max(event.world_time);
            report.events += 1;
        }

        // Advancing
        if report.events > 0 && max_seen > watermark {
            report.phase = CyclePhase::Advancing;
            self.watermarks
                .write(source, max_seen)
                .map_err(|error| EngineError::WatermarkWrite {
                    value: max_seen,
                    error,
                })?;
            report.watermark_after = max_seen;
        }

        Ok(report)
    }

    /// Wipe a source's ranking and replay its entire latest snapshot
    ///
    /// Only the newest snapshot is considered; older backups are never merged.
    /// The watermark is neither read nor written, and nothing is published.
    pub fn rebuild(&self, source: &SourceConfig) -> Result<RebuildReport, EngineError> {
        let lock = self.locks.handle(source);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let stream = self
            .events
            .events_since(source, 0)?
            .ok_or(EngineError::NoSnapshot)?;
        let snapshot = stream.snapshot_path().to_path_buf();

        log::info!("🔄 [{}] Rebuilding ranking from {}", source.name, snapshot.display());

        let mut events = 0;
        let mut batch: Vec<(EventKey, KillOutcome)> = Vec::new();
        for event in stream {
            let event = event?;
            events += 1;

            let outcome = classify(&event, &self.creatures);
            if outcome.is_pvp() {
                batch.push((event.key(), outcome));
            }
        }

        let pvp_kills = self.scores.replace_all(&source.name, &batch)?;
        let players = self.scores.top(&source.name, usize::MAX)?.len();

        Ok(RebuildReport {
            snapshot,
            events,
            pvp_kills,
            players,
        })
    }

    /// Send an outcome to the feed; false if there is no live consumer
    fn publish(&self, source: &SourceConfig, world_time: i64, outcome: KillOutcome) -> bool {
        let Some(tx) = &self.feed else {
            return false;
        };

        let event = FeedEvent {
            source: source.name.clone(),
            world_time,
            outcome,
        };
        match tx.blocking_send(event) {
            Ok(()) => true,
            Err(_) => {
                log::debug!(
                    "⚠️  [{}] Feed receiver dropped, outcome not published",
                    source.name
                );
                false
            }
        }
    }
}

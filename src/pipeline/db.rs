//! Ranking store: per-(server, player) kill/death counters
//!
//! Tables (see `/sql/`):
//! - `scores` - one row per player per server, mutated additively
//! - `applied_events` - ledger of event keys already credited
//!
//! Every PvP kill is credited in a single transaction that also records its
//! `EventKey` in the ledger. Crediting the same key twice is a no-op, so a cycle
//! that re-reads events (lost or failed watermark write, concurrent rebuild)
//! cannot double count.

use super::types::{EventKey, KillOutcome, ScoreRow};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Schema files, applied in order. All use `IF NOT EXISTS`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_scores.sql", include_str!("../../sql/01_scores.sql")),
    (
        "02_applied_events.sql",
        include_str!("../../sql/02_applied_events.sql"),
    ),
];

#[derive(Debug)]
pub enum StoreError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Ranking database error: {}", e),
            StoreError::Io(e) => write!(f, "Ranking database I/O error: {}", e),
            StoreError::Unavailable(msg) => write!(f, "Ranking store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Result of applying one outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// Killer and victim rows were updated
    Applied,
    /// The event key was already in the ledger
    Duplicate,
    /// Outcome does not touch the ranking
    NoChange,
}

/// Durable ranking aggregate
///
/// Implementations must be safe to share between source tasks; `top` may run
/// concurrently with `apply`.
pub trait ScoreStore: Send + Sync {
    /// Fold one classified event into a server's ranking
    ///
    /// `PvpKill`: killer kills+1/score+1, victim deaths+1/score-1, as one unit.
    /// Anything else: no mutation.
    fn apply(
        &self,
        server_name: &str,
        key: EventKey,
        outcome: &KillOutcome,
    ) -> Result<ApplyResult, StoreError>;

    /// Reset a server and apply `outcomes` in one transaction
    ///
    /// Returns the number of PvP kills credited.
    fn replace_all(
        &self,
        server_name: &str,
        outcomes: &[(EventKey, KillOutcome)],
    ) -> Result<usize, StoreError>;

    /// Delete every row and ledger entry for a server. Returns rows removed.
    fn reset(&self, server_name: &str) -> Result<usize, StoreError>;

    /// Leaderboard: score desc, kills desc, then first appearance
    fn top(&self, server_name: &str, limit: usize) -> Result<Vec<ScoreRow>, StoreError>;

    /// Single player lookup
    fn get(&self, server_name: &str, player_name: &str) -> Result<Option<ScoreRow>, StoreError>;
}

/// Run the embedded schema migrations
pub fn run_schema_migrations(conn: &Connection) -> Result<(), StoreError> {
    for (name, sql) in MIGRATIONS {
        log::debug!("   ├─ Executing: {}", name);
        conn.execute_batch(sql)?;
    }
    log::debug!("   └─ ✅ {} schema migrations applied", MIGRATIONS.len());
    Ok(())
}

/// SQLite implementation of `ScoreStore`
pub struct SqliteScoreStore {
    conn: Mutex<Connection>,
}

impl SqliteScoreStore {
    /// Open (or create) the ranking database and bring its schema up to date
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        run_schema_migrations(&conn)?;

        log::info!("✅ Ranking database ready: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_schema_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    /// Record the key; false if it was already there
    fn claim_key(tx: &Transaction<'_>, server_name: &str, key: EventKey) -> rusqlite::Result<bool> {
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO applied_events (server_name, world_time, slot)
             VALUES (?1, ?2, ?3)",
            params![server_name, key.world_time, key.slot],
        )?;
        Ok(inserted == 1)
    }

    fn credit_kill(
        tx: &Transaction<'_>,
        server_name: &str,
        killer: &str,
        victim: &str,
    ) -> rusqlite::Result<()> {
        for player in [killer, victim] {
            tx.execute(
                "INSERT OR IGNORE INTO scores (server_name, player_name) VALUES (?1, ?2)",
                params![server_name, player],
            )?;
        }
        tx.execute(
            "UPDATE scores SET kills = kills + 1, score = score + 1
             WHERE server_name = ?1 AND player_name = ?2",
            params![server_name, killer],
        )?;
        tx.execute(
            "UPDATE scores SET deaths = deaths + 1, score = score - 1
             WHERE server_name = ?1 AND player_name = ?2",
            params![server_name, victim],
        )?;
        Ok(())
    }

    fn delete_server(tx: &Transaction<'_>, server_name: &str) -> rusqlite::Result<usize> {
        let removed = tx.execute("DELETE FROM scores WHERE server_name = ?1", [server_name])?;
        tx.execute(
            "DELETE FROM applied_events WHERE server_name = ?1",
            [server_name],
        )?;
        Ok(removed)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreRow> {
        Ok(ScoreRow {
            server_name: row.get(0)?,
            player_name: row.get(1)?,
            kills: row.get(2)?,
            deaths: row.get(3)?,
            score: row.get(4)?,
        })
    }
}

impl ScoreStore for SqliteScoreStore {
    fn apply(
        &self,
        server_name: &str,
        key: EventKey,
        outcome: &KillOutcome,
    ) -> Result<ApplyResult, StoreError> {
        let (killer, victim) = match outcome {
            KillOutcome::PvpKill { killer, victim } => (killer, victim),
            _ => return Ok(ApplyResult::NoChange),
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !Self::claim_key(&tx, server_name, key)? {
            // Dropping the transaction rolls back; nothing was written anyway
            return Ok(ApplyResult::Duplicate);
        }
        Self::credit_kill(&tx, server_name, killer, victim)?;
        tx.commit()?;

        Ok(ApplyResult::Applied)
    }

    fn replace_all(
        &self,
        server_name: &str,
        outcomes: &[(EventKey, KillOutcome)],
    ) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = Self::delete_server(&tx, server_name)?;
        log::debug!("🧹 Cleared {} ranking rows for {}", removed, server_name);

        let mut credited = 0;
        for (key, outcome) in outcomes {
            if let KillOutcome::PvpKill { killer, victim } = outcome {
                if Self::claim_key(&tx, server_name, *key)? {
                    Self::credit_kill(&tx, server_name, killer, victim)?;
                    credited += 1;
                }
            }
        }

        tx.commit()?;
        Ok(credited)
    }

    fn reset(&self, server_name: &str) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = Self::delete_server(&tx, server_name)?;
        tx.commit()?;
        Ok(removed)
    }

    fn top(&self, server_name: &str, limit: usize) -> Result<Vec<ScoreRow>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT server_name, player_name, kills, deaths, score
             FROM scores
             WHERE server_name = ?1
             ORDER BY score DESC, kills DESC, rowid ASC
             LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![server_name, limit], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get(&self, server_name: &str, player_name: &str) -> Result<Option<ScoreRow>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT server_name, player_name, kills, deaths, score
                 FROM scores
                 WHERE server_name = ?1 AND player_name = ?2",
                params![server_name, player_name],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }
}

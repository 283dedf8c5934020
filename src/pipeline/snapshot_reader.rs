//! Snapshot reader with a watermark cursor
//!
//! Resolves the newest snapshot of a source on every call and streams its death
//! events newer than a watermark, in `(worldTime, rowid)` order. Rows are pulled
//! in pages so a large backlog never has to sit in memory at once.
//!
//! The snapshot is opened read-only and the connection lives only as long as the
//! returned stream, so a rotated backup is picked up on the next cycle.

use super::config::SourceConfig;
use super::locator::{find_latest_snapshot, LocatorError};
use super::types::{DeathEvent, DEATH_EVENT_TYPE};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

const DEFAULT_PAGE_SIZE: usize = 1_000;

#[derive(Debug)]
pub enum SourceError {
    Locator(LocatorError),
    Database { path: PathBuf, source: rusqlite::Error },
}

impl From<LocatorError> for SourceError {
    fn from(err: LocatorError) -> Self {
        SourceError::Locator(err)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Locator(e) => write!(f, "{}", e),
            SourceError::Database { path, source } => {
                write!(f, "Snapshot error ({}): {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Reads death events out of a source's latest snapshot
#[derive(Debug, Clone)]
pub struct SnapshotEventSource {
    page_size: usize,
}

impl Default for SnapshotEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEventSource {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Create a reader fetching `page_size` rows per query
    #[cfg(test)]
    pub(crate) fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// Latest snapshot for a source, if any
    pub fn latest_snapshot(&self, source: &SourceConfig) -> Result<Option<PathBuf>, SourceError> {
        Ok(find_latest_snapshot(&source.saved_path, &source.db_pattern)?)
    }

    /// Death events with `worldTime > watermark` from the latest snapshot
    ///
    /// Returns `Ok(None)` when the source has no snapshot yet.
    pub fn events_since(
        &self,
        source: &SourceConfig,
        watermark: i64,
    ) -> Result<Option<DeathEventStream>, SourceError> {
        match self.latest_snapshot(source)? {
            Some(path) => {
                log::debug!("📥 [{}] Reading snapshot {}", source.name, path.display());
                DeathEventStream::open(path, watermark, self.page_size).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Lazy, non-restartable iterator over one snapshot's death events
pub struct DeathEventStream {
    conn: Connection,
    path: PathBuf,
    page_size: usize,
    /// `(worldTime, rowid)` of the last row fetched
    cursor: (i64, i64),
    /// Slot bookkeeping for events sharing a world time
    slot_time: Option<i64>,
    next_slot: u32,
    buffer: VecDeque<DeathEvent>,
    exhausted: bool,
}

impl DeathEventStream {
    /// Open a snapshot read-only and position the cursor after `watermark`
    pub fn open(
        path: impl AsRef<Path>,
        watermark: i64,
        page_size: usize,
    ) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SourceError::Database {
            path: path.clone(),
            source: e,
        })?;

        Ok(Self {
            conn,
            path,
            page_size: page_size.max(1),
            // rowid can never exceed i64::MAX, so this selects worldTime > watermark
            cursor: (watermark, i64::MAX),
            slot_time: None,
            next_slot: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.path
    }

    fn fetch_page(&mut self) -> Result<(), rusqlite::Error> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT rowid, worldTime, causerName, ownerName,
                    CASE WHEN json_valid(argsMap)
                         THEN json_extract(argsMap, '$.nonPersistentCauser')
                    END
             FROM game_events
             WHERE eventType = ?1
               AND typeof(worldTime) = 'integer'
               AND (worldTime > ?2 OR (worldTime = ?2 AND rowid > ?3))
             ORDER BY worldTime ASC, rowid ASC
             LIMIT ?4",
        )?;

        let rows = stmt.query_map(
            params![
                DEATH_EVENT_TYPE,
                self.cursor.0,
                self.cursor.1,
                self.page_size as i64
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    text_value(row.get(2)?),
                    text_value(row.get(3)?),
                    id_value(row.get(4)?),
                ))
            },
        )?;

        let mut fetched = 0usize;
        let mut page = Vec::with_capacity(self.page_size);
        for row in rows {
            page.push(row?);
            fetched += 1;
        }
        drop(stmt);

        for (rowid, world_time, causer_name, owner_name, npc_id) in page {
            self.cursor = (world_time, rowid);

            let slot = if self.slot_time == Some(world_time) {
                self.next_slot
            } else {
                self.slot_time = Some(world_time);
                0
            };
            self.next_slot = slot + 1;

            self.buffer.push_back(DeathEvent {
                world_time,
                slot,
                causer_name,
                owner_name,
                npc_id,
            });
        }

        if fetched < self.page_size {
            self.exhausted = true;
        }

        Ok(())
    }
}

impl Iterator for DeathEventStream {
    type Item = Result<DeathEvent, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(SourceError::Database {
                    path: self.path.clone(),
                    source: e,
                }));
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

/// Names are only trusted when stored as text
fn text_value(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        _ => None,
    }
}

/// Spawn ids may be stored as text or as a bare number
fn id_value(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use tempfile::tempdir;

    fn source_for(dir: &Path) -> SourceConfig {
        SourceConfig::new("Exiled Lands", dir, "game_backup_*.db")
    }

    fn collect(stream: DeathEventStream) -> Vec<DeathEvent> {
        stream.map(|e| e.unwrap()).collect()
    }

    #[test]
    fn test_no_snapshot_yields_none() {
        let dir = tempdir().unwrap();
        let reader = SnapshotEventSource::new();

        assert!(reader.events_since(&source_for(dir.path()), 0).unwrap().is_none());
    }

    #[test]
    fn test_events_after_watermark_in_order() {
        let dir = tempdir().unwrap();
        let conn = create_snapshot(&dir.path().join("game_backup_1.db"));
        insert_death(&conn, 102, Some("A"), Some("A"), None);
        insert_death(&conn, 100, Some("A"), Some("B"), None);
        insert_death(&conn, 101, Some("B"), Some("A"), None);
        insert_death(&conn, 99, Some("Old"), Some("Timer"), None);
        conn.execute(
            "INSERT INTO game_events (worldTime, eventType, ownerName)
             VALUES (150, 86, 'NotADeath')",
            [],
        )
        .unwrap();
        drop(conn);

        let reader = SnapshotEventSource::new();
        let events = collect(reader.events_since(&source_for(dir.path()), 99).unwrap().unwrap());

        let times: Vec<i64> = events.iter().map(|e| e.world_time).collect();
        assert_eq!(times, vec![100, 101, 102]);
        assert_eq!(events[0].causer_name.as_deref(), Some("A"));
        assert_eq!(events[0].owner_name.as_deref(), Some("B"));
    }

    #[test]
    fn test_slots_number_shared_world_times() {
        let dir = tempdir().unwrap();
        let conn = create_snapshot(&dir.path().join("game_backup_1.db"));
        insert_death(&conn, 200, Some("A"), Some("B"), None);
        insert_death(&conn, 200, Some("C"), Some("D"), None);
        insert_death(&conn, 201, Some("E"), Some("F"), None);
        insert_death(&conn, 200, Some("G"), Some("H"), None);
        drop(conn);

        // Page size 1 forces the slot counter across page boundaries
        let reader = SnapshotEventSource::with_page_size(1);
        let events = collect(reader.events_since(&source_for(dir.path()), 0).unwrap().unwrap());

        let keys: Vec<(i64, u32, &str)> = events
            .iter()
            .map(|e| (e.world_time, e.slot, e.causer_name.as_deref().unwrap()))
            .collect();
        assert_eq!(
            keys,
            vec![(200, 0, "A"), (200, 1, "C"), (200, 2, "G"), (201, 0, "E")]
        );
    }

    #[test]
    fn test_paging_returns_everything_once() {
        let dir = tempdir().unwrap();
        let conn = create_snapshot(&dir.path().join("game_backup_1.db"));
        for t in 1..=25 {
            insert_death(&conn, t, Some("A"), Some("B"), None);
        }
        drop(conn);

        let reader = SnapshotEventSource::with_page_size(7);
        let events = collect(reader.events_since(&source_for(dir.path()), 0).unwrap().unwrap());

        assert_eq!(events.len(), 25);
        assert!(events.windows(2).all(|w| w[0].world_time < w[1].world_time));
    }

    #[test]
    fn test_npc_id_extraction() {
        let dir = tempdir().unwrap();
        let conn = create_snapshot(&dir.path().join("game_backup_1.db"));
        insert_death(&conn, 10, None, Some("C"), Some("Wolf_01"));
        conn.execute(
            "INSERT INTO game_events (worldTime, eventType, ownerName, argsMap)
             VALUES (11, ?1, 'D', '{broken json')",
            params![DEATH_EVENT_TYPE],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO game_events (worldTime, eventType, ownerName, argsMap)
             VALUES (12, ?1, 'E', '{\"nonPersistentCauser\": 4711}')",
            params![DEATH_EVENT_TYPE],
        )
        .unwrap();
        drop(conn);

        let reader = SnapshotEventSource::new();
        let events = collect(reader.events_since(&source_for(dir.path()), 0).unwrap().unwrap());

        assert_eq!(events[0].npc_id.as_deref(), Some("Wolf_01"));
        assert_eq!(events[1].npc_id, None);
        assert_eq!(events[2].npc_id.as_deref(), Some("4711"));
    }

    #[test]
    fn test_non_integer_world_time_skipped() {
        let dir = tempdir().unwrap();
        let conn = create_snapshot(&dir.path().join("game_backup_1.db"));
        insert_death(&conn, 10, Some("A"), Some("B"), None);
        conn.execute(
            "INSERT INTO game_events (worldTime, eventType, ownerName, causerName)
             VALUES ('later', ?1, 'X', 'Y')",
            params![DEATH_EVENT_TYPE],
        )
        .unwrap();
        drop(conn);

        let reader = SnapshotEventSource::new();
        let events = collect(reader.events_since(&source_for(dir.path()), 0).unwrap().unwrap());

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].world_time, 10);
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let dir = tempdir().unwrap();
        let old_path = dir.path().join("game_backup_1.db");
        let conn = create_snapshot(&old_path);
        insert_death(&conn, 10, Some("A"), Some("B"), None);
        drop(conn);
        set_age(&old_path, 600);

        let conn = create_snapshot(&dir.path().join("game_backup_2.db"));
        insert_death(&conn, 10, Some("A"), Some("B"), None);
        insert_death(&conn, 20, Some("B"), Some("A"), None);
        drop(conn);

        let reader = SnapshotEventSource::new();
        let stream = reader.events_since(&source_for(dir.path()), 0).unwrap().unwrap();
        assert!(stream.snapshot_path().ends_with("game_backup_2.db"));
        assert_eq!(collect(stream).len(), 2);
    }

    #[test]
    fn test_snapshot_is_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game_backup_1.db");
        drop(create_snapshot(&path));

        let stream = DeathEventStream::open(&path, 0, 10).unwrap();
        let result = stream.conn.execute(
            "INSERT INTO game_events (worldTime, eventType) VALUES (1, 103)",
            [],
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_table_surfaces_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("game_backup_1.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("PRAGMA user_version = 1;")
            .unwrap();

        let reader = SnapshotEventSource::new();
        let mut stream = reader.events_since(&source_for(dir.path()), 0).unwrap().unwrap();

        assert!(matches!(stream.next(), Some(Err(SourceError::Database { .. }))));
        assert!(stream.next().is_none());
    }
}

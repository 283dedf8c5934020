//! Creature name lookup backed by the game's spawns database
//!
//! The table is loaded once at startup and shared read-only (`Arc<CreatureNames>`)
//! by every source task, so lookups need no synchronization.

use super::types::UNKNOWN_CREATURE;
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;

/// Spawn `RowName` → human readable `Name`
#[derive(Debug, Default, Clone)]
pub struct CreatureNames {
    names: HashMap<String, String>,
}

impl CreatureNames {
    /// Empty table: every creature resolves to `"unknown"`
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load `spawns(RowName, Name)` from a read-only SQLite database
    pub fn load(db_path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let mut stmt = conn.prepare(
            "SELECT RowName, Name FROM spawns WHERE RowName IS NOT NULL AND Name IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut names = HashMap::new();
        for row in rows {
            let (row_name, name) = row?;
            names.insert(row_name, name);
        }

        log::info!(
            "📖 Loaded {} creature names from {}",
            names.len(),
            db_path.as_ref().display()
        );

        Ok(Self { names })
    }

    /// Resolve a non-player causer id, falling back to `"unknown"`
    pub fn resolve(&self, npc_id: Option<&str>) -> String {
        npc_id
            .and_then(|id| self.names.get(id))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_CREATURE.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, String)> for CreatureNames {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

//! Snapshot discovery
//!
//! The game server's backup job drops rotated copies of its event database into
//! a directory. The newest file matching the configured pattern is the
//! authoritative snapshot for the next poll.

use globset::{Glob, GlobMatcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug)]
pub enum LocatorError {
    Pattern(globset::Error),
    Io(io::Error),
}

impl From<globset::Error> for LocatorError {
    fn from(err: globset::Error) -> Self {
        LocatorError::Pattern(err)
    }
}

impl From<io::Error> for LocatorError {
    fn from(err: io::Error) -> Self {
        LocatorError::Io(err)
    }
}

impl std::fmt::Display for LocatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocatorError::Pattern(e) => write!(f, "Invalid snapshot pattern: {}", e),
            LocatorError::Io(e) => write!(f, "Snapshot directory error: {}", e),
        }
    }
}

impl std::error::Error for LocatorError {}

/// Compile a snapshot filename pattern (e.g. `game_backup_*.db`)
pub fn compile_pattern(pattern: &str) -> Result<GlobMatcher, LocatorError> {
    Ok(Glob::new(pattern)?.compile_matcher())
}

/// Return the most recently modified file in `dir` whose name matches `pattern`
///
/// A missing directory or no match is `Ok(None)`: a server may simply not have
/// produced a backup yet. Equal modification times are broken by file name so
/// the choice is deterministic.
pub fn find_latest_snapshot(
    dir: impl AsRef<Path>,
    pattern: &str,
) -> Result<Option<PathBuf>, LocatorError> {
    let matcher = compile_pattern(pattern)?;

    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;

    for entry in entries {
        let entry = entry?;
        if !matcher.is_match(entry.file_name()) {
            continue;
        }

        // The backup job may delete a file between listing and stat
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            continue;
        }

        let modified = metadata.modified()?;
        let path = entry.path();

        let newer = match &latest {
            None => true,
            Some((best_time, best_path)) => {
                modified > *best_time || (modified == *best_time && path > *best_path)
            }
        };
        if newer {
            latest = Some((modified, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_picks_newest_match() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "game_backup_1.db", 300);
        let newest = touch(dir.path(), "game_backup_2.db", 10);
        touch(dir.path(), "game_backup_3.db", 120);
        touch(dir.path(), "unrelated.db", 0);

        let found = find_latest_snapshot(dir.path(), "game_backup_*.db").unwrap();
        assert_eq!(found, Some(newest));
    }

    #[test]
    fn test_no_match_is_none() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "other.db", 0);

        let found = find_latest_snapshot(dir.path(), "game_backup_*.db").unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_missing_directory_is_none() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does_not_exist");

        let found = find_latest_snapshot(&missing, "*.db").unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_directories_are_skipped() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("backup_dir.db")).unwrap();
        let file = touch(dir.path(), "backup_file.db", 600);

        let found = find_latest_snapshot(dir.path(), "backup_*.db").unwrap();
        assert_eq!(found, Some(file));
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = tempdir().unwrap();
        let result = find_latest_snapshot(dir.path(), "game_[.db");
        assert!(matches!(result, Err(LocatorError::Pattern(_))));
    }
}

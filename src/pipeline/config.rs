//! Pipeline configuration from environment variables and the sources file
//!
//! Environment variables (a `.env` file is honoured by the binaries):
//! - `KILLFEED_SOURCES_PATH` (default: config/sources.json)
//! - `RANKING_DB_PATH` (default: data/ranking.db)
//! - `SPAWNS_DB_PATH` (optional, no default)
//! - `FEED_CHANNEL_BUFFER` (default: 1000)
//! - `RANKING_LIMIT` (default: 10)
//!
//! The sources file is a JSON array, one object per monitored game server:
//!
//! ```json
//! [
//!   {
//!     "name": "Exiled Lands",
//!     "saved_path": "/home/steam/conan/Saved",
//!     "db_pattern": "game_backup_*.db",
//!     "last_event_file": "/home/steam/bots/Killfeed/last_event_time_exiled.txt",
//!     "poll_interval": 20,
//!     "pvp_only": false
//!   }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::locator::compile_pattern;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Cannot read {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "Invalid sources file: {}", e),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err)
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_enabled() -> bool {
    true
}

/// One monitored game server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Display name; lookups ignore case
    pub name: String,

    /// Directory the backup job writes snapshots into
    pub saved_path: PathBuf,

    /// Snapshot filename glob
    pub db_pattern: String,

    /// Watermark file. Defaults to `state/<name>.last_event` when omitted.
    #[serde(default)]
    pub last_event_file: PathBuf,

    /// Seconds between polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Only publish PvP kills on the feed
    #[serde(default)]
    pub pvp_only: bool,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SourceConfig {
    pub fn new(name: &str, saved_path: impl Into<PathBuf>, db_pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            saved_path: saved_path.into(),
            db_pattern: db_pattern.to_string(),
            last_event_file: default_watermark_file(name),
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            pvp_only: false,
            enabled: true,
        }
    }

    /// Case-folded name used for lookups and lock registries
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.key() == name.to_lowercase()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "source name cannot be empty".to_string(),
            ));
        }

        if self.db_pattern.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "db_pattern cannot be empty (source '{}')",
                self.name
            )));
        }

        compile_pattern(&self.db_pattern).map_err(|e| {
            ConfigError::InvalidValue(format!("source '{}': {}", self.name, e))
        })?;

        if self.poll_interval == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "poll_interval must be > 0 (source '{}')",
                self.name
            )));
        }

        Ok(())
    }
}

fn default_watermark_file(name: &str) -> PathBuf {
    let slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    PathBuf::from("state").join(format!("{}.last_event", slug))
}

/// Configuration for the killfeed runtime and operator tools
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Monitored servers, in file order
    pub sources: Vec<SourceConfig>,

    /// Ranking database (read-write)
    pub ranking_db_path: PathBuf,

    /// Spawns database with creature names (read-only)
    pub spawns_db_path: Option<PathBuf>,

    /// Outcome feed channel capacity
    pub feed_buffer: usize,

    /// Rows shown by the leaderboard
    pub ranking_limit: usize,
}

impl PipelineConfig {
    /// Load configuration from environment variables and the sources file
    pub fn from_env() -> Result<Self, ConfigError> {
        let sources_path = env::var("KILLFEED_SOURCES_PATH")
            .unwrap_or_else(|_| "config/sources.json".to_string());

        Ok(Self {
            sources: load_sources(&sources_path)?,

            ranking_db_path: env::var("RANKING_DB_PATH")
                .unwrap_or_else(|_| "data/ranking.db".to_string())
                .into(),

            spawns_db_path: env::var("SPAWNS_DB_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),

            feed_buffer: env::var("FEED_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(1_000),

            ranking_limit: env::var("RANKING_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        })
    }

    /// Case-insensitive source lookup
    pub fn find_source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.matches_name(name))
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// Read and validate the sources file
pub fn load_sources(path: impl AsRef<Path>) -> Result<Vec<SourceConfig>, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_sources(&content)
}

/// Parse and validate a sources JSON document
pub fn parse_sources(json: &str) -> Result<Vec<SourceConfig>, ConfigError> {
    let mut sources: Vec<SourceConfig> = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    for source in &mut sources {
        source.validate()?;

        if !seen.insert(source.key()) {
            return Err(ConfigError::InvalidValue(format!(
                "duplicate source name '{}'",
                source.name
            )));
        }

        if source.last_event_file.as_os_str().is_empty() {
            source.last_event_file = default_watermark_file(&source.name);
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = r#"[
        {
            "name": "Exiled Lands",
            "saved_path": "/srv/exiled/Saved",
            "db_pattern": "game_backup_*.db",
            "last_event_file": "/srv/state/exiled.txt",
            "poll_interval": 20,
            "pvp_only": true
        },
        {
            "name": "Isle of Siptah",
            "saved_path": "/srv/siptah/Saved",
            "db_pattern": "game_*.db",
            "enabled": false
        }
    ]"#;

    fn config(sources: Vec<SourceConfig>) -> PipelineConfig {
        PipelineConfig {
            sources,
            ranking_db_path: "data/ranking.db".into(),
            spawns_db_path: None,
            feed_buffer: 1_000,
            ranking_limit: 10,
        }
    }

    #[test]
    fn test_parse_sources_with_defaults() {
        let sources = parse_sources(SOURCES).unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].poll_interval(), Duration::from_secs(20));
        assert!(sources[0].pvp_only);
        assert!(sources[0].enabled);
        assert_eq!(sources[0].last_event_file, PathBuf::from("/srv/state/exiled.txt"));

        assert_eq!(sources[1].poll_interval, DEFAULT_POLL_INTERVAL_SECS);
        assert!(!sources[1].pvp_only);
        assert!(!sources[1].enabled);
        assert_eq!(
            sources[1].last_event_file,
            PathBuf::from("state").join("isle_of_siptah.last_event")
        );
    }

    #[test]
    fn test_find_source_ignores_case() {
        let cfg = config(parse_sources(SOURCES).unwrap());

        assert_eq!(cfg.find_source("exiled lands").unwrap().name, "Exiled Lands");
        assert_eq!(cfg.find_source("ISLE OF SIPTAH").unwrap().name, "Isle of Siptah");
        assert!(cfg.find_source("Savage Wilds").is_none());
    }

    #[test]
    fn test_enabled_sources() {
        let cfg = config(parse_sources(SOURCES).unwrap());
        let names: Vec<_> = cfg.enabled_sources().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["Exiled Lands"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let json = r#"[
            {"name": "Exiled", "saved_path": "/a", "db_pattern": "*.db"},
            {"name": "EXILED", "saved_path": "/b", "db_pattern": "*.db"}
        ]"#;

        let err = parse_sources(json).unwrap_err();
        assert!(err.to_string().contains("duplicate source name"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        for json in [
            r#"[{"name": "", "saved_path": "/a", "db_pattern": "*.db"}]"#,
            r#"[{"name": "A", "saved_path": "/a", "db_pattern": ""}]"#,
            r#"[{"name": "A", "saved_path": "/a", "db_pattern": "game_[.db"}]"#,
            r#"[{"name": "A", "saved_path": "/a", "db_pattern": "*.db", "poll_interval": 0}]"#,
        ] {
            assert!(
                matches!(parse_sources(json), Err(ConfigError::InvalidValue(_))),
                "expected rejection for {}",
                json
            );
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            parse_sources("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_sources_file() {
        let err = load_sources("/definitely/not/here/sources.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

//! Per-source watermark persistence
//!
//! The watermark is the highest `worldTime` already folded into a source's
//! ranking. It is stored as a plain integer in a small text file so operators
//! can inspect or hand-edit it.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::config::SourceConfig;

#[derive(Debug)]
pub enum WatermarkError {
    Io { path: PathBuf, source: io::Error },
    Unavailable(String),
}

impl std::fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatermarkError::Io { path, source } => {
                write!(f, "Watermark I/O error on {}: {}", path.display(), source)
            }
            WatermarkError::Unavailable(msg) => write!(f, "Watermark store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for WatermarkError {}

/// Durable per-source cursor
///
/// `write` is only ever called with a value greater than the one returned by the
/// preceding `read` in the same cycle.
pub trait WatermarkStore: Send + Sync {
    /// Current watermark, 0 if never set
    fn read(&self, source: &SourceConfig) -> Result<i64, WatermarkError>;

    /// Overwrite the watermark. Must not report success unless durable.
    fn write(&self, source: &SourceConfig, value: i64) -> Result<(), WatermarkError>;
}

/// One text file per source at `SourceConfig::last_event_file`
#[derive(Debug, Default)]
pub struct FileWatermarkStore;

impl FileWatermarkStore {
    pub fn new() -> Self {
        Self
    }

    fn read_path(path: &Path) -> Result<i64, WatermarkError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(WatermarkError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        match content.trim().parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                log::warn!(
                    "⚠️  Unparseable watermark in {} ({:?}), starting from 0",
                    path.display(),
                    content.trim()
                );
                Ok(0)
            }
        }
    }

    /// Write to a sibling temp file, fsync, then rename over the target
    fn write_path(path: &Path, value: i64) -> Result<(), WatermarkError> {
        let io_err = |e: io::Error| WatermarkError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(value.to_string().as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn read(&self, source: &SourceConfig) -> Result<i64, WatermarkError> {
        Self::read_path(&source.last_event_file)
    }

    fn write(&self, source: &SourceConfig, value: i64) -> Result<(), WatermarkError> {
        Self::write_path(&source.last_event_file, value)
    }
}

/// Process-local watermarks keyed by lowercase source name
///
/// Lost on restart; meant for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    values: Mutex<HashMap<String, i64>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn read(&self, source: &SourceConfig) -> Result<i64, WatermarkError> {
        let values = self
            .values
            .lock()
            .map_err(|_| WatermarkError::Unavailable("lock poisoned".to_string()))?;
        Ok(values.get(&source.key()).copied().unwrap_or(0))
    }

    fn write(&self, source: &SourceConfig, value: i64) -> Result<(), WatermarkError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| WatermarkError::Unavailable("lock poisoned".to_string()))?;
        values.insert(source.key(), value);
        Ok(())
    }
}

use gerg_core::HistoryRecord;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HISTORY_FILE_NAME: &str = ".gerg_history.jsonl";

#[derive(thiserror::Error, Debug)]
pub enum HistoryError {
    #[error("cannot create history directory {}: {source}", .dir.display())]
    CreateDir {
        dir: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot append to history log {}: {source}", .path.display())]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot encode history record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only JSONL audit log, one record per terminal run outcome.
///
/// Writes are line-oriented appends, so independent runs can share the same
/// file without coordination. Nothing here ever truncates or rewrites.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let dir = history_dir.into();
        fs::create_dir_all(&dir).map_err(|source| HistoryError::CreateDir {
            dir: dir.clone(),
            source,
        })?;
        Ok(Self {
            path: dir.join(HISTORY_FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let line = serde_json::to_string(record)?;
        let append = |source| HistoryError::Append {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(append)?;
        writeln!(file, "{line}").map_err(append)?;
        Ok(())
    }
}

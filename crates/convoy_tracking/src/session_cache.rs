use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use convoy_routing::coordinate::Coordinate;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::progress_clock::TimingMode;

pub const CACHE_FOLDER_ENV_VAR: &str = "CONVOY_CACHE_FOLDER";
pub const DEFAULT_FRESHNESS: SignedDuration = SignedDuration::from_hours(24);

const CACHE_FILENAME: &str = "last_session.json";

#[derive(Debug, Error)]
pub enum SessionCacheError {
    #[error("environment variable CONVOY_CACHE_FOLDER is not set")]
    MissingFolder,

    #[error("path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The last successfully started session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSession {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    #[serde(default)]
    pub timing: TimingMode,
    pub saved_at: Timestamp,
}

impl CachedSession {
    pub fn is_fresh(&self, now: Timestamp, freshness: SignedDuration) -> bool {
        now.duration_since(self.saved_at) <= freshness
    }
}

pub struct SessionCache {
    folder: PathBuf,
    freshness: SignedDuration,
}

impl SessionCache {
    pub fn new<P: AsRef<Path>>(folder: P) -> Result<Self, SessionCacheError> {
        let folder = folder.as_ref();

        if !folder.is_dir() {
            return Err(SessionCacheError::NotADirectory(folder.to_path_buf()));
        }

        Ok(Self {
            folder: folder.to_path_buf(),
            freshness: DEFAULT_FRESHNESS,
        })
    }

    pub fn from_env() -> Result<Self, SessionCacheError> {
        let folder =
            std::env::var(CACHE_FOLDER_ENV_VAR).map_err(|_| SessionCacheError::MissingFolder)?;
        Self::new(folder)
    }

    pub fn with_freshness(mut self, freshness: SignedDuration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn path(&self) -> PathBuf {
        self.folder.join(CACHE_FILENAME)
    }

    pub fn save(&self, session: &CachedSession) -> Result<(), SessionCacheError> {
        let file = std::fs::File::create(self.path())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, session)?;
        writer.flush()?;

        debug!("Saved session to {}", self.path().display());
        Ok(())
    }

    /// Last session if still fresh. Expired and unreadable entries are deleted.
    pub fn load(&self, now: Timestamp) -> Result<Option<CachedSession>, SessionCacheError> {
        let path = self.path();

        if !path.is_file() {
            return Ok(None);
        }

        let file = std::fs::File::open(&path)?;
        let session: CachedSession = match serde_json::from_reader(file) {
            Ok(session) => session,
            Err(error) => {
                warn!("Discarding unreadable session {}: {}", path.display(), error);
                self.clear()?;
                return Ok(None);
            }
        };

        if !session.is_fresh(now, self.freshness) {
            info!("Discarding session saved at {}", session.saved_at);
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub fn clear(&self) -> Result<(), SessionCacheError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

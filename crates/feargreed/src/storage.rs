//! JSON history file: tolerant load, atomic save, read-back verification,
//! and an exclusive lock around the whole read-modify-write cycle.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::types::{HistoryLog, Reading, StoreError, StoreResult, HISTORY_LIMIT};

/// Durable home of a [`HistoryLog`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

/// Exclusive advisory lock on `.<data>.lock`; released when dropped.
///
/// The lock file itself stays on disk. Removing it would let a waiter and
/// a newcomer lock two different inodes at once.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hidden helper file next to the data file, e.g. `.data.json.lock`.
    ///
    /// The data directory may be served over HTTP; dotfiles usually are not.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("data.json");
        self.path.with_file_name(format!(".{name}.{suffix}"))
    }

    fn io_err(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Read the persisted log.
    ///
    /// A missing or unparsable file yields [`HistoryLog::empty`]. A history
    /// longer than [`HISTORY_LIMIT`] is cut back to its newest entries.
    pub fn load(&self) -> HistoryLog {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no existing data file, starting empty");
                return HistoryLog::empty();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "unreadable data file, starting empty: {e}");
                return HistoryLog::empty();
            }
        };

        match serde_json::from_str::<HistoryLog>(&content) {
            Ok(mut log) => {
                if log.history.len() > HISTORY_LIMIT {
                    tracing::warn!(
                        entries = log.history.len(),
                        "history exceeds retention bound, truncating"
                    );
                    log.truncate_to(HISTORY_LIMIT);
                }
                tracing::debug!(path = %self.path.display(), entries = log.len(), "loaded data file");
                log
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "corrupt data file, starting empty: {e}");
                HistoryLog::empty()
            }
        }
    }

    /// Write `log` as 2-space indented JSON.
    ///
    /// The bytes go to `.<data>.tmp`, are synced, then renamed over the data
    /// file, so readers see either the old or the new file, never a mix.
    pub fn save(&self, log: &HistoryLog) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Self::io_err(parent, e))?;
            }
        }

        let payload = serde_json::to_vec_pretty(log)?;

        let tmp = self.sibling("tmp");
        let mut file = File::create(&tmp).map_err(|e| Self::io_err(&tmp, e))?;
        file.write_all(&payload).map_err(|e| Self::io_err(&tmp, e))?;
        file.sync_all().map_err(|e| Self::io_err(&tmp, e))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(Self::io_err(&self.path, e));
        }

        tracing::info!(path = %self.path.display(), entries = log.len(), "data file written");
        Ok(())
    }

    /// Re-read the file and confirm `current.score` survived the write.
    pub fn verify(&self, expected: &HistoryLog) -> StoreResult<()> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::VerifyRead(format!("{}: {e}", self.path.display())))?;
        let written: HistoryLog = serde_json::from_str(&content)
            .map_err(|e| StoreError::VerifyRead(format!("{}: {e}", self.path.display())))?;

        let want = expected.current.as_ref().map(|r| r.score.clone());
        let found = written.current.as_ref().map(|r| r.score.clone());
        if want != found {
            return Err(StoreError::VerifyMismatch {
                expected: want,
                found,
            });
        }

        tracing::info!(score = ?found, "verified data file");
        Ok(())
    }

    /// Take the exclusive lock guarding load → append → save.
    ///
    /// Blocks until any other holder releases it.
    pub fn lock(&self) -> StoreResult<StoreLock> {
        let path = self.sibling("lock");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Self::io_err(parent, e))?;
            }
        }

        let lock_err = |source| StoreError::Lock {
            path: path.display().to_string(),
            source,
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;

        Ok(StoreLock { file })
    }

    /// Durably record one reading: lock, load, append, save, verify.
    ///
    /// Returns the log as written.
    pub fn commit(&self, reading: Reading) -> StoreResult<HistoryLog> {
        let _lock = self.lock()?;
        let mut log = self.load();
        log.append(reading);
        self.save(&log)?;
        self.verify(&log)?;
        Ok(log)
    }
}

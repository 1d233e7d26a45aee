//! Rotating error log on the local filesystem.
//!
//! Every operation opens the artifact, takes an advisory lock on it and holds
//! that lock for the whole read-modify-write sequence, so several worker
//! processes of the same application can share one artifact. The lock is
//! released when the [`LockedArtifact`] guard drops, on every exit path.

use crate::application::ports::{LogStore, StoreStatus};
use crate::config::ReportingConfig;
use crate::error::StoreError;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Leading bytes that mark the artifact as administratively disabled.
pub const DISABLED_MARKER: &[u8; 8] = b"disabled";

/// File-backed [`LogStore`].
#[derive(Debug, Clone)]
pub struct FileLogStore {
    path: PathBuf,
    max_size: u64,
    truncate_size: u64,
}

impl FileLogStore {
    /// `truncate_size` must be below `max_size`; [`ReportingConfig::validate`]
    /// enforces this for configured stores.
    pub fn new(path: impl Into<PathBuf>, max_size: u64, truncate_size: u64) -> Self {
        Self {
            path: path.into(),
            max_size,
            truncate_size,
        }
    }

    /// Store for the configured log path, if any.
    pub fn from_config(config: &ReportingConfig) -> Option<Self> {
        config
            .log_path
            .as_ref()
            .map(|path| Self::new(path, config.file_max_size, config.file_truncate_size))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, source: io::Error) -> StoreError {
        StoreError::io(&self.path, source)
    }

    /// Open for read/write and lock exclusively, creating the artifact if asked.
    ///
    /// Returns `None` when the artifact is missing and `create` is false.
    fn lock_exclusive(&self, create: bool) -> Result<Option<LockedArtifact>, StoreError> {
        let opened = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(&self.path);

        let file = match opened {
            Ok(file) => file,
            Err(e) if !create && e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.err(e)),
        };

        fs2::FileExt::lock_exclusive(&file).map_err(|e| self.err(e))?;
        Ok(Some(LockedArtifact { file }))
    }

    fn lock_shared(&self) -> Result<Option<LockedArtifact>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.err(e)),
        };

        fs2::FileExt::lock_shared(&file).map_err(|e| self.err(e))?;
        Ok(Some(LockedArtifact { file }))
    }
}

/// An open artifact holding an advisory lock until dropped.
struct LockedArtifact {
    file: File,
}

impl LockedArtifact {
    fn head(&mut self) -> io::Result<Vec<u8>> {
        let mut head = Vec::with_capacity(DISABLED_MARKER.len());
        self.file.seek(SeekFrom::Start(0))?;
        (&mut self.file)
            .take(DISABLED_MARKER.len() as u64)
            .read_to_end(&mut head)?;
        Ok(head)
    }

    fn is_disabled(&mut self) -> io::Result<bool> {
        Ok(self.head()? == DISABLED_MARKER)
    }

    /// Drop the first `truncate_size` bytes and keep the rest at the start.
    fn rotate(&mut self, size: u64, truncate_size: u64) -> io::Result<()> {
        let mut kept = Vec::with_capacity(size.saturating_sub(truncate_size) as usize);
        self.file.seek(SeekFrom::Start(truncate_size))?;
        self.file.read_to_end(&mut kept)?;

        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&kept)
    }
}

impl Drop for LockedArtifact {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

impl LogStore for FileLogStore {
    fn append(&self, entry: &str, stamp: Option<SystemTime>) -> Result<bool, StoreError> {
        self.append_with(entry, &mut |_: StoreStatus| stamp)
    }

    fn append_with(
        &self,
        entry: &str,
        plan: &mut dyn FnMut(StoreStatus) -> Option<SystemTime>,
    ) -> Result<bool, StoreError> {
        let Some(mut artifact) = self.lock_exclusive(true)? else {
            return Ok(false);
        };

        let mut write = |artifact: &mut LockedArtifact| -> io::Result<bool> {
            if artifact.is_disabled()? {
                return Ok(false);
            }

            let metadata = artifact.file.metadata()?;
            let size = metadata.len();
            let stamp = plan(StoreStatus {
                len: size,
                modified: metadata.modified().ok(),
            });

            if size > self.max_size {
                artifact.rotate(size, self.truncate_size)?;
                tracing::debug!(
                    path = %self.path.display(),
                    size,
                    dropped = self.truncate_size,
                    "rotated error log"
                );
            } else {
                artifact.file.seek(SeekFrom::End(0))?;
            }

            artifact.file.write_all(entry.as_bytes())?;
            artifact.file.flush()?;

            if let Some(stamp) = stamp {
                artifact.file.set_modified(stamp)?;
            }
            Ok(true)
        };

        write(&mut artifact).map_err(|e| self.err(e))
    }

    fn read(&self) -> Result<Vec<u8>, StoreError> {
        let Some(mut artifact) = self.lock_shared()? else {
            return Ok(Vec::new());
        };

        let mut content = Vec::new();
        artifact
            .file
            .read_to_end(&mut content)
            .map_err(|e| self.err(e))?;
        Ok(content)
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.lock_exclusive(false)? {
            Some(artifact) => artifact.file.set_len(0).map_err(|e| self.err(e)),
            None => Ok(()),
        }
    }

    fn is_disabled(&self) -> Result<bool, StoreError> {
        match self.lock_shared()? {
            Some(mut artifact) => artifact.is_disabled().map_err(|e| self.err(e)),
            None => Ok(false),
        }
    }

    fn toggle_disabled(&self) -> Result<bool, StoreError> {
        let Some(mut artifact) = self.lock_exclusive(true)? else {
            return Ok(false);
        };

        let toggle = |artifact: &mut LockedArtifact| -> io::Result<bool> {
            let disabled = artifact.is_disabled()?;
            artifact.file.set_len(0)?;
            if !disabled {
                artifact.file.seek(SeekFrom::Start(0))?;
                artifact.file.write_all(DISABLED_MARKER)?;
            }
            Ok(!disabled)
        };

        let disabled = toggle(&mut artifact).map_err(|e| self.err(e))?;
        tracing::info!(path = %self.path.display(), disabled, "toggled error log");
        Ok(disabled)
    }

    fn status(&self) -> Result<StoreStatus, StoreError> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => Ok(StoreStatus {
                len: metadata.len(),
                modified: metadata.modified().ok(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StoreStatus::default()),
            Err(e) => Err(self.err(e)),
        }
    }
}

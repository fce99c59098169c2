use crate::utils::validation::validate_stored_name;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Suffix that marks a file as not yet promoted.
pub const STAGED_SUFFIX: &str = ".staged";

/// Staged files live in this subdirectory of their final directory so that
/// promotion is a same-filesystem rename.
pub const STAGING_SUBDIR: &str = "temp";

const WRITE_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Thumbnail,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Thumbnail => "thumbnail",
        }
    }
}

/// A file that has been (or is being) written to the staging area under its
/// final name plus [`STAGED_SUFFIX`]. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub kind: MediaKind,
    pub final_name: String,
}

impl StagedFile {
    pub fn new(kind: MediaKind, final_name: impl Into<String>) -> Self {
        Self {
            kind,
            final_name: final_name.into(),
        }
    }

    pub fn staged_name(&self) -> String {
        format!("{}{}", self.final_name, STAGED_SUFFIX)
    }
}

pub struct StagedEntry {
    pub file: StagedFile,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("staging write was cancelled")]
    Cancelled,

    #[error("invalid stored filename: {0}")]
    InvalidName(String),
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Writes `data` into the staging area. `cancel` is checked between
    /// chunks; a cancelled or failed write leaves no staged file behind.
    async fn stage(
        &self,
        staged: &StagedFile,
        data: Bytes,
        cancel: CancellationToken,
    ) -> Result<(), StorageError>;

    /// Moves a staged file to its final path, replacing anything already there.
    async fn promote(&self, staged: &StagedFile) -> Result<(), StorageError>;

    /// Deletes a staged file. Missing files are not an error.
    async fn discard(&self, staged: &StagedFile) -> Result<(), StorageError>;

    async fn list_staged(&self, kind: MediaKind) -> Result<Vec<StagedEntry>, StorageError>;

    async fn exists(&self, kind: MediaKind, name: &str) -> Result<bool, StorageError>;

    /// Resolves a stored filename to its final path on disk.
    fn resolve(&self, kind: MediaKind, name: &str) -> Result<PathBuf, StorageError>;
}

pub struct LocalStorageService {
    video_dir: PathBuf,
    thumbnail_dir: PathBuf,
}

impl LocalStorageService {
    pub fn new(video_dir: impl AsRef<Path>, thumbnail_dir: impl AsRef<Path>) -> Self {
        Self {
            video_dir: video_dir.as_ref().to_path_buf(),
            thumbnail_dir: thumbnail_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn ensure_directories(&self) -> Result<(), StorageError> {
        for kind in [MediaKind::Video, MediaKind::Thumbnail] {
            tokio::fs::create_dir_all(self.staging_dir(kind)).await?;
        }
        Ok(())
    }

    pub fn final_dir(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Video => &self.video_dir,
            MediaKind::Thumbnail => &self.thumbnail_dir,
        }
    }

    pub fn staging_dir(&self, kind: MediaKind) -> PathBuf {
        self.final_dir(kind).join(STAGING_SUBDIR)
    }

    fn staged_path(&self, staged: &StagedFile) -> Result<PathBuf, StorageError> {
        validate_stored_name(&staged.final_name)
            .map_err(|_| StorageError::InvalidName(staged.final_name.clone()))?;
        Ok(self.staging_dir(staged.kind).join(staged.staged_name()))
    }
}

/// Runs on a blocking worker thread.
fn write_staged(path: &Path, data: &[u8], cancel: &CancellationToken) -> Result<(), StorageError> {
    let result: Result<(), StorageError> = (|| {
        let mut file = std::fs::File::create(path)?;
        for chunk in data.chunks(WRITE_CHUNK_SIZE) {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            file.write_all(chunk)?;
        }
        file.sync_all()?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
    result
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn stage(
        &self,
        staged: &StagedFile,
        data: Bytes,
        cancel: CancellationToken,
    ) -> Result<(), StorageError> {
        let path = self.staged_path(staged)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(
            "Staging {} ({} bytes) at {}",
            staged.kind.as_str(),
            data.len(),
            path.display()
        );

        tokio::task::spawn_blocking(move || write_staged(&path, &data, &cancel))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    async fn promote(&self, staged: &StagedFile) -> Result<(), StorageError> {
        let from = self.staged_path(staged)?;
        let to = self.resolve(staged.kind, &staged.final_name)?;
        tokio::fs::create_dir_all(self.final_dir(staged.kind)).await?;
        tokio::fs::rename(&from, &to).await?;
        tracing::debug!("Promoted {} -> {}", from.display(), to.display());
        Ok(())
    }

    async fn discard(&self, staged: &StagedFile) -> Result<(), StorageError> {
        let path = self.staged_path(staged)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Discarded staged file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_staged(&self, kind: MediaKind) -> Result<Vec<StagedEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(self.staging_dir(kind)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(final_name) = name.strip_suffix(STAGED_SUFFIX) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);
            entries.push(StagedEntry {
                file: StagedFile::new(kind, final_name),
                modified,
            });
        }

        Ok(entries)
    }

    async fn exists(&self, kind: MediaKind, name: &str) -> Result<bool, StorageError> {
        let path = self.resolve(kind, name)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    fn resolve(&self, kind: MediaKind, name: &str) -> Result<PathBuf, StorageError> {
        validate_stored_name(name).map_err(|_| StorageError::InvalidName(name.to_string()))?;
        Ok(self.final_dir(kind).join(name))
    }
}

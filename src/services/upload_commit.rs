use crate::services::storage::{StagedFile, StorageService};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Validating,
    Staging,
    PersistingMetadata,
    AwaitingCommit,
    Promoted,
    RolledBack,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Promoted | UploadState::RolledBack)
    }
}

/// Owns the staged files of a single upload and decides their fate once the
/// metadata transaction has an outcome. It never touches the database; the
/// caller reports the commit or rollback.
pub struct UploadCommit {
    storage: Arc<dyn StorageService>,
    state: UploadState,
    staged: Vec<StagedFile>,
}

impl UploadCommit {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self {
            storage,
            state: UploadState::Validating,
            staged: Vec::new(),
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn staged(&self) -> &[StagedFile] {
        &self.staged
    }

    fn advance(&mut self, expected: UploadState, next: UploadState) {
        debug_assert_eq!(
            self.state, expected,
            "upload moved to {:?} from unexpected state",
            next
        );
        self.state = next;
    }

    pub fn begin_staging(&mut self) {
        self.advance(UploadState::Validating, UploadState::Staging);
    }

    /// Registers a file whose staging write has started. It is discarded on
    /// every failure path from here on, including a partially written one.
    pub fn track(&mut self, file: StagedFile) {
        debug_assert_eq!(self.state, UploadState::Staging);
        self.staged.push(file);
    }

    pub fn begin_persisting(&mut self) {
        self.advance(UploadState::Staging, UploadState::PersistingMetadata);
    }

    pub fn await_commit(&mut self) {
        self.advance(UploadState::PersistingMetadata, UploadState::AwaitingCommit);
    }

    /// Cleanup for failures that happen before the transaction starts.
    pub async fn abort(&mut self) {
        self.discard_all().await;
        self.state = UploadState::RolledBack;
    }

    /// Moves every staged file to its final name. Failures are logged and
    /// returned; the row is already committed so they are left for the
    /// reconciliation worker.
    pub async fn on_transaction_committed(&mut self) -> Vec<StagedFile> {
        self.advance(UploadState::AwaitingCommit, UploadState::Promoted);

        let mut failed = Vec::new();
        for file in &self.staged {
            if let Err(e) = self.storage.promote(file).await {
                tracing::error!(
                    "❌ Failed to promote {} {} after commit: {}",
                    file.kind.as_str(),
                    file.final_name,
                    e
                );
                failed.push(file.clone());
            }
        }
        failed
    }

    pub async fn on_transaction_rolled_back(&mut self) {
        self.discard_all().await;
        self.state = UploadState::RolledBack;
    }

    async fn discard_all(&self) {
        for file in &self.staged {
            if let Err(e) = self.storage.discard(file).await {
                tracing::warn!(
                    "Failed to delete staged {} {}: {}",
                    file.kind.as_str(),
                    file.final_name,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{LocalStorageService, MediaKind};
    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    async fn staged_pair(root: &TempDir) -> (Arc<LocalStorageService>, UploadCommit) {
        let storage = Arc::new(LocalStorageService::new(
            root.path().join("videos"),
            root.path().join("thumbnails"),
        ));
        storage.ensure_directories().await.unwrap();

        let mut commit = UploadCommit::new(storage.clone());
        commit.begin_staging();
        for file in [
            StagedFile::new(MediaKind::Thumbnail, "t.jpg"),
            StagedFile::new(MediaKind::Video, "v.mp4"),
        ] {
            storage
                .stage(&file, Bytes::from_static(b"data"), CancellationToken::new())
                .await
                .unwrap();
            commit.track(file);
        }
        (storage, commit)
    }

    #[tokio::test]
    async fn test_commit_promotes_all_files() {
        let root = TempDir::new().unwrap();
        let (storage, mut commit) = staged_pair(&root).await;

        commit.begin_persisting();
        commit.await_commit();
        let failed = commit.on_transaction_committed().await;

        assert!(failed.is_empty());
        assert_eq!(commit.state(), UploadState::Promoted);
        assert!(storage.exists(MediaKind::Video, "v.mp4").await.unwrap());
        assert!(storage.exists(MediaKind::Thumbnail, "t.jpg").await.unwrap());
        assert!(storage.list_staged(MediaKind::Video).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_discards_all_files() {
        let root = TempDir::new().unwrap();
        let (storage, mut commit) = staged_pair(&root).await;

        commit.begin_persisting();
        commit.on_transaction_rolled_back().await;

        assert_eq!(commit.state(), UploadState::RolledBack);
        assert!(!storage.exists(MediaKind::Video, "v.mp4").await.unwrap());
        assert!(storage.list_staged(MediaKind::Video).await.unwrap().is_empty());
        assert!(storage.list_staged(MediaKind::Thumbnail).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_staged_file_is_reported_after_commit() {
        let root = TempDir::new().unwrap();
        let (storage, mut commit) = staged_pair(&root).await;
        storage
            .discard(&StagedFile::new(MediaKind::Video, "v.mp4"))
            .await
            .unwrap();

        commit.begin_persisting();
        commit.await_commit();
        let failed = commit.on_transaction_committed().await;

        assert_eq!(failed, vec![StagedFile::new(MediaKind::Video, "v.mp4")]);
        assert!(storage.exists(MediaKind::Thumbnail, "t.jpg").await.unwrap());
        assert!(commit.state().is_terminal());
    }
}

use crate::config::AppConfig;
use crate::entities::{prelude::*, video_posts};
use crate::services::comment_rate_limiter::CommentRateLimiter;
use crate::services::login_guard::LoginAttemptGuard;
use crate::services::storage::{MediaKind, StagedEntry, StorageService};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

const RUN_INTERVAL: Duration = Duration::from_secs(3600);

/// Staged files younger than this may still belong to an upload that is
/// between commit and promotion.
const PROMOTION_GRACE_MINUTES: i64 = 5;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub promoted: usize,
    pub discarded: usize,
    pub failed: usize,
    pub limiter_entries_purged: usize,
    pub guard_entries_purged: usize,
}

pub struct BackgroundWorker {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    limiter: CommentRateLimiter,
    guard: LoginAttemptGuard,
    config: AppConfig,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        limiter: CommentRateLimiter,
        guard: LoginAttemptGuard,
        config: AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            db,
            storage,
            limiter,
            guard,
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(RUN_INTERVAL) => {
                    self.run_once_at(Utc::now()).await;
                }
            }
        }
    }

    pub async fn run_once_at(&self, now: DateTime<Utc>) -> ReconciliationReport {
        tracing::info!("🧹 Running staging reconciliation...");
        let mut report = ReconciliationReport::default();

        for kind in [MediaKind::Video, MediaKind::Thumbnail] {
            match self.storage.list_staged(kind).await {
                Ok(entries) => {
                    for entry in entries {
                        self.reconcile_entry(&entry, now, &mut report).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to list staged {} files: {}", kind.as_str(), e);
                    report.failed += 1;
                }
            }
        }

        report.limiter_entries_purged = self.limiter.cleanup_at(now);
        report.guard_entries_purged = self.guard.cleanup_at(now);

        tracing::info!(
            "✅ Reconciliation completed: {} promoted, {} discarded, {} failed",
            report.promoted,
            report.discarded,
            report.failed
        );
        report
    }

    async fn reconcile_entry(
        &self,
        entry: &StagedEntry,
        now: DateTime<Utc>,
        report: &mut ReconciliationReport,
    ) {
        let file = &entry.file;
        let age = entry.modified.map(|modified| now - modified);

        let referenced = match self.is_referenced(file.kind, &file.final_name).await {
            Ok(referenced) => referenced,
            Err(e) => {
                tracing::error!("Failed to look up {}: {}", file.final_name, e);
                report.failed += 1;
                return;
            }
        };

        if referenced {
            if age.is_some_and(|age| age < ChronoDuration::minutes(PROMOTION_GRACE_MINUTES)) {
                return;
            }
            match self.storage.exists(file.kind, &file.final_name).await {
                Ok(false) => match self.storage.promote(file).await {
                    Ok(()) => {
                        tracing::warn!("🔧 Promoted orphaned staged file {}", file.final_name);
                        report.promoted += 1;
                    }
                    Err(e) => {
                        tracing::error!("Failed to promote {}: {}", file.final_name, e);
                        report.failed += 1;
                    }
                },
                // Final file already in place; the staged copy is a leftover.
                Ok(true) => self.discard(entry, report).await,
                Err(e) => {
                    tracing::error!("Failed to check {}: {}", file.final_name, e);
                    report.failed += 1;
                }
            }
            return;
        }

        let cleanup_age = ChronoDuration::hours(self.config.staging_cleanup_age_hours as i64);
        if age.is_none_or(|age| age >= cleanup_age) {
            self.discard(entry, report).await;
        }
    }

    async fn discard(&self, entry: &StagedEntry, report: &mut ReconciliationReport) {
        match self.storage.discard(&entry.file).await {
            Ok(()) => {
                tracing::info!("Removed abandoned staged file {}", entry.file.final_name);
                report.discarded += 1;
            }
            Err(e) => {
                tracing::error!("Failed to remove {}: {}", entry.file.final_name, e);
                report.failed += 1;
            }
        }
    }

    async fn is_referenced(&self, kind: MediaKind, name: &str) -> Result<bool, DbErr> {
        let column = match kind {
            MediaKind::Video => video_posts::Column::VideoPath,
            MediaKind::Thumbnail => video_posts::Column::ThumbnailPath,
        };
        let count = VideoPosts::find()
            .filter(column.eq(name))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}

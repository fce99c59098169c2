use crate::api::error::AppError;
use crate::entities::{video_posts, video_tags};
use crate::services::storage::{MediaKind, StagedFile};
use crate::services::upload_commit::UploadCommit;
use crate::utils::validation::{
    generate_stored_name, require_text, validate_thumbnail, validate_video_size,
    verify_video_signature,
};
use bytes::Bytes;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, Set, TransactionTrait};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{UploadRequest, VideoService, VideoWithTags};

const MAX_TITLE_LENGTH: usize = 255;

/// How long a timed-out upload waits for its cancelled write to wind down.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

impl VideoService {
    /// Validates, stages, persists and promotes a single upload. Every failure
    /// path removes the files this upload staged before returning.
    pub async fn upload(&self, req: UploadRequest) -> Result<VideoWithTags, AppError> {
        // Validation has no side effects.
        let title = require_text("title", &req.title, MAX_TITLE_LENGTH)?;
        validate_video_size(req.video.data.len(), self.config.max_video_size)?;
        if req.video.data.is_empty() {
            return Err(AppError::BadRequest("Video file is empty".to_string()));
        }
        verify_video_signature(&req.video.data)?;
        validate_thumbnail(&req.thumbnail.data)?;

        let description = req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let location = req
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let thumbnail = StagedFile::new(
            MediaKind::Thumbnail,
            generate_stored_name(req.thumbnail.filename.as_deref()),
        );
        let video = StagedFile::new(
            MediaKind::Video,
            generate_stored_name(req.video.filename.as_deref()),
        );
        let video_size = req.video.data.len() as i64;

        let mut commit = UploadCommit::new(self.storage.clone());
        commit.begin_staging();

        commit.track(thumbnail.clone());
        if let Err(e) = self
            .storage
            .stage(&thumbnail, req.thumbnail.data, CancellationToken::new())
            .await
        {
            commit.abort().await;
            return Err(e.into());
        }

        commit.track(video.clone());
        if let Err(e) = self.stage_video_bounded(&video, req.video.data).await {
            commit.abort().await;
            return Err(e);
        }

        commit.begin_persisting();

        let txn = match self.db.begin().await {
            Ok(txn) => txn,
            Err(e) => {
                commit.abort().await;
                return Err(e.into());
            }
        };

        let new_video = NewVideo {
            title,
            description,
            location,
            tags: req.tags,
            thumbnail_path: thumbnail.final_name.clone(),
            video_path: video.final_name.clone(),
            video_size,
            user_id: req.user_id,
        };

        let created = match insert_video(&txn, new_video).await {
            Ok(created) => created,
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::warn!("Rollback after failed insert also failed: {}", rollback_err);
                }
                commit.on_transaction_rolled_back().await;
                return Err(e.into());
            }
        };

        commit.await_commit();

        if let Err(e) = txn.commit().await {
            commit.on_transaction_rolled_back().await;
            return Err(e.into());
        }

        let failed = commit.on_transaction_committed().await;
        if !failed.is_empty() {
            tracing::error!(
                "Video {} committed with {} unpromoted file(s); left for reconciliation",
                created.video.id,
                failed.len()
            );
        }

        tracing::info!(
            "📼 Video {} uploaded by user {} ({} bytes)",
            created.video.id,
            created.video.user_id,
            created.video.video_size
        );

        Ok(created)
    }

    /// Runs the video write on its own task so the timeout can fire while the
    /// write is in progress. On expiry the write is cancelled and given
    /// [`CANCEL_GRACE`] to remove its partial file. A write that outlives the
    /// grace period is discarded in the background once it finishes.
    async fn stage_video_bounded(&self, video: &StagedFile, data: Bytes) -> Result<(), AppError> {
        let cancel = CancellationToken::new();
        let storage = self.storage.clone();
        let file = video.clone();
        let token = cancel.clone();
        let mut handle = tokio::spawn(async move { storage.stage(&file, data, token).await });

        match tokio::time::timeout(self.config.upload_timeout(), &mut handle).await {
            Ok(joined) => joined
                .map_err(|e| AppError::Internal(format!("Video staging task failed: {}", e)))?
                .map_err(AppError::from),
            Err(_) => {
                cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut handle).await.is_err() {
                    tracing::warn!(
                        "Cancelled staging of {} is still running; discarding it in the background",
                        video.final_name
                    );
                    let storage = self.storage.clone();
                    let file = video.clone();
                    tokio::spawn(async move {
                        let _ = handle.await;
                        if let Err(e) = storage.discard(&file).await {
                            tracing::error!("Failed to discard {}: {}", file.final_name, e);
                        }
                    });
                }
                tracing::warn!(
                    "⏱️ Video staging for {} exceeded {} ms, cancelled",
                    video.final_name,
                    self.config.upload_timeout_ms
                );
                Err(AppError::Timeout(format!(
                    "Video upload exceeded {} ms",
                    self.config.upload_timeout_ms
                )))
            }
        }
    }
}

struct NewVideo {
    title: String,
    description: Option<String>,
    location: Option<String>,
    tags: Vec<String>,
    thumbnail_path: String,
    video_path: String,
    video_size: i64,
    user_id: i32,
}

async fn insert_video<C: ConnectionTrait>(conn: &C, new: NewVideo) -> Result<VideoWithTags, DbErr> {
    let video = video_posts::ActiveModel {
        title: Set(new.title),
        description: Set(new.description),
        thumbnail_path: Set(new.thumbnail_path),
        video_path: Set(new.video_path),
        video_size: Set(new.video_size),
        location: Set(new.location),
        user_id: Set(new.user_id),
        view_count: Set(0),
        like_count: Set(0),
        comment_count: Set(0),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    for tag in &new.tags {
        video_tags::ActiveModel {
            video_id: Set(video.id),
            tag: Set(tag.clone()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }

    Ok(VideoWithTags {
        video,
        tags: new.tags,
    })
}

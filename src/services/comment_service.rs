use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{comments, prelude::*, users, video_posts};
use crate::services::comment_rate_limiter::CommentRateLimiter;
use crate::services::video_service::counters::increment_column;
use crate::utils::validation::require_text;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub struct CommentWithAuthor {
    pub comment: comments::Model,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct CommentPage {
    pub items: Vec<CommentWithAuthor>,
    pub page: u64,
    pub size: u64,
    pub total: u64,
}

pub struct CommentService {
    db: DatabaseConnection,
    limiter: CommentRateLimiter,
    config: AppConfig,
}

impl CommentService {
    pub fn new(db: DatabaseConnection, limiter: CommentRateLimiter, config: AppConfig) -> Self {
        Self {
            db,
            limiter,
            config,
        }
    }

    pub fn limiter(&self) -> &CommentRateLimiter {
        &self.limiter
    }

    async fn ensure_video(&self, video_id: i32) -> Result<(), AppError> {
        VideoPosts::find_by_id(video_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
        Ok(())
    }

    /// Inserts the comment and bumps the video's comment counter in one
    /// transaction, after the per-user rate limit allows it. The slot is
    /// handed back if the write fails.
    pub async fn add_comment(
        &self,
        video_id: i32,
        user_id: i32,
        text: &str,
    ) -> Result<CommentWithAuthor, AppError> {
        let text = require_text("Comment", text, self.config.max_comment_length)?;
        self.ensure_video(video_id).await?;

        let acquired_at = Utc::now();
        if !self.limiter.try_acquire_at(user_id, acquired_at) {
            return Err(AppError::TooManyRequests(format!(
                "Comment limit of {} per {} minutes reached",
                self.config.comments_per_window, self.config.comment_window_minutes
            )));
        }

        // A comment that is not stored does not count against the limit.
        let (comment, author) = match self.store_comment(video_id, user_id, text).await {
            Ok(stored) => stored,
            Err(e) => {
                self.limiter.release(user_id, acquired_at);
                return Err(e);
            }
        };

        tracing::debug!("💬 User {} commented on video {}", user_id, video_id);

        Ok(CommentWithAuthor {
            comment,
            username: author.username,
        })
    }

    async fn store_comment(
        &self,
        video_id: i32,
        user_id: i32,
        text: String,
    ) -> Result<(comments::Model, users::Model), AppError> {
        let author = Users::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

        let txn = self.db.begin().await?;
        let comment = comments::ActiveModel {
            text: Set(text),
            user_id: Set(user_id),
            video_post_id: Set(video_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        increment_column(
            &txn,
            video_posts::Column::CommentCount,
            video_posts::Column::Id.eq(video_id),
        )
        .await?;
        txn.commit().await?;

        Ok((comment, author))
    }

    /// Newest first. `size` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn list_comments(
        &self,
        video_id: i32,
        page: u64,
        size: u64,
    ) -> Result<CommentPage, AppError> {
        self.ensure_video(video_id).await?;
        let size = size.clamp(1, MAX_PAGE_SIZE);

        let paginator = Comments::find()
            .filter(comments::Column::VideoPostId.eq(video_id))
            .order_by_desc(comments::Column::CreatedAt)
            .order_by_desc(comments::Column::Id)
            .find_also_related(Users)
            .paginate(&self.db, size);

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page).await?;

        let items = rows
            .into_iter()
            .map(|(comment, user)| CommentWithAuthor {
                comment,
                username: user.map(|u| u.username).unwrap_or_default(),
            })
            .collect();

        Ok(CommentPage {
            items,
            page,
            size,
            total,
        })
    }
}

use crate::api::error::AppError;
use crate::entities::{prelude::*, video_posts, video_tags};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashMap;

use super::{VideoService, VideoWithTags};

impl VideoService {
    /// All videos, newest first.
    pub async fn list_videos(&self) -> Result<Vec<VideoWithTags>, AppError> {
        let videos = VideoPosts::find()
            .order_by_desc(video_posts::Column::CreatedAt)
            .order_by_desc(video_posts::Column::Id)
            .all(&self.db)
            .await?;
        self.attach_tags(videos).await
    }

    pub async fn get_video(&self, video_id: i32) -> Result<VideoWithTags, AppError> {
        let video = VideoPosts::find_by_id(video_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
        self.with_tags(video).await
    }

    pub async fn find_by_video_path(&self, filename: &str) -> Result<VideoWithTags, AppError> {
        let video = VideoPosts::find()
            .filter(video_posts::Column::VideoPath.eq(filename))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Video not found".to_string()))?;
        self.with_tags(video).await
    }

    async fn with_tags(&self, video: video_posts::Model) -> Result<VideoWithTags, AppError> {
        let mut found = self.attach_tags(vec![video]).await?;
        found
            .pop()
            .ok_or_else(|| AppError::Internal("Video disappeared while loading tags".to_string()))
    }

    async fn attach_tags(
        &self,
        videos: Vec<video_posts::Model>,
    ) -> Result<Vec<VideoWithTags>, AppError> {
        if videos.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = videos.iter().map(|v| v.id).collect();
        let tags = VideoTags::find()
            .filter(video_tags::Column::VideoId.is_in(ids))
            .order_by_asc(video_tags::Column::Id)
            .all(&self.db)
            .await?;

        let mut by_video: HashMap<i32, Vec<String>> = HashMap::new();
        for tag in tags {
            by_video.entry(tag.video_id).or_default().push(tag.tag);
        }

        Ok(videos
            .into_iter()
            .map(|video| VideoWithTags {
                tags: by_video.remove(&video.id).unwrap_or_default(),
                video,
            })
            .collect())
    }
}

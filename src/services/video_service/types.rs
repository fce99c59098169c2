use crate::entities::video_posts;
use bytes::Bytes;

/// One uploaded file as received from the client.
#[derive(Debug, Clone, Default)]
pub struct UploadPart {
    pub filename: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub thumbnail: UploadPart,
    pub video: UploadPart,
    pub user_id: i32,
}

#[derive(Debug, Clone)]
pub struct VideoWithTags {
    pub video: video_posts::Model,
    pub tags: Vec<String>,
}
